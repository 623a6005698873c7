/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Scan drivers: the catalog pruner, the Lambert and SGP4 grid scans, the J2
//! secular analysis, and the single-transfer fetch operations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::info;

pub mod fetch;
pub mod j2;
pub mod lambert;
pub mod pruner;
pub mod sgp4;

/// Default bound on the records-in-flight channel between scan workers and
/// the single database writer.
pub(crate) const CHANNEL_HIGH_WATER: u32 = 1024;

/// Rate-limited progress reporter: completions are logged at most once per
/// reporting interval, plus a final line.
pub(crate) struct ProgressReporter {
    label: &'static str,
    total: usize,
    completed: AtomicUsize,
    last_report: Mutex<Instant>,
    interval: Duration,
}

impl ProgressReporter {
    pub fn new(label: &'static str, total: usize) -> Self {
        Self {
            label,
            total,
            completed: AtomicUsize::new(0),
            last_report: Mutex::new(Instant::now()),
            interval: Duration::from_secs(2),
        }
    }

    pub fn tick(&self) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let mut last = self.last_report.lock().unwrap();
        if last.elapsed() >= self.interval || done == self.total {
            *last = Instant::now();
            info!("{}: {done}/{} complete", self.label, self.total);
        }
    }
}

/// The inclusive time-of-flight grid: uniform spacing for two or more steps,
/// the lower bound alone for a single step.
pub(crate) fn time_of_flight_grid(min_s: f64, max_s: f64, steps: usize) -> Vec<f64> {
    if steps < 2 {
        return vec![min_s];
    }
    let spacing = (max_s - min_s) / (steps - 1) as f64;
    (0..steps).map(|k| min_s + k as f64 * spacing).collect()
}

#[cfg(test)]
mod ut_scan {
    use super::*;

    #[test]
    fn test_time_of_flight_grid_endpoints() {
        assert_eq!(time_of_flight_grid(36000.0, 72000.0, 2), vec![36000.0, 72000.0]);
        assert_eq!(time_of_flight_grid(100.0, 200.0, 1), vec![100.0]);
        let grid = time_of_flight_grid(0.0, 100.0, 5);
        assert_eq!(grid, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    }
}
