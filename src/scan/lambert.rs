/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Lambert grid scan: every ordered pair of catalog objects, every sampled
//! time of flight, every feasible revolution branch.
//!
//! Pairs are evaluated in parallel by a worker pool; completed records flow
//! through a bounded channel to the single writer on the calling thread,
//! which inserts them inside one transaction. With a single worker thread the
//! scan runs sequentially and inserts in (departure, arrival, time-of-flight,
//! branch) lexicographic order, which makes runs reproducible row-for-row.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use hifitime::{Epoch, TimeUnits};
use log::{info, warn};
use rayon::prelude::*;
use snafu::ResultExt;

use super::{time_of_flight_grid, ProgressReporter, CHANNEL_HIGH_WATER};
use crate::astro::elements::KeplerianElements;
use crate::astro::lambert::solve_lambert;
use crate::catalog::{load_catalog, CatalogEntry};
use crate::config::Config;
use crate::constants::EARTH_GRAVITATIONAL_PARAMETER_KM3_S2;
use crate::errors::{ConfigError, ScanCatalogSnafu, ScanError, ScanResult, ScanStoreSnafu};
use crate::propagator::propagate_mean_elements_to_epoch;
use crate::store::{LambertTransferRecord, ResultStore};

#[derive(Clone, Debug)]
pub struct LambertScanInput {
    pub catalog: PathBuf,
    pub database: PathBuf,
    /// Fixed departure epoch, or `None` to depart each object at its own
    /// element-set epoch.
    pub departure_epoch: Option<Epoch>,
    pub time_of_flight_grid_s: (f64, f64, usize),
    pub prograde: bool,
    pub max_revolutions: u32,
    pub shortlist: (usize, Option<String>),
    /// Worker count: 0 uses every core, 1 forces the deterministic
    /// sequential order.
    pub threads: u32,
    /// Records-in-flight bound between the workers and the writer.
    pub channel_high_water: usize,
}

impl LambertScanInput {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            catalog: PathBuf::from(config.required_str("catalog")?),
            database: PathBuf::from(config.required_str("database")?),
            departure_epoch: config.required_departure_epoch("departure_epoch")?,
            time_of_flight_grid_s: config.required_grid("time_of_flight_grid")?,
            prograde: config.required_bool("is_prograde")?,
            max_revolutions: config.required_u32("revolutions_maximum")?,
            shortlist: config.required_shortlist("shortlist")?,
            threads: config.optional_u32("threads", 0)?,
            channel_high_water: config.optional_u32("channel_high_water", CHANNEL_HIGH_WATER)?
                as usize,
        })
    }
}

pub fn execute(input: &LambertScanInput, cancel: &AtomicBool) -> ScanResult<()> {
    let catalog = load_catalog(&input.catalog).context(ScanCatalogSnafu)?;
    info!(
        "loaded {} objects from {}",
        catalog.len(),
        input.catalog.display()
    );

    let store = ResultStore::open(&input.database).context(ScanStoreSnafu)?;
    store.recreate_lambert_table().context(ScanStoreSnafu)?;

    let (tof_min, tof_max, tof_steps) = input.time_of_flight_grid_s;
    let tofs = time_of_flight_grid(tof_min, tof_max, tof_steps);

    let mut pairs = Vec::with_capacity(catalog.len() * catalog.len().saturating_sub(1));
    for p in 0..catalog.len() {
        for q in 0..catalog.len() {
            if p != q {
                pairs.push((p, q));
            }
        }
    }
    let progress = ProgressReporter::new("lambert scan", pairs.len());

    store.begin().context(ScanStoreSnafu)?;
    let scan_result = if input.threads == 1 {
        scan_sequential(&store, &catalog, &pairs, &tofs, input, cancel, &progress)
    } else {
        scan_parallel(&store, &catalog, &pairs, &tofs, input, cancel, &progress)
    };
    // The transaction commits on cancelled exits too: completed rows stay.
    store.commit().context(ScanStoreSnafu)?;
    scan_result?;

    store.create_transfer_delta_v_index().context(ScanStoreSnafu)?;
    info!(
        "{} transfers stored in {}",
        store.lambert_count().context(ScanStoreSnafu)?,
        input.database.display()
    );

    if let (length, Some(path)) = &input.shortlist {
        if *length > 0 {
            store
                .write_lambert_shortlist(*length, path)
                .context(ScanStoreSnafu)?;
            info!("shortlist of {length} transfers written to {path}");
        }
    }

    Ok(())
}

fn scan_sequential(
    store: &ResultStore,
    catalog: &[CatalogEntry],
    pairs: &[(usize, usize)],
    tofs: &[f64],
    input: &LambertScanInput,
    cancel: &AtomicBool,
    progress: &ProgressReporter,
) -> ScanResult<()> {
    for &(p, q) in pairs {
        if cancel.load(Ordering::Relaxed) {
            warn!("lambert scan cancelled");
            break;
        }
        for record in evaluate_pair(catalog, p, q, tofs, input) {
            store.insert_lambert(&record).context(ScanStoreSnafu)?;
        }
        progress.tick();
    }
    Ok(())
}

fn scan_parallel(
    store: &ResultStore,
    catalog: &[CatalogEntry],
    pairs: &[(usize, usize)],
    tofs: &[f64],
    input: &LambertScanInput,
    cancel: &AtomicBool,
    progress: &ProgressReporter,
) -> ScanResult<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(input.threads as usize)
        .build()
        .map_err(|error| ScanError::ThreadPool {
            reason: error.to_string(),
        })?;

    std::thread::scope(|scope| -> ScanResult<()> {
        let (sender, receiver) = mpsc::sync_channel(input.channel_high_water);

        scope.spawn(move || {
            pool.install(|| {
                pairs.par_iter().for_each_with(sender, |sender, &(p, q)| {
                    // Cancellation is polled at pair boundaries.
                    if cancel.load(Ordering::Relaxed) {
                        return;
                    }
                    // A send failure means the writer is gone; drop the batch.
                    sender.send(evaluate_pair(catalog, p, q, tofs, input)).ok();
                });
            });
        });

        // Single writer: drain the bounded channel into the transaction.
        for batch in receiver {
            for record in batch {
                store.insert_lambert(&record).context(ScanStoreSnafu)?;
            }
            progress.tick();
        }
        Ok(())
    })
}

/// Evaluates one ordered pair across the whole time-of-flight grid. Per-branch
/// numerical failures are logged and skipped; the scan never aborts on them.
fn evaluate_pair(
    catalog: &[CatalogEntry],
    p: usize,
    q: usize,
    tofs: &[f64],
    input: &LambertScanInput,
) -> Vec<LambertTransferRecord> {
    let departure_object = &catalog[p];
    let arrival_object = &catalog[q];
    let mu = EARTH_GRAVITATIONAL_PARAMETER_KM3_S2;

    let departure_epoch = input
        .departure_epoch
        .unwrap_or(departure_object.elements.epoch);

    let (r1, v1) = match propagate_mean_elements_to_epoch(&departure_object.elements, departure_epoch)
    {
        Ok(state) => state,
        Err(error) => {
            warn!(
                "skipping departures from object {}: {error}",
                departure_object.norad_id
            );
            return Vec::new();
        }
    };
    let departure_elements = match KeplerianElements::try_from_cartesian(&r1, &v1, mu) {
        Ok(elements) => elements,
        Err(error) => {
            warn!(
                "skipping departures from object {}: {error}",
                departure_object.norad_id
            );
            return Vec::new();
        }
    };

    let mut records = Vec::new();
    for &tof_s in tofs {
        let arrival_epoch = departure_epoch + tof_s.seconds();
        let (r2, v2) =
            match propagate_mean_elements_to_epoch(&arrival_object.elements, arrival_epoch) {
                Ok(state) => state,
                Err(error) => {
                    warn!(
                        "skipping transfer {} -> {} at tof {tof_s} s: {error}",
                        departure_object.norad_id, arrival_object.norad_id
                    );
                    continue;
                }
            };
        let arrival_elements = match KeplerianElements::try_from_cartesian(&r2, &v2, mu) {
            Ok(elements) => elements,
            Err(error) => {
                warn!(
                    "skipping transfer {} -> {} at tof {tof_s} s: {error}",
                    departure_object.norad_id, arrival_object.norad_id
                );
                continue;
            }
        };

        let solutions =
            match solve_lambert(&r1, &r2, tof_s, mu, input.prograde, input.max_revolutions) {
                Ok(solutions) => solutions,
                Err(error) => {
                    warn!(
                        "lambert solver failed for {} -> {} at tof {tof_s} s: {error}",
                        departure_object.norad_id, arrival_object.norad_id
                    );
                    continue;
                }
            };

        for solution in solutions {
            let transfer_elements =
                match KeplerianElements::try_from_cartesian(&r1, &solution.v1_km_s, mu) {
                    Ok(elements) => elements,
                    Err(error) => {
                        warn!(
                            "skipping degenerate branch for {} -> {}: {error}",
                            departure_object.norad_id, arrival_object.norad_id
                        );
                        continue;
                    }
                };

            let departure_delta_v = solution.v1_km_s - v1;
            // The arrival burn matches the arrival object's velocity.
            let arrival_delta_v = v2 - solution.v2_km_s;

            records.push(LambertTransferRecord {
                departure_object_id: departure_object.norad_id,
                arrival_object_id: arrival_object.norad_id,
                departure_epoch_jd: departure_epoch.to_jde_utc_days(),
                time_of_flight_s: tof_s,
                revolutions: solution.revolutions,
                prograde: input.prograde,
                departure_position_km: r1,
                departure_velocity_km_s: v1,
                departure_elements,
                arrival_position_km: r2,
                arrival_velocity_km_s: v2,
                arrival_elements,
                transfer_elements,
                departure_delta_v_km_s: departure_delta_v,
                arrival_delta_v_km_s: arrival_delta_v,
                transfer_delta_v_km_s: departure_delta_v.norm() + arrival_delta_v.norm(),
            });
        }
    }

    records
}
