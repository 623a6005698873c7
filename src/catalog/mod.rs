/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Mean-element catalog loading and pruning.
//!
//! Catalogs are plain NORAD element-set text, either two-line or three-line
//! records. The first character of the first line decides which: `0` means
//! three-line (a title line precedes each set), `1` means two-line, anything
//! else is a malformed catalog.

use std::fs;
use std::path::Path;

use chrono::{Datelike, Timelike};
use hifitime::Epoch;
use log::warn;
use regex::Regex;

use crate::constants::{EARTH_GRAVITATIONAL_PARAMETER_KM3_S2, EARTH_MEAN_RADIUS_KM, SECONDS_PER_DAY};
use crate::errors::CatalogError;

mod mean_elements;
pub use mean_elements::MeanElements;

/// One object of the catalog: its identifiers, its mean-element set, and the
/// raw catalog lines so that pruned catalogs can be re-emitted byte-for-byte.
#[derive(Clone, Debug)]
pub struct CatalogEntry {
    pub norad_id: u64,
    pub name: Option<String>,
    pub elements: MeanElements,
    pub title_line: Option<String>,
    pub line1: String,
    pub line2: String,
}

impl CatalogEntry {
    fn from_lines(
        title_line: Option<String>,
        line1: String,
        line2: String,
    ) -> Result<Self, CatalogError> {
        let name = title_line
            .as_deref()
            .map(|line| line.trim_start_matches('0').trim().to_string());
        let sgp4_elements =
            sgp4::Elements::from_tle(name.clone(), line1.as_bytes(), line2.as_bytes()).map_err(
                |error| CatalogError::ElementSetParse {
                    reason: error.to_string(),
                },
            )?;
        let elements = MeanElements::from_sgp4_elements(&sgp4_elements)?;
        Ok(Self {
            norad_id: sgp4_elements.norad_id,
            name,
            elements,
            title_line,
            line1,
            line2,
        })
    }

    /// The catalog lines of this entry, in their original order.
    pub fn raw_lines(&self) -> Vec<&str> {
        match &self.title_line {
            Some(title) => vec![title, &self.line1, &self.line2],
            None => vec![&self.line1, &self.line2],
        }
    }
}

/// Number of lines per record detected from the first line of the catalog.
pub fn detect_lines_per_record(first_line: &str) -> Result<usize, CatalogError> {
    match first_line.chars().next() {
        Some('0') => Ok(3),
        Some('1') => Ok(2),
        _ => Err(CatalogError::MalformedCatalog {
            msg: format!("first line starts with {:?}", first_line.chars().next()),
        }),
    }
}

/// Loads a two-line or three-line catalog file.
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogEntry>, CatalogError> {
    let contents = fs::read_to_string(path).map_err(|source| CatalogError::CatalogIo {
        path: path.display().to_string(),
        source,
    })?;
    parse_catalog(&contents)
}

/// Parses catalog text. Carriage returns are stripped, blank trailing lines
/// are ignored.
pub fn parse_catalog(contents: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
    let lines: Vec<&str> = contents
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .collect();

    let Some(first) = lines.first() else {
        return Ok(Vec::new());
    };
    let lines_per_record = detect_lines_per_record(first)?;

    let mut entries = Vec::with_capacity(lines.len() / lines_per_record);
    for record in lines.chunks(lines_per_record) {
        if record.len() != lines_per_record {
            return Err(CatalogError::MalformedCatalog {
                msg: format!(
                    "incomplete final record ({} of {lines_per_record} lines)",
                    record.len()
                ),
            });
        }
        let (title, line1, line2) = if lines_per_record == 3 {
            expect_line_start(record[0], '0')?;
            expect_line_start(record[1], '1')?;
            expect_line_start(record[2], '2')?;
            (Some(record[0].to_string()), record[1], record[2])
        } else {
            expect_line_start(record[0], '1')?;
            expect_line_start(record[1], '2')?;
            (None, record[0], record[1])
        };
        entries.push(CatalogEntry::from_lines(
            title,
            line1.to_string(),
            line2.to_string(),
        )?);
    }

    Ok(entries)
}

fn expect_line_start(line: &str, expected: char) -> Result<(), CatalogError> {
    if line.starts_with(expected) {
        Ok(())
    } else {
        Err(CatalogError::MalformedCatalog {
            msg: format!("expected a line starting with {expected:?}, got {line:?}"),
        })
    }
}

/// Windowed catalog filter. Altitude bounds are in kilometers above the Earth
/// mean radius, applied to the mean-element recovered semi-major axis;
/// inclination bounds are in degrees. A zero cutoff means no cap.
#[derive(Clone, Debug)]
pub struct CatalogFilter {
    pub altitude_min_km: f64,
    pub altitude_max_km: f64,
    pub eccentricity_min: f64,
    pub eccentricity_max: f64,
    pub inclination_min_deg: f64,
    pub inclination_max_deg: f64,
    pub name_regex: Option<Regex>,
    pub cutoff: usize,
}

impl CatalogFilter {
    /// Applies the filter windows in order: name pattern, altitude,
    /// eccentricity, inclination, then the cutoff. The output is a
    /// subsequence of the input.
    pub fn apply(&self, entries: &[CatalogEntry]) -> Vec<CatalogEntry> {
        let mut accepted = Vec::new();
        let mut regex_warned = false;

        for entry in entries {
            if let Some(regex) = &self.name_regex {
                match &entry.title_line {
                    Some(title) => {
                        if !regex.is_match(title) {
                            continue;
                        }
                    }
                    None => {
                        // Two-line catalogs carry no names to match on.
                        if !regex_warned {
                            warn!("catalog has no title lines: name filter skipped");
                            regex_warned = true;
                        }
                    }
                }
            }

            let sma_km = entry.elements.recovered_semi_major_axis_km();
            if sma_km < self.altitude_min_km + EARTH_MEAN_RADIUS_KM
                || sma_km > self.altitude_max_km + EARTH_MEAN_RADIUS_KM
            {
                continue;
            }

            let ecc = entry.elements.eccentricity;
            if ecc < self.eccentricity_min || ecc > self.eccentricity_max {
                continue;
            }

            let inc_deg = entry.elements.inclination_deg;
            if inc_deg < self.inclination_min_deg || inc_deg > self.inclination_max_deg {
                continue;
            }

            if self.cutoff != 0 && accepted.len() == self.cutoff {
                warn!("catalog cutoff of {} objects reached", self.cutoff);
                break;
            }

            accepted.push(entry.clone());
        }

        accepted
    }
}

/// Converts a TLE epoch timestamp to a hifitime UTC epoch.
pub(crate) fn epoch_from_datetime(datetime: &chrono::NaiveDateTime) -> Epoch {
    Epoch::from_gregorian_utc(
        datetime.year(),
        datetime.month() as u8,
        datetime.day() as u8,
        datetime.hour() as u8,
        datetime.minute() as u8,
        datetime.second() as u8,
        datetime.nanosecond(),
    )
}

/// Mean-element recovered semi-major axis for a mean motion in rev/day.
pub(crate) fn semi_major_axis_from_mean_motion_km(mean_motion_rev_day: f64) -> f64 {
    let n_rad_s = mean_motion_rev_day * std::f64::consts::TAU / SECONDS_PER_DAY;
    (EARTH_GRAVITATIONAL_PARAMETER_KM3_S2 / (n_rad_s * n_rad_s)).cbrt()
}

#[cfg(test)]
mod ut_catalog {
    use super::*;

    const ISS_TITLE: &str = "0 ISS (ZARYA)";
    const ISS_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";
    const MOLNIYA_LINE1: &str =
        "1 08195U 75081A   06176.33215444  .00000099  00000-0  11873-3 0   813";
    const MOLNIYA_LINE2: &str =
        "2 08195  64.1586 279.0717 6877146 264.7651  20.2257  2.00491383225656";

    fn iss_entry() -> CatalogEntry {
        CatalogEntry::from_lines(
            Some(ISS_TITLE.to_string()),
            ISS_LINE1.to_string(),
            ISS_LINE2.to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_three_line_detection_and_parse() {
        let text = format!("{ISS_TITLE}\n{ISS_LINE1}\n{ISS_LINE2}\n");
        let entries = parse_catalog(&text).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].norad_id, 25544);
        assert_eq!(entries[0].name.as_deref(), Some("ISS (ZARYA)"));
        assert_eq!(entries[0].raw_lines().len(), 3);
    }

    #[test]
    fn test_two_line_detection_and_parse() {
        let text = format!("{ISS_LINE1}\n{ISS_LINE2}\n{MOLNIYA_LINE1}\n{MOLNIYA_LINE2}\n");
        let entries = parse_catalog(&text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].norad_id, 25544);
        assert_eq!(entries[1].norad_id, 8195);
        assert!(entries[0].title_line.is_none());
    }

    #[test]
    fn test_malformed_catalog() {
        assert!(matches!(
            parse_catalog("X bogus\nnope\n"),
            Err(CatalogError::MalformedCatalog { .. })
        ));
        // Title line where an element line is expected.
        let text = format!("{ISS_TITLE}\n{ISS_LINE2}\n{ISS_LINE1}\n");
        assert!(parse_catalog(&text).is_err());
        // Truncated record.
        let text = format!("{ISS_TITLE}\n{ISS_LINE1}\n");
        assert!(parse_catalog(&text).is_err());
    }

    #[test]
    fn test_epoch_recovery() {
        let entry = iss_entry();
        // 2008-09-20, day of year 264.51782528.
        let (year, month, day, ..) = entry.elements.epoch.to_gregorian_utc();
        assert_eq!((year, month, day), (2008, 9, 20));
    }

    #[test]
    fn test_recovered_semi_major_axis() {
        let entry = iss_entry();
        let sma = entry.elements.recovered_semi_major_axis_km();
        // ISS orbits at roughly 350 km altitude in 2008.
        assert!((EARTH_MEAN_RADIUS_KM + 250.0..EARTH_MEAN_RADIUS_KM + 450.0).contains(&sma));
    }

    #[test]
    fn test_filter_windows_and_subsequence() {
        let iss = iss_entry();
        let molniya = CatalogEntry::from_lines(
            Some("0 MOLNIYA 3-5".to_string()),
            MOLNIYA_LINE1.to_string(),
            MOLNIYA_LINE2.to_string(),
        )
        .unwrap();
        let catalog = vec![iss.clone(), molniya];

        // Eccentricity window keeps the ISS, drops the Molniya orbit.
        let filter = CatalogFilter {
            altitude_min_km: 0.0,
            altitude_max_km: 50_000.0,
            eccentricity_min: 0.0,
            eccentricity_max: 0.1,
            inclination_min_deg: 0.0,
            inclination_max_deg: 180.0,
            name_regex: None,
            cutoff: 0,
        };
        let pruned = filter.apply(&catalog);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].norad_id, 25544);

        // Name regex on the title line.
        let filter = CatalogFilter {
            eccentricity_max: 1.0,
            name_regex: Some(Regex::new("(MOLNIYA)").unwrap()),
            ..filter
        };
        let pruned = filter.apply(&catalog);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].norad_id, 8195);
    }

    #[test]
    fn test_filter_cutoff() {
        let iss = iss_entry();
        let catalog = vec![iss.clone(), iss.clone(), iss];
        let filter = CatalogFilter {
            altitude_min_km: 0.0,
            altitude_max_km: 50_000.0,
            eccentricity_min: 0.0,
            eccentricity_max: 1.0,
            inclination_min_deg: 0.0,
            inclination_max_deg: 180.0,
            name_regex: None,
            cutoff: 2,
        };
        assert_eq!(filter.apply(&catalog).len(), 2);
    }
}
