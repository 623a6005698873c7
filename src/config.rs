/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Hierarchical key/value configuration document.
//!
//! The document is JSON with one extension: lines whose first non-blank
//! characters are `//` are comments and stripped before parsing. Each
//! application mode declares its required keys; a missing key aborts with a
//! message naming it.

use std::fs;
use std::path::Path;

use hifitime::Epoch;
use serde_json::Value;
use snafu::ResultExt;

use crate::errors::{ConfigError, ConfigIoSnafu, ConfigSyntaxSnafu};

/// The application modes, dispatched from the `mode` key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    CatalogPruner,
    LambertScanner,
    Sgp4Scanner,
    J2Analysis,
    LambertFetch,
    Sgp4Fetch,
}

impl Mode {
    fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_lowercase().as_str() {
            "catalog_pruner" => Ok(Self::CatalogPruner),
            "lambert_scanner" => Ok(Self::LambertScanner),
            "sgp4_scanner" => Ok(Self::Sgp4Scanner),
            "j2_analysis" => Ok(Self::J2Analysis),
            "lambert_fetch" => Ok(Self::LambertFetch),
            "sgp4_fetch" => Ok(Self::Sgp4Fetch),
            other => Err(ConfigError::UnknownMode {
                mode: other.to_string(),
            }),
        }
    }
}

pub struct Config {
    document: Value,
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).context(ConfigIoSnafu {
            path: path.display().to_string(),
        })?;
        Self::from_str(&contents)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let stripped: String = contents
            .lines()
            .filter(|line| !line.trim_start().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        let document: Value = serde_json::from_str(&stripped).context(ConfigSyntaxSnafu)?;
        Ok(Self { document })
    }

    pub fn mode(&self) -> Result<Mode, ConfigError> {
        Mode::from_name(self.required_str("mode")?)
    }

    fn required(&self, name: &str) -> Result<&Value, ConfigError> {
        self.document
            .get(name)
            .ok_or_else(|| ConfigError::MissingConfigKey {
                name: name.to_string(),
            })
    }

    pub fn required_str(&self, name: &str) -> Result<&str, ConfigError> {
        self.required(name)?
            .as_str()
            .ok_or_else(|| invalid(name, "expected a string"))
    }

    pub fn required_f64(&self, name: &str) -> Result<f64, ConfigError> {
        self.required(name)?
            .as_f64()
            .ok_or_else(|| invalid(name, "expected a number"))
    }

    pub fn required_u32(&self, name: &str) -> Result<u32, ConfigError> {
        self.required(name)?
            .as_u64()
            .map(|value| value as u32)
            .ok_or_else(|| invalid(name, "expected a non-negative integer"))
    }

    pub fn required_bool(&self, name: &str) -> Result<bool, ConfigError> {
        self.required(name)?
            .as_bool()
            .ok_or_else(|| invalid(name, "expected true or false"))
    }

    pub fn required_i64(&self, name: &str) -> Result<i64, ConfigError> {
        self.required(name)?
            .as_i64()
            .ok_or_else(|| invalid(name, "expected an integer"))
    }

    pub fn optional_u32(&self, name: &str, default: u32) -> Result<u32, ConfigError> {
        match self.document.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_u64()
                .map(|value| value as u32)
                .ok_or_else(|| invalid(name, "expected a non-negative integer")),
        }
    }

    /// A `[min, max]` window of two numbers.
    pub fn required_window(&self, name: &str) -> Result<(f64, f64), ConfigError> {
        let array = self
            .required(name)?
            .as_array()
            .ok_or_else(|| invalid(name, "expected [min, max]"))?;
        if array.len() != 2 {
            return Err(invalid(name, "expected exactly two entries"));
        }
        let min = array[0]
            .as_f64()
            .ok_or_else(|| invalid(name, "window bounds must be numbers"))?;
        let max = array[1]
            .as_f64()
            .ok_or_else(|| invalid(name, "window bounds must be numbers"))?;
        if min > max {
            return Err(invalid(name, "window minimum exceeds its maximum"));
        }
        Ok((min, max))
    }

    /// A `[min, max, steps]` sampling grid.
    pub fn required_grid(&self, name: &str) -> Result<(f64, f64, usize), ConfigError> {
        let array = self
            .required(name)?
            .as_array()
            .ok_or_else(|| invalid(name, "expected [min, max, steps]"))?;
        if array.len() != 3 {
            return Err(invalid(name, "expected exactly three entries"));
        }
        let min = array[0]
            .as_f64()
            .ok_or_else(|| invalid(name, "grid bounds must be numbers"))?;
        let max = array[1]
            .as_f64()
            .ok_or_else(|| invalid(name, "grid bounds must be numbers"))?;
        let steps = array[2]
            .as_u64()
            .ok_or_else(|| invalid(name, "grid step count must be a non-negative integer"))?
            as usize;
        if steps == 0 {
            return Err(invalid(name, "grid step count must be at least 1"));
        }
        if min > max {
            return Err(invalid(name, "grid minimum exceeds its maximum"));
        }
        Ok((min, max, steps))
    }

    /// A `[length, path]` shortlist request; the path is only required when
    /// the length is positive.
    pub fn required_shortlist(&self, name: &str) -> Result<(usize, Option<String>), ConfigError> {
        let array = self
            .required(name)?
            .as_array()
            .ok_or_else(|| invalid(name, "expected [length, path]"))?;
        let length = array
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid(name, "shortlist length must be a non-negative integer"))?
            as usize;
        if length == 0 {
            return Ok((0, None));
        }
        let path = array
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(name, "a positive shortlist length requires a path"))?;
        Ok((length, Some(path.to_string())))
    }

    /// The departure epoch override: six integers
    /// `[year, month, day, hour, minute, second]`, or an empty array to use
    /// each departure object's own element-set epoch.
    pub fn required_departure_epoch(&self, name: &str) -> Result<Option<Epoch>, ConfigError> {
        let array = self
            .required(name)?
            .as_array()
            .ok_or_else(|| invalid(name, "expected six integers or an empty array"))?;
        if array.is_empty() {
            return Ok(None);
        }
        if array.len() != 6 {
            return Err(invalid(name, "expected six integers or an empty array"));
        }
        let mut parts = [0i64; 6];
        for (slot, value) in parts.iter_mut().zip(array) {
            *slot = value
                .as_i64()
                .ok_or_else(|| invalid(name, "epoch fields must be integers"))?;
        }
        Ok(Some(Epoch::from_gregorian_utc(
            parts[0] as i32,
            parts[1] as u8,
            parts[2] as u8,
            parts[3] as u8,
            parts[4] as u8,
            parts[5] as u8,
            0,
        )))
    }
}

fn invalid(name: &str, msg: &str) -> ConfigError {
    ConfigError::InvalidConfigValue {
        name: name.to_string(),
        msg: msg.to_string(),
    }
}

#[cfg(test)]
mod ut_config {
    use super::*;

    #[test]
    fn test_comment_stripping_and_mode() {
        let config = Config::from_str(
            r#"
            // A comment line.
            {
                // Mode selection.
                "mode": "Lambert_Scanner",
                "catalog": "catalog.txt"
            }
            "#,
        )
        .unwrap();
        assert_eq!(config.mode().unwrap(), Mode::LambertScanner);
        assert_eq!(config.required_str("catalog").unwrap(), "catalog.txt");
    }

    #[test]
    fn test_missing_key_is_named() {
        let config = Config::from_str(r#"{"mode": "j2_analysis"}"#).unwrap();
        match config.required_str("database") {
            Err(ConfigError::MissingConfigKey { name }) => assert_eq!(name, "database"),
            other => panic!("expected MissingConfigKey, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_mode() {
        let config = Config::from_str(r#"{"mode": "warp_drive"}"#).unwrap();
        assert!(matches!(
            config.mode(),
            Err(ConfigError::UnknownMode { .. })
        ));
    }

    #[test]
    fn test_window_and_grid_shapes() {
        let config = Config::from_str(
            r#"{
                "eccentricity_filter": [0.0, 0.1],
                "time_of_flight_grid": [36000.0, 72000.0, 2],
                "bad_window": [3.0, 1.0]
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.required_window("eccentricity_filter").unwrap(),
            (0.0, 0.1)
        );
        assert_eq!(
            config.required_grid("time_of_flight_grid").unwrap(),
            (36000.0, 72000.0, 2)
        );
        assert!(config.required_window("bad_window").is_err());
    }

    #[test]
    fn test_shortlist_shapes() {
        let config = Config::from_str(
            r#"{
                "off": [0],
                "on": [10, "shortlist.csv"],
                "broken": [5]
            }"#,
        )
        .unwrap();
        assert_eq!(config.required_shortlist("off").unwrap(), (0, None));
        assert_eq!(
            config.required_shortlist("on").unwrap(),
            (10, Some("shortlist.csv".to_string()))
        );
        assert!(config.required_shortlist("broken").is_err());
    }

    #[test]
    fn test_departure_epoch_shapes() {
        let config = Config::from_str(
            r#"{
                "own_epoch": [],
                "fixed": [2015, 3, 24, 16, 3, 30]
            }"#,
        )
        .unwrap();
        assert!(config.required_departure_epoch("own_epoch").unwrap().is_none());
        let epoch = config.required_departure_epoch("fixed").unwrap().unwrap();
        assert_eq!(
            epoch,
            Epoch::from_gregorian_utc_hms(2015, 3, 24, 16, 3, 30)
        );
    }
}
