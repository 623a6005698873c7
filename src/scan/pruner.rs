/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Catalog pruner: filters a mean-element catalog by altitude, eccentricity,
//! inclination and name-pattern windows and writes the surviving records,
//! byte-identical, to a pruned catalog file.

use std::fs;
use std::path::PathBuf;

use log::info;
use regex::Regex;
use snafu::ResultExt;

use crate::catalog::{load_catalog, CatalogFilter};
use crate::config::Config;
use crate::errors::{
    ConfigError, OutputIoSnafu, ScanCatalogSnafu, ScanError, ScanResult,
};

#[derive(Clone, Debug)]
pub struct CatalogPrunerInput {
    pub catalog: PathBuf,
    pub altitude_window_km: (f64, f64),
    pub eccentricity_window: (f64, f64),
    pub inclination_window_deg: (f64, f64),
    pub name_regex: String,
    pub cutoff: usize,
    pub pruned_catalog: PathBuf,
}

impl CatalogPrunerInput {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let eccentricity_window = config.required_window("eccentricity_filter")?;
        if eccentricity_window.0 < 0.0 {
            return Err(ConfigError::InvalidConfigValue {
                name: "eccentricity_filter".to_string(),
                msg: "minimum eccentricity is below 0.0".to_string(),
            });
        }
        if eccentricity_window.1 > 1.0 {
            return Err(ConfigError::InvalidConfigValue {
                name: "eccentricity_filter".to_string(),
                msg: "maximum eccentricity is above 1.0".to_string(),
            });
        }

        Ok(Self {
            catalog: PathBuf::from(config.required_str("catalog")?),
            altitude_window_km: config.required_window("semi_major_axis_filter")?,
            eccentricity_window,
            inclination_window_deg: config.required_window("inclination_filter")?,
            name_regex: config.required_str("name_regex")?.to_string(),
            cutoff: config.required_u32("catalog_cutoff")? as usize,
            pruned_catalog: PathBuf::from(config.required_str("catalog_pruned")?),
        })
    }
}

pub fn execute(input: &CatalogPrunerInput) -> ScanResult<()> {
    let entries = load_catalog(&input.catalog).context(ScanCatalogSnafu)?;
    info!("loaded {} objects from {}", entries.len(), input.catalog.display());

    let regex = Regex::new(&input.name_regex).map_err(|error| ScanError::ScanConfig {
        source: ConfigError::InvalidConfigValue {
            name: "name_regex".to_string(),
            msg: error.to_string(),
        },
    })?;

    let filter = CatalogFilter {
        altitude_min_km: input.altitude_window_km.0,
        altitude_max_km: input.altitude_window_km.1,
        eccentricity_min: input.eccentricity_window.0,
        eccentricity_max: input.eccentricity_window.1,
        inclination_min_deg: input.inclination_window_deg.0,
        inclination_max_deg: input.inclination_window_deg.1,
        name_regex: Some(regex),
        cutoff: input.cutoff,
    };

    let pruned = filter.apply(&entries);

    let mut contents = String::new();
    for entry in &pruned {
        for line in entry.raw_lines() {
            contents.push_str(line);
            contents.push('\n');
        }
    }
    fs::write(&input.pruned_catalog, contents).context(OutputIoSnafu {
        path: input.pruned_catalog.display().to_string(),
    })?;

    info!("{} objects in the pruned catalog", pruned.len());
    Ok(())
}
