/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

extern crate pretty_env_logger;

use std::env::{set_var, var};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use log::info;
use snafu::prelude::*;

use kessler::config::{Config, Mode};
use kessler::errors::{ConfigError, ScanError};
use kessler::scan::fetch::{execute_lambert_fetch, execute_sgp4_fetch, FetchInput};
use kessler::scan::j2::{execute as execute_j2_analysis, J2AnalysisInput};
use kessler::scan::lambert::{execute as execute_lambert_scanner, LambertScanInput};
use kessler::scan::pruner::{execute as execute_catalog_pruner, CatalogPrunerInput};
use kessler::scan::sgp4::{execute as execute_sgp4_scanner, Sgp4ScanInput};

const LOG_VAR: &str = "KESSLER_LOG";

#[derive(Parser)]
#[command(name = "kessler", about = "Catalog-wide impulsive transfer scanning")]
struct Args {
    /// Path to the JSON configuration document selecting the mode.
    config: PathBuf,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliErrors {
    #[snafu(display("{source}"))]
    CliConfig { source: ConfigError },
    #[snafu(display("{source}"))]
    CliScan { source: ScanError },
}

fn main() -> Result<(), CliErrors> {
    if var(LOG_VAR).is_err() {
        set_var(LOG_VAR, "INFO");
    }
    if pretty_env_logger::try_init_custom_env(LOG_VAR).is_err() {
        eprintln!("could not init logger");
    }

    let args = Args::parse();
    let config = Config::from_path(&args.config).context(CliConfigSnafu)?;
    let mode = config.mode().context(CliConfigSnafu)?;
    info!("mode: {mode:?}");

    let cancel = AtomicBool::new(false);

    match mode {
        Mode::CatalogPruner => {
            let input = CatalogPrunerInput::from_config(&config).context(CliConfigSnafu)?;
            execute_catalog_pruner(&input).context(CliScanSnafu)?;
        }
        Mode::LambertScanner => {
            let input = LambertScanInput::from_config(&config).context(CliConfigSnafu)?;
            execute_lambert_scanner(&input, &cancel).context(CliScanSnafu)?;
        }
        Mode::Sgp4Scanner => {
            let input = Sgp4ScanInput::from_config(&config).context(CliConfigSnafu)?;
            execute_sgp4_scanner(&input, &cancel).context(CliScanSnafu)?;
        }
        Mode::J2Analysis => {
            let input = J2AnalysisInput::from_config(&config).context(CliConfigSnafu)?;
            execute_j2_analysis(&input).context(CliScanSnafu)?;
        }
        Mode::LambertFetch => {
            let input = FetchInput::from_config(&config).context(CliConfigSnafu)?;
            execute_lambert_fetch(&input).context(CliScanSnafu)?;
        }
        Mode::Sgp4Fetch => {
            let input = FetchInput::from_config(&config).context(CliConfigSnafu)?;
            execute_sgp4_fetch(&input).context(CliScanSnafu)?;
        }
    }

    Ok(())
}
