/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Single-transfer fetch: recover one stored transfer and render it as a set
//! of ephemeris files plus a metadata file, suitable for plotting.
//!
//! Six ephemerides are produced per transfer: the departure and arrival
//! orbits sampled over one period, the departure and arrival paths over the
//! time of flight (the arrival path backwards from the arrival point), and
//! the transfer orbit and path. `lambert_fetch` samples the transfer path as
//! a Kepler arc; `sgp4_fetch` fits a virtual mean-element set to the transfer
//! departure state and samples its SGP4 propagation instead.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use hifitime::Epoch;
use log::info;
use snafu::ResultExt;

use crate::astro::kepler::{orbital_period_s, sample_kepler_orbit, StateHistory};
use crate::catalog::MeanElements;
use crate::config::Config;
use crate::constants::{EARTH_GRAVITATIONAL_PARAMETER_KM3_S2, SECONDS_PER_DAY};
use crate::errors::{
    ConfigError, EphemerisIoSnafu, OutputIoSnafu, ScanError, ScanFitSnafu,
    ScanPropagationSnafu, ScanResult, ScanStoreSnafu,
};
use crate::fitter::{fit_mean_elements, FitTolerances};
use crate::math::{state_vector, Vector3};
use crate::propagator::propagate_mean_elements;
use crate::store::{ResultStore, StoredLambertTransfer};

const EPHEMERIS_HEADER: [&str; 7] = ["jd", "x", "y", "z", "xdot", "ydot", "zdot"];

#[derive(Clone, Debug)]
pub struct FetchInput {
    pub database: PathBuf,
    pub transfer_id: i64,
    pub output_steps: usize,
    pub output_directory: PathBuf,
    pub metadata: String,
    pub departure_orbit: String,
    pub departure_path: String,
    pub arrival_orbit: String,
    pub arrival_path: String,
    pub transfer_orbit: String,
    pub transfer_path: String,
}

impl FetchInput {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            database: PathBuf::from(config.required_str("database")?),
            transfer_id: config.required_i64("transfer_id")?,
            output_steps: config.required_u32("output_steps")? as usize,
            output_directory: PathBuf::from(config.required_str("output_directory")?),
            metadata: config.required_str("metadata")?.to_string(),
            departure_orbit: config.required_str("departure_orbit")?.to_string(),
            departure_path: config.required_str("departure_path")?.to_string(),
            arrival_orbit: config.required_str("arrival_orbit")?.to_string(),
            arrival_path: config.required_str("arrival_path")?.to_string(),
            transfer_orbit: config.required_str("transfer_orbit")?.to_string(),
            transfer_path: config.required_str("transfer_path")?.to_string(),
        })
    }

    fn output_path(&self, filename: &str) -> PathBuf {
        self.output_directory
            .join(format!("transfer{}_{filename}", self.transfer_id))
    }
}

pub fn execute_lambert_fetch(input: &FetchInput) -> ScanResult<()> {
    let transfer = fetch_transfer(input)?;
    write_common_files(input, &transfer)?;

    // Transfer path: the Kepler arc actually flown between the burns.
    let row = &transfer.record;
    let departure_velocity = row.departure_velocity_km_s + row.departure_delta_v_km_s;
    let transfer_path = sample_kepler_orbit(
        &row.departure_position_km,
        &departure_velocity,
        row.time_of_flight_s,
        input.output_steps,
        EARTH_GRAVITATIONAL_PARAMETER_KM3_S2,
        row.departure_epoch_jd,
    )
    .map_err(|source| ScanError::ScanAstro { source })?;
    write_ephemeris(input, &input.transfer_path, &transfer_path)?;

    info!("transfer {} rendered", input.transfer_id);
    Ok(())
}

pub fn execute_sgp4_fetch(input: &FetchInput) -> ScanResult<()> {
    let transfer = fetch_transfer(input)?;
    write_common_files(input, &transfer)?;

    // Transfer path under the non-Keplerian model: fit a virtual mean-element
    // set to the post-burn departure state and sample its SGP4 propagation.
    let row = &transfer.record;
    let departure_velocity = row.departure_velocity_km_s + row.departure_delta_v_km_s;
    let departure_epoch = Epoch::from_jde_utc(row.departure_epoch_jd);
    let seed = MeanElements::template(row.departure_object_id, departure_epoch);

    let fit = fit_mean_elements(
        &row.departure_position_km,
        &departure_velocity,
        departure_epoch,
        &seed,
        EARTH_GRAVITATIONAL_PARAMETER_KM3_S2,
        &FitTolerances::default(),
    )
    .context(ScanFitSnafu)?;

    let step_s = if input.output_steps == 0 {
        0.0
    } else {
        row.time_of_flight_s / input.output_steps as f64
    };
    let mut history: StateHistory = Vec::with_capacity(input.output_steps + 1);
    for i in 0..=input.output_steps {
        let t = i as f64 * step_s;
        let (r, v) =
            propagate_mean_elements(&fit.elements, t).context(ScanPropagationSnafu)?;
        history.push((row.departure_epoch_jd + t / SECONDS_PER_DAY, state_vector(&r, &v)));
    }
    write_ephemeris(input, &input.transfer_path, &history)?;

    info!("transfer {} rendered under SGP4", input.transfer_id);
    Ok(())
}

fn fetch_transfer(input: &FetchInput) -> ScanResult<StoredLambertTransfer> {
    let store = ResultStore::open(&input.database).context(ScanStoreSnafu)?;
    store
        .lambert_transfer(input.transfer_id)
        .context(ScanStoreSnafu)?
        .ok_or(ScanError::UnknownTransfer {
            transfer_id: input.transfer_id,
        })
}

/// Writes the metadata file and the four object ephemerides plus the transfer
/// orbit, which are shared by both fetch modes.
fn write_common_files(input: &FetchInput, transfer: &StoredLambertTransfer) -> ScanResult<()> {
    let row = &transfer.record;
    let mu = EARTH_GRAVITATIONAL_PARAMETER_KM3_S2;

    let mut metadata = String::new();
    let _ = writeln!(metadata, "departure_id,{},-", row.departure_object_id);
    let _ = writeln!(metadata, "arrival_id,{},-", row.arrival_object_id);
    let _ = writeln!(metadata, "departure_epoch,{},JD", row.departure_epoch_jd);
    let _ = writeln!(metadata, "time_of_flight,{},s", row.time_of_flight_s);
    let _ = writeln!(metadata, "is_prograde,{},-", row.prograde);
    let _ = writeln!(metadata, "revolutions,{},-", row.revolutions);
    let _ = writeln!(metadata, "transfer_delta_v,{},km/s", row.transfer_delta_v_km_s);
    let metadata_path = input.output_path(&input.metadata);
    fs::write(&metadata_path, metadata).context(OutputIoSnafu {
        path: metadata_path.display().to_string(),
    })?;

    let astro = |source| ScanError::ScanAstro { source };

    // Departure orbit over one period, and the departure object's coasting
    // path over the time of flight.
    let departure_period_s = orbital_period_s(row.departure_elements.sma_km, mu);
    let departure_orbit = sample_kepler_orbit(
        &row.departure_position_km,
        &row.departure_velocity_km_s,
        departure_period_s,
        input.output_steps,
        mu,
        row.departure_epoch_jd,
    )
    .map_err(astro)?;
    write_ephemeris(input, &input.departure_orbit, &departure_orbit)?;

    let departure_path = sample_kepler_orbit(
        &row.departure_position_km,
        &row.departure_velocity_km_s,
        row.time_of_flight_s,
        input.output_steps,
        mu,
        row.departure_epoch_jd,
    )
    .map_err(astro)?;
    write_ephemeris(input, &input.departure_path, &departure_path)?;

    // Arrival orbit, and the arrival object's path flown backwards from the
    // arrival point so that both paths share the departure epoch origin.
    let arrival_period_s = orbital_period_s(row.arrival_elements.sma_km, mu);
    let arrival_orbit = sample_kepler_orbit(
        &row.arrival_position_km,
        &row.arrival_velocity_km_s,
        arrival_period_s,
        input.output_steps,
        mu,
        row.departure_epoch_jd,
    )
    .map_err(astro)?;
    write_ephemeris(input, &input.arrival_orbit, &arrival_orbit)?;

    let arrival_path = sample_kepler_orbit(
        &row.arrival_position_km,
        &row.arrival_velocity_km_s,
        -row.time_of_flight_s,
        input.output_steps,
        mu,
        row.departure_epoch_jd + row.time_of_flight_s / SECONDS_PER_DAY,
    )
    .map_err(astro)?;
    write_ephemeris(input, &input.arrival_path, &arrival_path)?;

    // Full transfer orbit over one period of the post-burn conic.
    let departure_velocity: Vector3 = row.departure_velocity_km_s + row.departure_delta_v_km_s;
    let transfer_period_s = orbital_period_s(row.transfer_elements.sma_km, mu);
    let transfer_orbit = sample_kepler_orbit(
        &row.departure_position_km,
        &departure_velocity,
        transfer_period_s,
        input.output_steps,
        mu,
        row.departure_epoch_jd,
    )
    .map_err(astro)?;
    write_ephemeris(input, &input.transfer_orbit, &transfer_orbit)?;

    Ok(())
}

fn write_ephemeris(input: &FetchInput, filename: &str, history: &StateHistory) -> ScanResult<()> {
    let path = input.output_path(filename);
    let path_str = path.display().to_string();
    let mut writer =
        csv::Writer::from_path(&path).context(EphemerisIoSnafu { path: path_str.as_str() })?;
    writer
        .write_record(EPHEMERIS_HEADER)
        .context(EphemerisIoSnafu { path: path_str.as_str() })?;
    for (jd, state) in history {
        let mut fields = Vec::with_capacity(7);
        fields.push(jd.to_string());
        for i in 0..6 {
            fields.push(state[i].to_string());
        }
        writer
            .write_record(fields.iter())
            .context(EphemerisIoSnafu { path: path_str.as_str() })?;
    }
    writer.flush().map_err(|error| ScanError::EphemerisIo {
        path: path_str,
        source: error.into(),
    })
}
