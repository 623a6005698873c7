/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! SGP4 grid scan: for every stored Lambert transfer, fit a virtual
//! mean-element set to the transfer departure state, re-propagate it to the
//! arrival epoch under SGP4, and record how far it lands from the Keplerian
//! arrival.
//!
//! Every lambert row receives exactly one row here. Rows filtered by the
//! delta-v cutoff, rows whose fit diverges, and rows whose propagation fails
//! are written with success = 0 and zeroed error columns; the scan never
//! aborts on a per-row failure.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;

use hifitime::Epoch;
use log::{info, warn};
use rayon::prelude::*;
use snafu::ResultExt;

use super::{ProgressReporter, CHANNEL_HIGH_WATER};
use crate::catalog::{load_catalog, MeanElements};
use crate::config::Config;
use crate::constants::EARTH_GRAVITATIONAL_PARAMETER_KM3_S2;
use crate::errors::{ConfigError, ScanCatalogSnafu, ScanError, ScanResult, ScanStoreSnafu};
use crate::fitter::{convergence_test, fit_mean_elements, FitTolerances};
use crate::math::state_vector;
use crate::propagator::propagate_mean_elements;
use crate::store::{PropagationRecord, ResultStore, StoredLambertTransfer, SGP4_TABLE};

#[derive(Clone, Debug)]
pub struct Sgp4ScanInput {
    pub catalog: PathBuf,
    pub database: PathBuf,
    /// Transfers above this total delta-v are not re-propagated.
    pub transfer_delta_v_cutoff_km_s: f64,
    pub tolerances: FitTolerances,
    pub shortlist: (usize, Option<String>),
    pub threads: u32,
    pub channel_high_water: usize,
}

impl Sgp4ScanInput {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            catalog: PathBuf::from(config.required_str("catalog")?),
            database: PathBuf::from(config.required_str("database")?),
            transfer_delta_v_cutoff_km_s: config.required_f64("transfer_deltav_cutoff")?,
            tolerances: FitTolerances {
                relative: config.required_f64("relative_tolerance")?,
                absolute: config.required_f64("absolute_tolerance")?,
            },
            shortlist: config.required_shortlist("shortlist")?,
            threads: config.optional_u32("threads", 0)?,
            channel_high_water: config.optional_u32("channel_high_water", CHANNEL_HIGH_WATER)?
                as usize,
        })
    }
}

#[derive(Default)]
struct FailureCounters {
    cutoff: AtomicUsize,
    fit: AtomicUsize,
    propagation: AtomicUsize,
}

pub fn execute(input: &Sgp4ScanInput, cancel: &AtomicBool) -> ScanResult<()> {
    let catalog = load_catalog(&input.catalog).context(ScanCatalogSnafu)?;
    let seeds: HashMap<u64, MeanElements> = catalog
        .into_iter()
        .map(|entry| (entry.norad_id, entry.elements))
        .collect();

    let store = ResultStore::open(&input.database).context(ScanStoreSnafu)?;
    store.recreate_miss_table(SGP4_TABLE).context(ScanStoreSnafu)?;

    let transfers = store.lambert_transfers().context(ScanStoreSnafu)?;
    info!("re-propagating {} transfers under SGP4", transfers.len());
    let progress = ProgressReporter::new("sgp4 scan", transfers.len());
    let counters = FailureCounters::default();

    store.begin().context(ScanStoreSnafu)?;
    let scan_result = if input.threads == 1 {
        let mut result = Ok(());
        for transfer in &transfers {
            if cancel.load(Ordering::Relaxed) {
                warn!("sgp4 scan cancelled");
                break;
            }
            let record = evaluate_transfer(transfer, &seeds, input, &counters);
            if let Err(error) = store.insert_miss(SGP4_TABLE, &record).context(ScanStoreSnafu) {
                result = Err(error);
                break;
            }
            progress.tick();
        }
        result
    } else {
        scan_parallel(&store, &transfers, &seeds, input, cancel, &progress, &counters)
    };
    store.commit().context(ScanStoreSnafu)?;
    scan_result?;

    info!(
        "{} rows written, {} transfers under the {} km/s cutoff",
        store.miss_count(SGP4_TABLE).context(ScanStoreSnafu)?,
        store
            .lambert_count_below(input.transfer_delta_v_cutoff_km_s)
            .context(ScanStoreSnafu)?,
        input.transfer_delta_v_cutoff_km_s,
    );
    info!(
        "{} above the cutoff, {} fit divergences, {} propagation failures",
        counters.cutoff.load(Ordering::Relaxed),
        counters.fit.load(Ordering::Relaxed),
        counters.propagation.load(Ordering::Relaxed),
    );

    if let (length, Some(path)) = &input.shortlist {
        if *length > 0 {
            store
                .write_miss_shortlist(SGP4_TABLE, *length, path)
                .context(ScanStoreSnafu)?;
            info!("shortlist of {length} transfers written to {path}");
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn scan_parallel(
    store: &ResultStore,
    transfers: &[StoredLambertTransfer],
    seeds: &HashMap<u64, MeanElements>,
    input: &Sgp4ScanInput,
    cancel: &AtomicBool,
    progress: &ProgressReporter,
    counters: &FailureCounters,
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
                transfers.par_iter().for_each_with(sender, |sender, transfer| {
                    if cancel.load(Ordering::Relaxed) {
                        return;
                    }
                    sender
                        .send(evaluate_transfer(transfer, seeds, input, counters))
                        .ok();
                });
            });
        });

        for record in receiver {
            store.insert_miss(SGP4_TABLE, &record).context(ScanStoreSnafu)?;
            progress.tick();
        }
        Ok(())
    })
}

/// Evaluates one lambert row. Any failure yields the zeroed success = 0 row.
fn evaluate_transfer(
    transfer: &StoredLambertTransfer,
    seeds: &HashMap<u64, MeanElements>,
    input: &Sgp4ScanInput,
    counters: &FailureCounters,
) -> PropagationRecord {
    let row = &transfer.record;

    if row.transfer_delta_v_km_s > input.transfer_delta_v_cutoff_km_s {
        counters.cutoff.fetch_add(1, Ordering::Relaxed);
        return PropagationRecord::failed(transfer.transfer_id);
    }

    let Some(seed) = seeds.get(&row.departure_object_id) else {
        warn!(
            "departure object {} of transfer {} is not in the catalog",
            row.departure_object_id, transfer.transfer_id
        );
        counters.fit.fetch_add(1, Ordering::Relaxed);
        return PropagationRecord::failed(transfer.transfer_id);
    };

    // The transfer object's state just after the departure burn.
    let departure_position = row.departure_position_km;
    let departure_velocity = row.departure_velocity_km_s + row.departure_delta_v_km_s;
    let departure_epoch = Epoch::from_jde_utc(row.departure_epoch_jd);

    let fit = match fit_mean_elements(
        &departure_position,
        &departure_velocity,
        departure_epoch,
        seed,
        EARTH_GRAVITATIONAL_PARAMETER_KM3_S2,
        &input.tolerances,
    ) {
        Ok(fit) => fit,
        Err(error) => {
            warn!("transfer {}: {error}", transfer.transfer_id);
            counters.fit.fetch_add(1, Ordering::Relaxed);
            return PropagationRecord::failed(transfer.transfer_id);
        }
    };

    // Guard the arrival propagation on the fit quality at departure, not at
    // arrival: a bad fit must not masquerade as a large arrival miss.
    let target = state_vector(&departure_position, &departure_velocity);
    if !convergence_test(&fit.predicted, &target, &input.tolerances) {
        counters.fit.fetch_add(1, Ordering::Relaxed);
        return PropagationRecord::failed(transfer.transfer_id);
    }

    let (arrival_position, arrival_velocity) =
        match propagate_mean_elements(&fit.elements, row.time_of_flight_s) {
            Ok(state) => state,
            Err(error) => {
                warn!("transfer {}: {error}", transfer.transfer_id);
                counters.propagation.fetch_add(1, Ordering::Relaxed);
                return PropagationRecord::failed(transfer.transfer_id);
            }
        };

    // Position compares against the Lambert arrival point; velocity against
    // the transfer velocity just before the arrival burn.
    PropagationRecord::from_states(
        transfer.transfer_id,
        arrival_position,
        arrival_velocity,
        row.arrival_position_km,
        row.arrival_velocity_km_s - row.arrival_delta_v_km_s,
    )
}
