/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use snafu::prelude::*;
use std::io;

/// Errors raised by the low-level iterative math routines.
#[derive(Copy, Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MathError {
    #[snafu(display("prevented a division by zero when {action}"))]
    DivisionByZero { action: &'static str },
    #[snafu(display("{msg}: {value}"))]
    DomainError { value: f64, msg: &'static str },
}

/// Errors raised by the orbital-element algebra and the Lambert solver.
#[derive(Copy, Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AstroError {
    #[snafu(display(
        "numerically degenerate conversion ({value:e} below {tol:e}) while {action}"
    ))]
    NumericallyDegenerate {
        value: f64,
        tol: f64,
        action: &'static str,
    },
    #[snafu(display(
        "Kepler solver diverged after {iter} iterations (residual {residual:e})"
    ))]
    KeplerSolveDivergence { iter: usize, residual: f64 },
    #[snafu(display("invalid transfer geometry: {msg}"))]
    InvalidGeometry { msg: &'static str },
    #[snafu(display("{source}"))]
    AppliedMath { source: MathError },
}

pub type AstroResult<T> = Result<T, AstroError>;

/// Failure of the external mean-element propagator (component contract).
#[derive(Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PropagatorError {
    #[snafu(display("mean-element propagation failed: {reason}"))]
    PropagatorDomain { reason: String },
    #[snafu(display("mean-element set rejected by the propagator: {reason}"))]
    ElementsRejected { reason: String },
}

/// Failure of the virtual mean-element fit.
#[derive(Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FitError {
    #[snafu(display(
        "virtual mean-element fit diverged (residual norm {residual_m:e} m)"
    ))]
    VirtualTleDivergence { residual_m: f64 },
    #[snafu(display("could not seed the fit: {source}"))]
    FitSeed { source: AstroError },
    #[snafu(display("minimizer failed: {reason}"))]
    MinimizerFailure { reason: String },
}

/// Structural problems in the catalog text or its element sets.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CatalogError {
    #[snafu(display("catalog is malformed: {msg}"))]
    MalformedCatalog { msg: String },
    #[snafu(display("could not read catalog {path}: {source}"))]
    CatalogIo { path: String, source: io::Error },
    #[snafu(display("could not parse element set: {reason}"))]
    ElementSetParse { reason: String },
}

/// Problems with the configuration document.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("configuration option \"{name}\" could not be found in the input"))]
    MissingConfigKey { name: String },
    #[snafu(display("configuration option \"{name}\" has the wrong shape: {msg}"))]
    InvalidConfigValue { name: String, msg: String },
    #[snafu(display("requested mode \"{mode}\" is invalid"))]
    UnknownMode { mode: String },
    #[snafu(display("could not read configuration {path}: {source}"))]
    ConfigIo { path: String, source: io::Error },
    #[snafu(display("configuration is not valid JSON: {source}"))]
    ConfigSyntax { source: serde_json::Error },
}

/// Result store failures.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("table \"{table}\" must exist and be populated before this scan"))]
    MissingUpstreamTable { table: &'static str },
    #[snafu(display("database operation failed: {source}"))]
    Database { source: rusqlite::Error },
    #[snafu(display("could not write shortlist {path}: {source}"))]
    ShortlistIo { path: String, source: csv::Error },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Umbrella error for the scan drivers and fetch operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ScanError {
    #[snafu(display("{source}"))]
    ScanCatalog { source: CatalogError },
    #[snafu(display("{source}"))]
    ScanConfig { source: ConfigError },
    #[snafu(display("{source}"))]
    ScanStore { source: StoreError },
    #[snafu(display("{source}"))]
    ScanAstro { source: AstroError },
    #[snafu(display("{source}"))]
    ScanPropagation { source: PropagatorError },
    #[snafu(display("{source}"))]
    ScanFit { source: FitError },
    #[snafu(display("could not write {path}: {source}"))]
    OutputIo { path: String, source: io::Error },
    #[snafu(display("could not write ephemeris {path}: {source}"))]
    EphemerisIo { path: String, source: csv::Error },
    #[snafu(display("transfer {transfer_id} not found in the lambert table"))]
    UnknownTransfer { transfer_id: i64 },
    #[snafu(display("could not build the worker pool: {reason}"))]
    ThreadPool { reason: String },
}

pub type ScanResult<T> = Result<T, ScanError>;

impl From<MathError> for AstroError {
    fn from(source: MathError) -> Self {
        Self::AppliedMath { source }
    }
}
