/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Kessler scans a mean-element catalog of Earth-orbiting objects for impulsive
//! two-burn transfers between every ordered pair of objects. Each candidate
//! transfer is the solution of Lambert's boundary-value problem over a
//! time-of-flight grid; candidates are persisted to a SQLite store, then
//! re-propagated under SGP4/SDP4 (through a fitted virtual mean-element set)
//! and under secular J2 to quantify the miss at arrival.

pub mod astro;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod errors;
pub mod fitter;
pub mod math;
pub mod propagator;
pub mod scan;
pub mod store;

pub mod prelude {
    pub use crate::astro::elements::KeplerianElements;
    pub use crate::astro::lambert::{solve_lambert, LambertSolution};
    pub use crate::catalog::{load_catalog, CatalogEntry, CatalogFilter, MeanElements};
    pub use crate::config::{Config, Mode};
    pub use crate::constants::*;
    pub use crate::errors::*;
    pub use crate::fitter::{fit_mean_elements, FitTolerances};
    pub use crate::math::{Vector3, Vector6};
    pub use crate::propagator::propagate_mean_elements;
    pub use crate::store::ResultStore;
}
