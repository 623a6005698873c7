/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod anomalies;
pub mod elements;
pub mod kepler;
pub mod lambert;

/// Tolerance below which angular momentum, eccentricity, or inclination are
/// treated as singular by the element conversions.
pub const SINGULARITY_TOLERANCE: f64 = 1e-11;
