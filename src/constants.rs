/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Earth gravitational parameter in km^3/s^2 (EGM-96).
pub const EARTH_GRAVITATIONAL_PARAMETER_KM3_S2: f64 = 398_600.4418;

/// Earth mean equatorial radius in km (WGS72, the radius baked into the TLE convention).
pub const EARTH_MEAN_RADIUS_KM: f64 = 6378.135;

/// First zonal harmonic of the Earth gravitational potential.
pub const EARTH_J2: f64 = 0.00108263;

pub const SECONDS_PER_DAY: f64 = 86_400.0;

pub const SECONDS_PER_MINUTE: f64 = 60.0;
