/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

// Vector3 is nalgebra's Vector3 with a 64-bit floating point representation.
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Vector6 = nalgebra::Vector6<f64>;

pub mod angles;

/// Packs a position and a velocity into a single state vector, position first.
pub fn state_vector(radius_km: &Vector3, velocity_km_s: &Vector3) -> Vector6 {
    Vector6::new(
        radius_km[0],
        radius_km[1],
        radius_km[2],
        velocity_km_s[0],
        velocity_km_s[1],
        velocity_km_s[2],
    )
}
