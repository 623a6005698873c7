/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::f64::consts::TAU;

/// Returns the provided angle in radians bounded between 0.0 and 2π.
pub fn between_0_tau(angle_rad: f64) -> f64 {
    angle_rad.rem_euclid(TAU)
}

/// Returns the provided angle in degrees bounded between 0.0 and 360.0.
pub fn between_0_360(angle_deg: f64) -> f64 {
    angle_deg.rem_euclid(360.0)
}

#[cfg(test)]
mod ut_angles {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_normalization() {
        assert!((between_0_tau(-PI) - PI).abs() < 1e-15);
        assert!((between_0_tau(3.0 * PI) - PI).abs() < 1e-15);
        assert!((between_0_360(-90.0) - 270.0).abs() < 1e-12);
        assert!((between_0_360(720.5) - 0.5).abs() < 1e-12);
    }
}
