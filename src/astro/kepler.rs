/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::f64::consts::TAU;

use super::anomalies::{mean_to_true_anomaly_rad, true_to_mean_anomaly_rad};
use super::elements::KeplerianElements;
use super::SINGULARITY_TOLERANCE;
use crate::constants::SECONDS_PER_DAY;
use crate::errors::AstroResult;
use crate::math::{state_vector, Vector3, Vector6};

/// An ordered sequence of (Julian date, Cartesian state) samples.
pub type StateHistory = Vec<(f64, Vector6)>;

/// Keplerian orbital period in seconds, for a > 0.
pub fn orbital_period_s(sma_km: f64, mu_km3_s2: f64) -> f64 {
    TAU * (sma_km.powi(3) / mu_km3_s2).sqrt()
}

/// Propagates a two-body state by `dt_s` seconds through the element
/// round-trip: the mean anomaly advances by n dt, everything else is fixed.
pub fn propagate_kepler(
    radius_km: &Vector3,
    velocity_km_s: &Vector3,
    dt_s: f64,
    mu_km3_s2: f64,
) -> AstroResult<(Vector3, Vector3)> {
    let elements =
        KeplerianElements::from_cartesian(radius_km, velocity_km_s, mu_km3_s2, SINGULARITY_TOLERANCE)?;
    let n = elements.mean_motion_rad_s(mu_km3_s2);
    let ma0 = true_to_mean_anomaly_rad(elements.true_anomaly_rad, elements.ecc)?;
    let ta = mean_to_true_anomaly_rad(ma0 + n * dt_s, elements.ecc)?;
    elements
        .with_true_anomaly_rad(ta)
        .to_cartesian(mu_km3_s2, SINGULARITY_TOLERANCE)
}

/// Samples a Kepler orbit at `num_samples` uniform steps over `duration_s`,
/// returning `num_samples + 1` states tagged with their Julian dates.
///
/// Each sample is propagated from the initial state, so the sampling is a pure
/// function of its inputs. Negative durations sample the orbit backwards.
pub fn sample_kepler_orbit(
    radius_km: &Vector3,
    velocity_km_s: &Vector3,
    duration_s: f64,
    num_samples: usize,
    mu_km3_s2: f64,
    initial_epoch_jd: f64,
) -> AstroResult<StateHistory> {
    let mut history = Vec::with_capacity(num_samples + 1);
    history.push((initial_epoch_jd, state_vector(radius_km, velocity_km_s)));
    if num_samples == 0 {
        return Ok(history);
    }
    let step_s = duration_s / num_samples as f64;

    for i in 1..=num_samples {
        let t = i as f64 * step_s;
        let (r, v) = propagate_kepler(radius_km, velocity_km_s, t, mu_km3_s2)?;
        history.push((initial_epoch_jd + t / SECONDS_PER_DAY, state_vector(&r, &v)));
    }

    Ok(history)
}

#[cfg(test)]
mod ut_kepler {
    use super::*;
    use crate::constants::EARTH_GRAVITATIONAL_PARAMETER_KM3_S2 as MU;
    use approx::assert_relative_eq;

    #[test]
    fn test_orbital_period() {
        // LEO at 7000 km: T = 2 pi sqrt(a^3 / mu) ~ 5828.5 s
        let t = orbital_period_s(7000.0, MU);
        assert_relative_eq!(t, 5828.5, max_relative = 1e-4);
    }

    #[test]
    fn test_period_closure() {
        // Propagating one full period must recover the initial state.
        let r = Vector3::new(8000.0, 1200.0, -300.0);
        let v = Vector3::new(-0.8, 7.0, 0.9);
        let elements = KeplerianElements::try_from_cartesian(&r, &v, MU).unwrap();
        let period = orbital_period_s(elements.sma_km, MU);

        let history = sample_kepler_orbit(&r, &v, period, 32, MU, 2457100.0).unwrap();
        assert_eq!(history.len(), 33);

        let first = history.first().unwrap().1;
        let last = history.last().unwrap().1;
        for i in 0..6 {
            assert_relative_eq!(first[i], last[i], epsilon = 1e-5, max_relative = 1e-7);
        }
    }

    #[test]
    fn test_half_period_is_apoapsis() {
        // From periapsis on an eccentric orbit, half a period lands at apoapsis.
        let elements = KeplerianElements {
            sma_km: 10000.0,
            ecc: 0.3,
            inc_rad: 0.5,
            raan_rad: 1.0,
            aop_rad: 2.0,
            true_anomaly_rad: 0.0,
        };
        let (r, v) = elements.to_cartesian(MU, 1e-12).unwrap();
        let period = orbital_period_s(elements.sma_km, MU);
        let (r_half, _) = propagate_kepler(&r, &v, period / 2.0, MU).unwrap();
        assert_relative_eq!(
            r_half.norm(),
            elements.sma_km * (1.0 + elements.ecc),
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_backward_sampling() {
        let r = Vector3::new(7000.0, 0.0, 0.0);
        let v = Vector3::new(0.0, 7.6, 0.0);
        let forward = sample_kepler_orbit(&r, &v, 600.0, 4, MU, 2457100.0).unwrap();
        let (r_end, v_end) = (
            Vector3::new(forward[4].1[0], forward[4].1[1], forward[4].1[2]),
            Vector3::new(forward[4].1[3], forward[4].1[4], forward[4].1[5]),
        );
        let backward =
            sample_kepler_orbit(&r_end, &v_end, -600.0, 4, MU, 2457100.0 + 600.0 / 86400.0)
                .unwrap();
        let back_state = backward.last().unwrap().1;
        for i in 0..3 {
            assert_relative_eq!(back_state[i], r[i], epsilon = 1e-6);
        }
    }
}
