/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::f64::consts::TAU;

use log::warn;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;

use super::SINGULARITY_TOLERANCE;
use crate::errors::{AstroError, AstroResult, NumericallyDegenerateSnafu};
use crate::math::{angles::between_0_tau, Vector3};

/// Osculating Keplerian elements of an elliptic orbit. Angles are stored in
/// radians, the semi-major axis in kilometers.
///
/// The conversions below handle the circular and equatorial singularities with
/// conventional zeros: for a circular orbit the argument of periapsis is zero
/// and the true anomaly is measured from the node (or from the x axis when the
/// orbit is also equatorial); for an equatorial orbit the right ascension of
/// the ascending node is zero and the argument of periapsis is measured from
/// the x axis.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeplerianElements {
    pub sma_km: f64,
    pub ecc: f64,
    pub inc_rad: f64,
    pub raan_rad: f64,
    pub aop_rad: f64,
    pub true_anomaly_rad: f64,
}

impl KeplerianElements {
    /// Converts an inertial Cartesian state to osculating Keplerian elements.
    ///
    /// Fails with `NumericallyDegenerate` when the angular momentum norm falls
    /// below `tol` (the orbit plane is undefined) or when the orbit is
    /// parabolic to within `tol` (the semi-major axis is undefined).
    pub fn from_cartesian(
        radius_km: &Vector3,
        velocity_km_s: &Vector3,
        mu_km3_s2: f64,
        tol: f64,
    ) -> AstroResult<Self> {
        let r = radius_km.norm();
        let v = velocity_km_s.norm();
        ensure!(
            r > tol,
            NumericallyDegenerateSnafu {
                value: r,
                tol,
                action: "converting a Cartesian state to Keplerian elements",
            }
        );

        let h_vec = radius_km.cross(velocity_km_s);
        let h = h_vec.norm();
        ensure!(
            h > tol,
            NumericallyDegenerateSnafu {
                value: h,
                tol,
                action: "recovering the orbit plane from the angular momentum",
            }
        );

        // Node vector, undefined for equatorial orbits.
        let node_vec = Vector3::new(-h_vec[1], h_vec[0], 0.0);
        let node = node_vec.norm();

        let ecc_vec = ((v * v - mu_km3_s2 / r) * radius_km
            - radius_km.dot(velocity_km_s) * velocity_km_s)
            / mu_km3_s2;
        let ecc = ecc_vec.norm();
        ensure!(
            (1.0 - ecc).abs() > tol,
            NumericallyDegenerateSnafu {
                value: (1.0 - ecc).abs(),
                tol,
                action: "recovering the semi-major axis of a near-parabolic orbit",
            }
        );

        let energy = v * v / 2.0 - mu_km3_s2 / r;
        let sma_km = -mu_km3_s2 / (2.0 * energy);

        let inc_rad = (h_vec[2] / h).clamp(-1.0, 1.0).acos();

        let circular = ecc < tol;
        let equatorial = node < tol;

        let raan_rad = if equatorial {
            0.0
        } else {
            let raan = (node_vec[0] / node).clamp(-1.0, 1.0).acos();
            if node_vec[1] < 0.0 {
                TAU - raan
            } else {
                raan
            }
        };

        let aop_rad = if circular {
            0.0
        } else if equatorial {
            // Longitude of periapsis measured from the x axis.
            let aop = (ecc_vec[0] / ecc).clamp(-1.0, 1.0).acos();
            if ecc_vec[1] < 0.0 {
                TAU - aop
            } else {
                aop
            }
        } else {
            let aop = (node_vec.dot(&ecc_vec) / (node * ecc))
                .clamp(-1.0, 1.0)
                .acos();
            if ecc_vec[2] < 0.0 {
                TAU - aop
            } else {
                aop
            }
        };

        let true_anomaly_rad = if circular && equatorial {
            // True longitude measured from the x axis.
            let ta = (radius_km[0] / r).clamp(-1.0, 1.0).acos();
            if radius_km[1] < 0.0 {
                TAU - ta
            } else {
                ta
            }
        } else if circular {
            // Argument of latitude measured from the node.
            let ta = (node_vec.dot(radius_km) / (node * r)).clamp(-1.0, 1.0).acos();
            if radius_km[2] < 0.0 {
                TAU - ta
            } else {
                ta
            }
        } else {
            let ta = (ecc_vec.dot(radius_km) / (ecc * r)).clamp(-1.0, 1.0).acos();
            if radius_km.dot(velocity_km_s) < 0.0 {
                TAU - ta
            } else {
                ta
            }
        };

        Ok(Self {
            sma_km,
            ecc,
            inc_rad,
            raan_rad,
            aop_rad,
            true_anomaly_rad,
        })
    }

    /// Shortcut using the crate-wide singularity tolerance.
    pub fn try_from_cartesian(
        radius_km: &Vector3,
        velocity_km_s: &Vector3,
        mu_km3_s2: f64,
    ) -> AstroResult<Self> {
        Self::from_cartesian(radius_km, velocity_km_s, mu_km3_s2, SINGULARITY_TOLERANCE)
    }

    /// Converts these elements back to an inertial Cartesian state.
    ///
    /// Fails symmetrically to `from_cartesian` when the semi-latus rectum is
    /// degenerate.
    pub fn to_cartesian(&self, mu_km3_s2: f64, tol: f64) -> AstroResult<(Vector3, Vector3)> {
        let ecc = self.ecc;
        if ecc < 0.0 {
            return Err(AstroError::NumericallyDegenerate {
                value: ecc,
                tol,
                action: "converting Keplerian elements with a negative eccentricity",
            });
        }
        let p = self.sma_km * (1.0 - ecc * ecc);
        ensure!(
            p.abs() > tol,
            NumericallyDegenerateSnafu {
                value: p.abs(),
                tol,
                action: "converting Keplerian elements with a degenerate semi-latus rectum",
            }
        );
        if mu_km3_s2.abs() < f64::EPSILON {
            warn!("GM is near zero ({mu_km3_s2} km^3/s^2): expect rounding errors");
        }

        let ta = self.true_anomaly_rad;
        let radius = p / (1.0 + ecc * ta.cos());

        let (sin_aop_ta, cos_aop_ta) = (self.aop_rad + ta).sin_cos();
        let (sin_inc, cos_inc) = self.inc_rad.sin_cos();
        let (sin_raan, cos_raan) = self.raan_rad.sin_cos();
        let (sin_aop, cos_aop) = self.aop_rad.sin_cos();

        let x = radius * (cos_aop_ta * cos_raan - cos_inc * sin_aop_ta * sin_raan);
        let y = radius * (cos_aop_ta * sin_raan + cos_inc * sin_aop_ta * cos_raan);
        let z = radius * sin_aop_ta * sin_inc;

        let sqrt_gm_p = (mu_km3_s2 / p).sqrt();
        let cos_ta_ecc = ta.cos() + ecc;
        let sin_ta = ta.sin();

        let vx = sqrt_gm_p * cos_ta_ecc * (-sin_aop * cos_raan - cos_inc * sin_raan * cos_aop)
            - sqrt_gm_p * sin_ta * (cos_aop * cos_raan - cos_inc * sin_raan * sin_aop);
        let vy = sqrt_gm_p * cos_ta_ecc * (-sin_aop * sin_raan + cos_inc * cos_raan * cos_aop)
            - sqrt_gm_p * sin_ta * (cos_aop * sin_raan + cos_inc * cos_raan * sin_aop);
        let vz = sqrt_gm_p * (cos_ta_ecc * sin_inc * cos_aop - sin_ta * sin_inc * sin_aop);

        Ok((Vector3::new(x, y, z), Vector3::new(vx, vy, vz)))
    }

    /// Keplerian mean motion in rad/s. Only meaningful for elliptic orbits.
    pub fn mean_motion_rad_s(&self, mu_km3_s2: f64) -> f64 {
        (mu_km3_s2 / self.sma_km.powi(3)).sqrt()
    }

    /// Returns a copy with the true anomaly replaced.
    pub fn with_true_anomaly_rad(&self, true_anomaly_rad: f64) -> Self {
        Self {
            true_anomaly_rad: between_0_tau(true_anomaly_rad),
            ..*self
        }
    }
}
