/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::errors::{AstroError, AstroResult, MathError};
use crate::math::angles::between_0_tau;

/// Relative step below which the Kepler iteration is considered converged.
pub const KEPLER_TOLERANCE: f64 = 1e-12;

/// Iteration cap for the Kepler solver. Newton on the elliptic equation is
/// monotone from the M + e sin M start, so the cap is only reached for
/// pathological eccentricities.
pub const KEPLER_MAX_ITERATIONS: usize = 50;

/// Computes the eccentric anomaly from the true anomaly for an elliptic orbit.
pub fn true_to_eccentric_anomaly_rad(nu_rad: f64, ecc: f64) -> AstroResult<f64> {
    validate_elliptic(ecc)?;
    // E = atan2( sqrt(1 - e^2) * sin(nu), e + cos(nu) )
    let num = (1.0 - ecc * ecc).sqrt() * nu_rad.sin();
    let den = ecc + nu_rad.cos();
    Ok(between_0_tau(num.atan2(den)))
}

/// Computes the true anomaly from the eccentric anomaly for an elliptic orbit.
pub fn eccentric_to_true_anomaly_rad(ea_rad: f64, ecc: f64) -> AstroResult<f64> {
    validate_elliptic(ecc)?;
    let num = (1.0 - ecc * ecc).sqrt() * ea_rad.sin();
    let den = ea_rad.cos() - ecc;
    Ok(between_0_tau(num.atan2(den)))
}

/// Kepler's equation, forward direction: M = E - e sin E.
pub fn eccentric_to_mean_anomaly_rad(ea_rad: f64, ecc: f64) -> AstroResult<f64> {
    validate_elliptic(ecc)?;
    Ok(between_0_tau(ea_rad - ecc * ea_rad.sin()))
}

/// Solves Kepler's equation M = E - e sin E for E with a bounded Newton
/// iteration started from E = M + e sin M.
pub fn mean_to_eccentric_anomaly_rad(ma_rad: f64, ecc: f64) -> AstroResult<f64> {
    validate_elliptic(ecc)?;
    let ma = between_0_tau(ma_rad);
    let mut ea = ma + ecc * ma.sin();

    for _ in 0..KEPLER_MAX_ITERATIONS {
        let residual = ea - ecc * ea.sin() - ma;
        let derivative = 1.0 - ecc * ea.cos();
        if derivative.abs() < f64::EPSILON {
            return Err(AstroError::AppliedMath {
                source: MathError::DivisionByZero {
                    action: "solving Kepler's equation",
                },
            });
        }
        let step = residual / derivative;
        ea -= step;
        if step.abs() < KEPLER_TOLERANCE * (1.0 + ea.abs()) {
            return Ok(between_0_tau(ea));
        }
    }

    Err(AstroError::KeplerSolveDivergence {
        iter: KEPLER_MAX_ITERATIONS,
        residual: (ea - ecc * ea.sin() - ma).abs(),
    })
}

/// True anomaly to mean anomaly, through the eccentric anomaly.
pub fn true_to_mean_anomaly_rad(nu_rad: f64, ecc: f64) -> AstroResult<f64> {
    let ea = true_to_eccentric_anomaly_rad(nu_rad, ecc)?;
    eccentric_to_mean_anomaly_rad(ea, ecc)
}

/// Mean anomaly to true anomaly, through the Kepler solve.
pub fn mean_to_true_anomaly_rad(ma_rad: f64, ecc: f64) -> AstroResult<f64> {
    let ea = mean_to_eccentric_anomaly_rad(ma_rad, ecc)?;
    eccentric_to_true_anomaly_rad(ea, ecc)
}

fn validate_elliptic(ecc: f64) -> AstroResult<()> {
    if ecc < 0.0 {
        return Err(AstroError::AppliedMath {
            source: MathError::DomainError {
                value: ecc,
                msg: "eccentricity cannot be negative",
            },
        });
    }
    if ecc >= 1.0 {
        return Err(AstroError::AppliedMath {
            source: MathError::DomainError {
                value: ecc,
                msg: "anomaly conversions require an elliptic orbit",
            },
        });
    }
    Ok(())
}
