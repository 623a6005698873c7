/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Virtual mean-element fit.
//!
//! Given a Cartesian state at an epoch, find a mean-element set whose SGP4
//! propagation reproduces that state at that epoch. The fit drives a
//! derivative-free Nelder-Mead search over the six orbital decision variables
//! {a, e, i, raan, aop, M0}; the drag-like auxiliaries are carried over from a
//! seed element set. The objective is the squared residual norm expressed in
//! meters and meters per second so that position and velocity condition the
//! search uniformly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use argmin::core::{CostFunction, Error as ArgminError, Executor, State};
use argmin::solver::neldermead::NelderMead;
use hifitime::Epoch;
use log::debug;
use snafu::ResultExt;

use crate::astro::anomalies::true_to_mean_anomaly_rad;
use crate::astro::elements::KeplerianElements;
use crate::catalog::MeanElements;
use crate::errors::{FitError, FitSeedSnafu};
use crate::math::{state_vector, Vector3, Vector6};
use crate::propagator::propagate_mean_elements;

/// Cost assigned to decision vectors the propagator rejects, large enough to
/// push the simplex back into the feasible region.
const INFEASIBLE_COST: f64 = 1e30;

const MAX_ITERATIONS_PER_ATTEMPT: u64 = 1500;
const RESTART_ATTEMPTS: usize = 4;
const SIMPLEX_SD_TOLERANCE: f64 = 1e-24;

/// Initial simplex offsets for {a [km], e, i [rad], raan [rad], aop [rad], M0 [rad]}.
const SIMPLEX_STEPS: [f64; 6] = [5.0, 5e-4, 5e-4, 5e-4, 5e-4, 5e-4];

/// Convergence tolerances of the fit, applied per Cartesian component.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FitTolerances {
    pub relative: f64,
    pub absolute: f64,
}

impl Default for FitTolerances {
    fn default() -> Self {
        Self {
            relative: 1e-8,
            absolute: 1e-10,
        }
    }
}

/// Outcome of a successful fit.
#[derive(Clone, Debug)]
pub struct VirtualTleFit {
    pub elements: MeanElements,
    /// State predicted by the fitted elements at the fit epoch, km and km/s.
    pub predicted: Vector6,
    /// Residual norm against the target, in meters and meters per second.
    pub residual_m: f64,
    /// Number of objective evaluations spent by the minimizer.
    pub evaluations: u64,
}

/// The component-wise convergence predicate shared by the fit and the SGP4
/// scan: every component must be finite and within
/// `tol_abs + tol_rel * |target|` of the target.
pub fn convergence_test(predicted: &Vector6, target: &Vector6, tolerances: &FitTolerances) -> bool {
    for i in 0..6 {
        if !predicted[i].is_finite() {
            return false;
        }
        if (predicted[i] - target[i]).abs()
            > tolerances.absolute + tolerances.relative * target[i].abs()
        {
            return false;
        }
    }
    true
}

struct FitObjective {
    seed: MeanElements,
    epoch: Epoch,
    target_km: Vector6,
    mu_km3_s2: f64,
    evaluations: Arc<AtomicU64>,
}

impl FitObjective {
    fn elements_from(&self, decision: &[f64]) -> MeanElements {
        self.seed.with_orbital_state(
            self.epoch,
            decision[0],
            decision[1],
            decision[2],
            decision[3],
            decision[4],
            decision[5],
            self.mu_km3_s2,
        )
    }

    /// Squared residual norm in meters and meters per second.
    fn residual_squared_m(&self, predicted_km: &Vector6) -> f64 {
        let mut cost = 0.0;
        for i in 0..6 {
            let delta_m = (predicted_km[i] - self.target_km[i]) * 1.0e3;
            cost += delta_m * delta_m;
        }
        cost
    }
}

impl CostFunction for FitObjective {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, decision: &Self::Param) -> Result<Self::Output, ArgminError> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        // Decision vectors outside the elliptic domain score a penalty rather
        // than aborting the search.
        if !(decision[0] > 0.0) || decision[1].abs() >= 1.0 {
            return Ok(INFEASIBLE_COST);
        }

        let elements = self.elements_from(decision);
        match propagate_mean_elements(&elements, 0.0) {
            Ok((r, v)) => Ok(self.residual_squared_m(&state_vector(&r, &v))),
            Err(_) => Ok(INFEASIBLE_COST),
        }
    }
}

/// Fits a mean-element set to the target Cartesian state at `epoch`.
///
/// The seed supplies the drag-like auxiliaries and the object identity; the
/// orbital part of the initial guess is the osculating Keplerian conversion of
/// the target itself.
pub fn fit_mean_elements(
    target_radius_km: &Vector3,
    target_velocity_km_s: &Vector3,
    epoch: Epoch,
    seed: &MeanElements,
    mu_km3_s2: f64,
    tolerances: &FitTolerances,
) -> Result<VirtualTleFit, FitError> {
    let osculating = KeplerianElements::try_from_cartesian(target_radius_km, target_velocity_km_s, mu_km3_s2)
        .context(FitSeedSnafu)?;
    let mean_anomaly =
        true_to_mean_anomaly_rad(osculating.true_anomaly_rad, osculating.ecc).context(FitSeedSnafu)?;

    let evaluations = Arc::new(AtomicU64::new(0));
    let objective = FitObjective {
        seed: seed.clone(),
        epoch,
        target_km: state_vector(target_radius_km, target_velocity_km_s),
        mu_km3_s2,
        evaluations: Arc::clone(&evaluations),
    };

    let mut best = vec![
        osculating.sma_km,
        osculating.ecc,
        osculating.inc_rad,
        osculating.raan_rad,
        osculating.aop_rad,
        mean_anomaly,
    ];
    let mut best_cost = f64::INFINITY;

    for attempt in 0..RESTART_ATTEMPTS {
        // Each restart rebuilds the simplex around the best vertex so far,
        // one decade tighter, so later attempts polish instead of re-explore.
        let scale = 0.1_f64.powi(attempt as i32);
        let solver = NelderMead::new(initial_simplex(&best, scale))
            .with_sd_tolerance(SIMPLEX_SD_TOLERANCE)
            .map_err(|error| FitError::MinimizerFailure {
                reason: error.to_string(),
            })?;

        let objective_ref = FitObjective {
            seed: objective.seed.clone(),
            epoch,
            target_km: objective.target_km,
            mu_km3_s2,
            evaluations: Arc::clone(&evaluations),
        };
        let result = Executor::new(objective_ref, solver)
            .configure(|state| state.max_iters(MAX_ITERATIONS_PER_ATTEMPT))
            .run()
            .map_err(|error| FitError::MinimizerFailure {
                reason: error.to_string(),
            })?;

        let state = result.state();
        if let Some(param) = state.get_best_param() {
            if state.get_best_cost() < best_cost {
                best_cost = state.get_best_cost();
                best = param.clone();
            }
        }

        debug!(
            "virtual element fit attempt {attempt}: residual {:.3e} m after {} evaluations",
            best_cost.sqrt(),
            evaluations.load(Ordering::Relaxed)
        );
        if best_cost < (tolerances.absolute * 1.0e3).powi(2) {
            break;
        }
    }

    let elements = objective.elements_from(&best);
    let (r, v) = propagate_mean_elements(&elements, 0.0).map_err(|_| {
        FitError::VirtualTleDivergence {
            residual_m: best_cost.sqrt(),
        }
    })?;
    let predicted = state_vector(&r, &v);

    if !convergence_test(&predicted, &objective.target_km, tolerances) {
        return Err(FitError::VirtualTleDivergence {
            residual_m: objective.residual_squared_m(&predicted).sqrt(),
        });
    }

    Ok(VirtualTleFit {
        elements,
        predicted,
        residual_m: best_cost.sqrt(),
        evaluations: evaluations.load(Ordering::Relaxed),
    })
}

fn initial_simplex(center: &[f64], scale: f64) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(center.len() + 1);
    simplex.push(center.to_vec());
    for (dim, step) in SIMPLEX_STEPS.iter().enumerate() {
        let mut vertex = center.to_vec();
        vertex[dim] += step * scale;
        simplex.push(vertex);
    }
    simplex
}

#[cfg(test)]
mod ut_fitter {
    use super::*;
    use crate::catalog::parse_catalog;
    use crate::constants::EARTH_GRAVITATIONAL_PARAMETER_KM3_S2 as MU;

    const ISS_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    fn seed() -> MeanElements {
        parse_catalog(&format!("{ISS_LINE1}\n{ISS_LINE2}\n")).unwrap()[0]
            .elements
            .clone()
    }

    #[test]
    fn test_convergence_predicate() {
        let target = Vector6::new(7000.0, 0.0, 0.0, 0.0, 7.5, 0.0);
        let tol = FitTolerances::default();

        assert!(convergence_test(&target, &target, &tol));

        let mut off = target;
        off[0] += 1.0e-3; // a meter off on a 7000 km component
        assert!(!convergence_test(&off, &target, &tol));

        let mut nan = target;
        nan[3] = f64::NAN;
        assert!(!convergence_test(&nan, &target, &tol));
    }

    #[test]
    fn test_fit_reproduces_propagated_state() {
        // A state that *is* an SGP4 state must be recoverable.
        let elements = seed();
        let (r, v) = propagate_mean_elements(&elements, 0.0).unwrap();

        let fit = fit_mean_elements(
            &r,
            &v,
            elements.epoch,
            &elements,
            MU,
            &FitTolerances::default(),
        )
        .unwrap();
        assert!(fit.residual_m < 1.0, "residual {} m", fit.residual_m);
        assert!(fit.evaluations > 0);

        // The fixed point holds: propagating the fit reproduces the target.
        let (r_fit, v_fit) = propagate_mean_elements(&fit.elements, 0.0).unwrap();
        let tol = FitTolerances::default();
        assert!(convergence_test(
            &state_vector(&r_fit, &v_fit),
            &state_vector(&r, &v),
            &tol
        ));
    }

    #[test]
    fn test_fit_arbitrary_elliptic_state() {
        // An elliptic state between LEO and MEO altitudes, away from any
        // catalog object.
        let r = Vector3::new(7806.3, 8214.5, -445.8);
        let v = Vector3::new(-3.9, 3.7, 0.4);

        let fit = fit_mean_elements(
            &r,
            &v,
            seed().epoch,
            &seed(),
            MU,
            &FitTolerances::default(),
        )
        .unwrap();

        let (r_fit, v_fit) = propagate_mean_elements(&fit.elements, 0.0).unwrap();
        let target = state_vector(&r, &v);
        let predicted = state_vector(&r_fit, &v_fit);
        for i in 0..6 {
            assert!(
                (predicted[i] - target[i]).abs() <= 1e-10 + 1e-8 * target[i].abs(),
                "component {i}: {} vs {}",
                predicted[i],
                target[i]
            );
        }

        // Angular elements are packed in canonical ranges.
        assert!((0.0..=180.0).contains(&fit.elements.inclination_deg));
        assert!((0.0..360.0).contains(&fit.elements.right_ascension_deg));
        assert!((0.0..360.0).contains(&fit.elements.mean_anomaly_deg));
    }

    #[test]
    fn test_hyperbolic_target_rejected() {
        // Above escape velocity there is no elliptic seed, hence no fit.
        let r = Vector3::new(7806.3, 8214.5, -445.8);
        let v = Vector3::new(-7.9, 7.7, 0.4);
        assert!(fit_mean_elements(
            &r,
            &v,
            seed().epoch,
            &seed(),
            MU,
            &FitTolerances::default()
        )
        .is_err());
    }
}
