/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Multi-revolution Lambert solver.
//!
//! Householder iterations on the Lancaster-Blanchard variable x, with the
//! Battin series near x = 1, the Lagrange expression in the mid range and the
//! Lancaster expression elsewhere for the non-dimensional time of flight.
//! Multi-revolution minima are located with Halley iterations.

use std::f64::consts::PI;

use snafu::ensure;

use crate::errors::{AstroResult, InvalidGeometrySnafu};
use crate::math::Vector3;

/// Cross-product norm below which the endpoints are treated as collinear and
/// the transfer plane undefined.
const COLLINEARITY_TOLERANCE: f64 = 1e-12;

const HOUSEHOLDER_SINGLE_REV_TOLERANCE: f64 = 1e-5;
const HOUSEHOLDER_MULTI_REV_TOLERANCE: f64 = 1e-8;
const HOUSEHOLDER_MAX_ITERATIONS: usize = 15;

/// One conic arc solving the boundary-value problem: the velocity to leave r1
/// with and the velocity the arc arrives at r2 with.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LambertSolution {
    /// Whole revolutions completed along the arc.
    pub revolutions: u32,
    pub v1_km_s: Vector3,
    pub v2_km_s: Vector3,
}

/// Solves Lambert's problem between `r1_km` and `r2_km` over `tof_s` seconds.
///
/// Returns every feasible branch in a fixed order: the zero-revolution arc
/// first, then for each revolution count N >= 1 (up to `max_revolutions`,
/// cropped to the geometric maximum for this time of flight) the short-period
/// branch followed by the long-period branch. Collinear endpoints with a
/// transfer angle near 0 or 2 pi admit no transfer plane and yield an empty
/// vector. The function is pure.
pub fn solve_lambert(
    r1_km: &Vector3,
    r2_km: &Vector3,
    tof_s: f64,
    mu_km3_s2: f64,
    prograde: bool,
    max_revolutions: u32,
) -> AstroResult<Vec<LambertSolution>> {
    ensure!(
        tof_s > 0.0,
        InvalidGeometrySnafu {
            msg: "time of flight must be positive",
        }
    );
    ensure!(
        mu_km3_s2 > 0.0,
        InvalidGeometrySnafu {
            msg: "gravitational parameter must be positive",
        }
    );

    let chord = r2_km - r1_km;
    let c = chord.norm();
    let r1 = r1_km.norm();
    let r2 = r2_km.norm();
    ensure!(
        r1 > 0.0 && r2 > 0.0,
        InvalidGeometrySnafu {
            msg: "endpoint radii must be non-zero",
        }
    );

    let s = (c + r1 + r2) / 2.0;

    let ir1 = r1_km / r1;
    let ir2 = r2_km / r2;
    let h = ir1.cross(&ir2);
    if h.norm() < COLLINEARITY_TOLERANCE {
        // Transfer angle of 0 or 2 pi: no plane, no solution.
        return Ok(Vec::new());
    }
    let ih = h / h.norm();
    ensure!(
        ih[2].abs() > COLLINEARITY_TOLERANCE,
        InvalidGeometrySnafu {
            msg: "transfer plane has no z component, direction convention undefined",
        }
    );

    let lambda2 = 1.0 - c / s;
    let mut lambda = lambda2.sqrt();

    let (mut it1, mut it2) = if ih[2] < 0.0 {
        // Transfer angle larger than pi as seen from +z.
        lambda = -lambda;
        (ir1.cross(&ih), ir2.cross(&ih))
    } else {
        (ih.cross(&ir1), ih.cross(&ir2))
    };
    it1.normalize_mut();
    it2.normalize_mut();

    if !prograde {
        lambda = -lambda;
        it1 = -it1;
        it2 = -it2;
    }

    // Non-dimensional time of flight.
    let t = (2.0 * mu_km3_s2 / s.powi(3)).sqrt() * tof_s;

    let xs = find_x_branches(t, lambda, max_revolutions);

    // Reconstruct the terminal velocities from each x.
    let gamma = (mu_km3_s2 * s / 2.0).sqrt();
    let rho = (r1 - r2) / c;
    let sigma = (1.0 - rho * rho).sqrt();

    let mut solutions = Vec::with_capacity(xs.len());
    for (revolutions, x) in xs {
        let y = (1.0 - lambda2 + lambda2 * x * x).sqrt();
        let vr1 = gamma * ((lambda * y - x) - rho * (lambda * y + x)) / r1;
        let vr2 = -gamma * ((lambda * y - x) + rho * (lambda * y + x)) / r2;
        let vt = gamma * sigma * (y + lambda * x);
        let v1 = vr1 * ir1 + (vt / r1) * it1;
        let v2 = vr2 * ir2 + (vt / r2) * it2;
        solutions.push(LambertSolution {
            revolutions,
            v1_km_s: v1,
            v2_km_s: v2,
        });
    }

    Ok(solutions)
}

/// Roots of the time-of-flight equation, ordered: N = 0 first, then per N the
/// short-period branch before the long-period branch.
fn find_x_branches(t: f64, lambda: f64, max_revolutions: u32) -> Vec<(u32, f64)> {
    let lambda2 = lambda * lambda;
    let lambda3 = lambda2 * lambda;

    let mut n_max = (t / PI) as u32;
    let t00 = lambda.acos() + lambda * (1.0 - lambda2).sqrt();
    let t0 = t00 + n_max as f64 * PI;
    let t1 = 2.0 / 3.0 * (1.0 - lambda3);

    if n_max > 0 && t < t0 {
        // Halley iterations for the minimum time of flight at N = n_max.
        let mut t_min = t0;
        let mut x_old = 0.0_f64;
        let mut it = 0;
        loop {
            let (dt, ddt, dddt) = d_tof_d_x(x_old, t_min, lambda);
            let x_new = if dt != 0.0 {
                x_old - dt * ddt / (ddt * ddt - dt * dddt / 2.0)
            } else {
                x_old
            };
            if (x_old - x_new).abs() < 1e-13 || it > 12 {
                break;
            }
            t_min = x_to_tof(x_new, n_max, lambda);
            x_old = x_new;
            it += 1;
        }
        if t_min > t {
            n_max -= 1;
        }
    }
    n_max = n_max.min(max_revolutions);

    let mut xs = Vec::with_capacity(2 * n_max as usize + 1);

    // Single-revolution starter (Izzo 2014, eq. 30).
    let x0 = if t >= t00 {
        -(t - t00) / (t - t00 + 4.0)
    } else if t <= t1 {
        t1 * (t1 - t) / (2.0 / 5.0 * (1.0 - lambda2 * lambda3) * t) + 1.0
    } else {
        (t / t00).powf(0.69314718055994529 / (t1 / t00).ln()) - 1.0
    };
    xs.push((
        0,
        householder(t, x0, 0, lambda, HOUSEHOLDER_SINGLE_REV_TOLERANCE),
    ));

    for n in 1..=n_max {
        // Short-period branch.
        let tmp = ((n as f64 * PI + PI) / (8.0 * t)).powf(2.0 / 3.0);
        let x0_short = (tmp - 1.0) / (tmp + 1.0);
        xs.push((
            n,
            householder(t, x0_short, n, lambda, HOUSEHOLDER_MULTI_REV_TOLERANCE),
        ));

        // Long-period branch.
        let tmp = ((8.0 * t) / (n as f64 * PI)).powf(2.0 / 3.0);
        let x0_long = (tmp - 1.0) / (tmp + 1.0);
        xs.push((
            n,
            householder(t, x0_long, n, lambda, HOUSEHOLDER_MULTI_REV_TOLERANCE),
        ));
    }

    xs
}

/// Householder third-order root finding on tof(x) - t.
fn householder(t: f64, x0: f64, revolutions: u32, lambda: f64, eps: f64) -> f64 {
    let mut x = x0;
    for _ in 0..HOUSEHOLDER_MAX_ITERATIONS {
        let tof = x_to_tof(x, revolutions, lambda);
        let (dt, ddt, dddt) = d_tof_d_x(x, tof, lambda);
        let delta = tof - t;
        let dt2 = dt * dt;
        let x_new = x
            - delta * (dt2 - delta * ddt / 2.0)
                / (dt * (dt2 - delta * ddt) + dddt * delta * delta / 6.0);
        let err = (x - x_new).abs();
        x = x_new;
        if err < eps {
            break;
        }
    }
    x
}

/// Non-dimensional time of flight for a given x, switching between the
/// Lagrange, Battin and Lancaster expressions by distance from x = 1.
fn x_to_tof(x: f64, revolutions: u32, lambda: f64) -> f64 {
    const BATTIN: f64 = 0.01;
    const LAGRANGE: f64 = 0.2;
    let dist = (x - 1.0).abs();

    if dist < LAGRANGE && dist > BATTIN {
        return x_to_tof_lagrange(x, revolutions, lambda);
    }

    let k = lambda * lambda;
    let e = x * x - 1.0;
    let rho = e.abs();
    let z = (1.0 + k * e).sqrt();

    if dist < BATTIN {
        // Battin series.
        let eta = z - lambda * x;
        let s1 = 0.5 * (1.0 - lambda - x * eta);
        let q = 4.0 / 3.0 * hypergeometric_f(s1, 1e-11);
        (eta.powi(3) * q + 4.0 * lambda * eta) / 2.0
            + revolutions as f64 * PI / rho.powf(1.5)
    } else {
        // Lancaster expression.
        let y = rho.sqrt();
        let g = x * z - lambda * e;
        let d = if e < 0.0 {
            let l = g.acos();
            revolutions as f64 * PI + l
        } else {
            let f = y * (z - lambda * x);
            (f + g).ln()
        };
        (x - lambda * z - d / y) / e
    }
}

fn x_to_tof_lagrange(x: f64, revolutions: u32, lambda: f64) -> f64 {
    let a = 1.0 / (1.0 - x * x);
    if a > 0.0 {
        // Ellipse.
        let alfa = 2.0 * x.acos();
        let mut beta = 2.0 * (lambda * lambda / a).sqrt().asin();
        if lambda < 0.0 {
            beta = -beta;
        }
        a * a.sqrt()
            * ((alfa - alfa.sin()) - (beta - beta.sin()) + 2.0 * PI * revolutions as f64)
            / 2.0
    } else {
        // Hyperbola.
        let alfa = 2.0 * x.acosh();
        let mut beta = 2.0 * (-lambda * lambda / a).sqrt().asinh();
        if lambda < 0.0 {
            beta = -beta;
        }
        -a * (-a).sqrt() * ((beta - beta.sinh()) - (alfa - alfa.sinh())) / 2.0
    }
}

/// First three derivatives of the time of flight with respect to x.
fn d_tof_d_x(x: f64, tof: f64, lambda: f64) -> (f64, f64, f64) {
    let l2 = lambda * lambda;
    let l3 = l2 * lambda;
    let umx2 = 1.0 - x * x;
    let y = (1.0 - l2 * umx2).sqrt();
    let y2 = y * y;
    let y3 = y2 * y;
    let dt = 1.0 / umx2 * (3.0 * tof * x - 2.0 + 2.0 * l3 * x / y);
    let ddt = 1.0 / umx2 * (3.0 * tof + 5.0 * x * dt + 2.0 * (1.0 - l2) * l3 / y3);
    let dddt = 1.0 / umx2 * (7.0 * x * ddt + 8.0 * dt - 6.0 * (1.0 - l2) * l2 * l3 * x / (y3 * y2));
    (dt, ddt, dddt)
}

/// Gauss hypergeometric series 2F1(3, 1, 5/2, z), truncated at `tol`.
fn hypergeometric_f(z: f64, tol: f64) -> f64 {
    let mut sj = 1.0;
    let mut cj = 1.0;
    let mut j = 0;
    loop {
        let cj1 = cj * (3.0 + j as f64) * (1.0 + j as f64) / (2.5 + j as f64) * z / (j as f64 + 1.0);
        sj += cj1;
        if cj1.abs() <= tol {
            return sj;
        }
        cj = cj1;
        j += 1;
    }
}

#[cfg(test)]
mod ut_lambert {
    use super::*;
    use crate::astro::kepler::propagate_kepler;
    use crate::constants::EARTH_GRAVITATIONAL_PARAMETER_KM3_S2 as MU;
    use crate::errors::AstroError;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_rev_boundary_match() {
        // A Kepler propagation of (r1, v1) over the time of flight must land
        // on r2 for every returned branch.
        let r1 = Vector3::new(5000.0, 10000.0, 2100.0);
        let r2 = Vector3::new(-14600.0, 2500.0, 7000.0);
        let tof = 3600.0;

        let solutions = solve_lambert(&r1, &r2, tof, MU, true, 0).unwrap();
        assert_eq!(solutions.len(), 1);
        let sol = &solutions[0];

        let (r_end, v_end) = propagate_kepler(&r1, &sol.v1_km_s, tof, MU).unwrap();
        assert_relative_eq!((r_end - r2).norm(), 0.0, epsilon = 1e-3);
        assert_relative_eq!((v_end - sol.v2_km_s).norm(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_vallado_reference_case() {
        // Vallado, example 7-5: short-way transfer between two LEO positions.
        let r1 = Vector3::new(15945.34, 0.0, 0.0);
        let r2 = Vector3::new(12214.83899, 10249.46731, 0.0);
        let tof = 76.0 * 60.0;

        let solutions = solve_lambert(&r1, &r2, tof, 398_600.4418, true, 0).unwrap();
        let sol = &solutions[0];
        assert_relative_eq!(sol.v1_km_s[0], 2.058913, epsilon = 1e-3);
        assert_relative_eq!(sol.v1_km_s[1], 2.915965, epsilon = 1e-3);
        assert_relative_eq!(sol.v2_km_s[0], -3.451565, epsilon = 1e-3);
        assert_relative_eq!(sol.v2_km_s[1], 0.910315, epsilon = 1e-3);
    }

    #[test]
    fn test_branch_count_with_one_revolution() {
        // A time of flight long enough to admit exactly one full revolution
        // must return three branches: N=0, then short and long period at N=1.
        let r1 = Vector3::new(10000.0, 0.0, 0.0);
        let r2 = Vector3::new(0.0, 12000.0, 0.0);
        let tof = 5.0 * 3600.0;

        let solutions = solve_lambert(&r1, &r2, tof, 398_600.4418, true, 2).unwrap();
        assert_eq!(solutions.len(), 3);
        assert_eq!(solutions[0].revolutions, 0);
        assert_eq!(solutions[1].revolutions, 1);
        assert_eq!(solutions[2].revolutions, 1);
    }

    #[test]
    fn test_multi_rev_branches_match_boundary() {
        let r1 = Vector3::new(10000.0, 0.0, 0.0);
        let r2 = Vector3::new(0.0, 12000.0, 0.0);
        let tof = 5.0 * 3600.0;

        let solutions = solve_lambert(&r1, &r2, tof, MU, true, 2).unwrap();
        for sol in &solutions {
            let (r_end, _) = propagate_kepler(&r1, &sol.v1_km_s, tof, MU).unwrap();
            assert_relative_eq!((r_end - r2).norm(), 0.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_branch_pairing() {
        // Whatever the geometry, N > 0 entries come in pairs.
        let r1 = Vector3::new(8000.0, 1000.0, 500.0);
        let r2 = Vector3::new(-7500.0, 3000.0, -200.0);
        for tof_hours in [2.0, 6.0, 12.0] {
            let solutions =
                solve_lambert(&r1, &r2, tof_hours * 3600.0, MU, true, 4).unwrap();
            let multi: usize = solutions.iter().filter(|s| s.revolutions > 0).count();
            assert_eq!(multi % 2, 0, "multi-rev branches must pair up");
            assert_eq!(solutions[0].revolutions, 0);
        }
    }

    #[test]
    fn test_retrograde_reverses_plane() {
        let r1 = Vector3::new(10000.0, 0.0, 0.0);
        let r2 = Vector3::new(0.0, 12000.0, 0.0);
        let tof = 3600.0;

        let pro = solve_lambert(&r1, &r2, tof, MU, true, 0).unwrap();
        let retro = solve_lambert(&r1, &r2, tof, MU, false, 0).unwrap();

        let h_pro = r1.cross(&pro[0].v1_km_s);
        let h_retro = r1.cross(&retro[0].v1_km_s);
        assert!(h_pro[2] > 0.0);
        assert!(h_retro[2] < 0.0);

        // The retrograde branch still satisfies the boundary conditions.
        let (r_end, _) = propagate_kepler(&r1, &retro[0].v1_km_s, tof, MU).unwrap();
        assert_relative_eq!((r_end - r2).norm(), 0.0, epsilon = 1e-2);
    }

    #[test]
    fn test_collinear_endpoints_yield_empty() {
        let r1 = Vector3::new(9000.0, 0.0, 0.0);
        let r2 = Vector3::new(11000.0, 0.0, 0.0);
        let solutions = solve_lambert(&r1, &r2, 3600.0, MU, true, 2).unwrap();
        assert!(solutions.is_empty());
    }

    #[test]
    fn test_invalid_inputs() {
        let r1 = Vector3::new(9000.0, 100.0, 0.0);
        let r2 = Vector3::new(0.0, 11000.0, 0.0);
        assert!(matches!(
            solve_lambert(&r1, &r2, -10.0, MU, true, 0),
            Err(AstroError::InvalidGeometry { .. })
        ));
        assert!(matches!(
            solve_lambert(&r1, &r2, 3600.0, 0.0, true, 0),
            Err(AstroError::InvalidGeometry { .. })
        ));
    }
}
