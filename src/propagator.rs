/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Bridge to the external SGP4/SDP4 mean-element propagator.
//!
//! The contract consumed by the scans: deterministic, pure of its inputs, and
//! safe under concurrent calls since every invocation initializes its own
//! propagation constants. Model failures surface as `PropagatorDomain`.

use hifitime::Epoch;

use crate::catalog::MeanElements;
use crate::constants::SECONDS_PER_MINUTE;
use crate::errors::PropagatorError;
use crate::math::Vector3;

/// Propagates a mean-element set by `seconds_from_epoch` (negative values
/// propagate backwards) and returns the TEME position and velocity in km and
/// km/s.
pub fn propagate_mean_elements(
    elements: &MeanElements,
    seconds_from_epoch: f64,
) -> Result<(Vector3, Vector3), PropagatorError> {
    let sgp4_elements = elements.to_sgp4_elements()?;
    let constants = sgp4::Constants::from_elements(&sgp4_elements).map_err(|error| {
        PropagatorError::ElementsRejected {
            reason: error.to_string(),
        }
    })?;
    let prediction = constants
        .propagate(sgp4::MinutesSinceEpoch(seconds_from_epoch / SECONDS_PER_MINUTE))
        .map_err(|error| PropagatorError::PropagatorDomain {
            reason: error.to_string(),
        })?;
    Ok((
        Vector3::from(prediction.position),
        Vector3::from(prediction.velocity),
    ))
}

/// Propagates a mean-element set to an absolute epoch.
pub fn propagate_mean_elements_to_epoch(
    elements: &MeanElements,
    epoch: Epoch,
) -> Result<(Vector3, Vector3), PropagatorError> {
    propagate_mean_elements(elements, (epoch - elements.epoch).to_seconds())
}

#[cfg(test)]
mod ut_propagator {
    use super::*;
    use crate::catalog::parse_catalog;
    use approx::assert_relative_eq;

    const ISS_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    fn iss() -> MeanElements {
        let catalog = parse_catalog(&format!("{ISS_LINE1}\n{ISS_LINE2}\n")).unwrap();
        catalog[0].elements.clone()
    }

    #[test]
    fn test_propagation_at_epoch() {
        let (r, v) = propagate_mean_elements(&iss(), 0.0).unwrap();
        // LEO sanity: radius near 6720 km, speed near 7.7 km/s.
        assert_relative_eq!(r.norm(), 6720.0, max_relative = 0.02);
        assert_relative_eq!(v.norm(), 7.66, max_relative = 0.02);
    }

    #[test]
    fn test_determinism() {
        let elements = iss();
        let (r1, v1) = propagate_mean_elements(&elements, 5400.0).unwrap();
        let (r2, v2) = propagate_mean_elements(&elements, 5400.0).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(v1, v2);
    }

    #[test]
    fn test_absolute_epoch_matches_offset() {
        let elements = iss();
        let target = elements.epoch + hifitime::Unit::Minute * 90;
        let (r_abs, _) = propagate_mean_elements_to_epoch(&elements, target).unwrap();
        let (r_off, _) = propagate_mean_elements(&elements, 5400.0).unwrap();
        assert_relative_eq!((r_abs - r_off).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_struct_round_trip_propagates_identically() {
        // The structured record and the text-parsed element set must drive the
        // propagator to the same state.
        let parsed =
            sgp4::Elements::from_tle(None, ISS_LINE1.as_bytes(), ISS_LINE2.as_bytes()).unwrap();
        let constants = sgp4::Constants::from_elements(&parsed).unwrap();
        let direct = constants.propagate(sgp4::MinutesSinceEpoch(90.0)).unwrap();

        let (r, _) = propagate_mean_elements(&iss(), 90.0 * 60.0).unwrap();
        for i in 0..3 {
            assert_relative_eq!(r[i], direct.position[i], epsilon = 1e-6);
        }
    }
}
