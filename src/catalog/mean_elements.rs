/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use hifitime::Epoch;

use super::{epoch_from_datetime, semi_major_axis_from_mean_motion_km};
use crate::constants::SECONDS_PER_DAY;
use crate::errors::{CatalogError, PropagatorError};
use crate::math::angles::{between_0_360, between_0_tau};

/// A structured mean-element set: the seven propagation scalars plus the
/// drag-like auxiliaries the SGP4/SDP4 model requires.
///
/// This record is the in-memory representation everywhere in the crate;
/// conversion to the propagator's own element type is a boundary operation
/// and never goes through fixed-column text editing.
#[derive(Clone, Debug, PartialEq)]
pub struct MeanElements {
    pub norad_id: u64,
    pub epoch: Epoch,
    /// Mean motion in revolutions per day.
    pub mean_motion_rev_day: f64,
    pub eccentricity: f64,
    pub inclination_deg: f64,
    pub right_ascension_deg: f64,
    pub argument_of_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    /// Radiation-pressure coefficient B* in inverse Earth radii.
    pub drag_term: f64,
    pub mean_motion_dot: f64,
    pub mean_motion_ddot: f64,
}

impl MeanElements {
    /// Builds the structured record from a parsed element set, enforcing the
    /// catalog invariants (0 <= e < 1, i within [0, 180] degrees).
    pub fn from_sgp4_elements(elements: &sgp4::Elements) -> Result<Self, CatalogError> {
        if !(0.0..1.0).contains(&elements.eccentricity) {
            return Err(CatalogError::ElementSetParse {
                reason: format!(
                    "eccentricity {} outside [0, 1)",
                    elements.eccentricity
                ),
            });
        }
        if !(0.0..=180.0).contains(&elements.inclination) {
            return Err(CatalogError::ElementSetParse {
                reason: format!(
                    "inclination {} deg outside [0, 180]",
                    elements.inclination
                ),
            });
        }
        Ok(Self {
            norad_id: elements.norad_id,
            epoch: epoch_from_datetime(&elements.datetime),
            mean_motion_rev_day: elements.mean_motion,
            eccentricity: elements.eccentricity,
            inclination_deg: elements.inclination,
            right_ascension_deg: elements.right_ascension,
            argument_of_perigee_deg: elements.argument_of_perigee,
            mean_anomaly_deg: elements.mean_anomaly,
            drag_term: elements.drag_term,
            mean_motion_dot: elements.mean_motion_dot,
            mean_motion_ddot: elements.mean_motion_ddot,
        })
    }

    /// A drag-free template set, used to seed fits of states that belong to no
    /// catalog object. The orbital scalars are placeholders until
    /// `with_orbital_state` replaces them.
    pub fn template(norad_id: u64, epoch: Epoch) -> Self {
        Self {
            norad_id,
            epoch,
            mean_motion_rev_day: 0.0,
            eccentricity: 0.0,
            inclination_deg: 0.0,
            right_ascension_deg: 0.0,
            argument_of_perigee_deg: 0.0,
            mean_anomaly_deg: 0.0,
            drag_term: 0.0,
            mean_motion_dot: 0.0,
            mean_motion_ddot: 0.0,
        }
    }

    /// Builds a mean-element set carrying this set's drag-like auxiliaries but
    /// the provided orbital state, with all angular elements normalized to
    /// their canonical ranges and the mean motion recomputed from the
    /// semi-major axis.
    #[allow(clippy::too_many_arguments)]
    pub fn with_orbital_state(
        &self,
        epoch: Epoch,
        sma_km: f64,
        ecc: f64,
        inc_rad: f64,
        raan_rad: f64,
        aop_rad: f64,
        mean_anomaly_rad: f64,
        mu_km3_s2: f64,
    ) -> Self {
        // Reflect an out-of-range inclination back into [0, pi]; the node
        // absorbs the half turn.
        let mut inc = between_0_tau(inc_rad);
        let mut raan = raan_rad;
        if inc > std::f64::consts::PI {
            inc = std::f64::consts::TAU - inc;
            raan += std::f64::consts::PI;
        }

        let n_rad_s = (mu_km3_s2 / sma_km.abs().powi(3)).sqrt();
        Self {
            norad_id: self.norad_id,
            epoch,
            mean_motion_rev_day: n_rad_s * SECONDS_PER_DAY / std::f64::consts::TAU,
            eccentricity: ecc.abs(),
            inclination_deg: inc.to_degrees(),
            right_ascension_deg: between_0_360(raan.to_degrees()),
            argument_of_perigee_deg: between_0_360(aop_rad.to_degrees()),
            mean_anomaly_deg: between_0_360(mean_anomaly_rad.to_degrees()),
            drag_term: self.drag_term,
            mean_motion_dot: self.mean_motion_dot,
            mean_motion_ddot: self.mean_motion_ddot,
        }
    }

    /// Semi-major axis recovered from the mean motion through Kepler's third
    /// law, in kilometers.
    pub fn recovered_semi_major_axis_km(&self) -> f64 {
        semi_major_axis_from_mean_motion_km(self.mean_motion_rev_day)
    }

    /// Converts to the propagator's element type through its Orbit
    /// Mean-Elements Message representation. Boundary-only operation.
    pub fn to_sgp4_elements(&self) -> Result<sgp4::Elements, PropagatorError> {
        let (year, month, day, hour, minute, second, nanos) = self.epoch.to_gregorian_utc();
        let omm = serde_json::json!({
            "OBJECT_NAME": null,
            "OBJECT_ID": null,
            "NORAD_CAT_ID": self.norad_id,
            "CLASSIFICATION_TYPE": "U",
            "EPOCH": format!(
                "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{nanos:09}"
            ),
            "MEAN_MOTION": self.mean_motion_rev_day,
            "ECCENTRICITY": self.eccentricity,
            "INCLINATION": self.inclination_deg,
            "RA_OF_ASC_NODE": self.right_ascension_deg,
            "ARG_OF_PERICENTER": self.argument_of_perigee_deg,
            "MEAN_ANOMALY": self.mean_anomaly_deg,
            "BSTAR": self.drag_term,
            "MEAN_MOTION_DOT": self.mean_motion_dot,
            "MEAN_MOTION_DDOT": self.mean_motion_ddot,
            "EPHEMERIS_TYPE": 0,
            "ELEMENT_SET_NO": 0,
            "REV_AT_EPOCH": 0,
        });
        serde_json::from_value(omm).map_err(|error| PropagatorError::ElementsRejected {
            reason: error.to_string(),
        })
    }
}

#[cfg(test)]
mod ut_mean_elements {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    const ISS_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    fn iss() -> MeanElements {
        let parsed =
            sgp4::Elements::from_tle(None, ISS_LINE1.as_bytes(), ISS_LINE2.as_bytes()).unwrap();
        MeanElements::from_sgp4_elements(&parsed).unwrap()
    }

    #[test]
    fn test_struct_round_trip() {
        // Text -> struct -> propagator-element struct must preserve every
        // propagation scalar.
        let elements = iss();
        let back = elements.to_sgp4_elements().unwrap();
        assert_eq!(back.norad_id, 25544);
        assert_relative_eq!(back.mean_motion, 15.72125391);
        assert_relative_eq!(back.inclination, 51.6416);
        assert_relative_eq!(back.right_ascension, 247.4627);
        assert_relative_eq!(back.eccentricity, 0.0006703);
        assert_relative_eq!(back.argument_of_perigee, 130.5360);
        assert_relative_eq!(back.mean_anomaly, 325.0288);
        assert_relative_eq!(back.drag_term, -0.11606e-4);

        let round = MeanElements::from_sgp4_elements(&back).unwrap();
        assert_eq!(round.epoch, elements.epoch);
    }

    #[test]
    fn test_with_orbital_state_normalization() {
        let seed = iss();
        let updated = seed.with_orbital_state(
            seed.epoch,
            7000.0,
            0.01,
            // One and a half turns of inclination folds back into [0, pi].
            1.2 + std::f64::consts::TAU,
            -0.5,
            7.0,
            -1.0,
            crate::constants::EARTH_GRAVITATIONAL_PARAMETER_KM3_S2,
        );
        assert!((0.0..=180.0).contains(&updated.inclination_deg));
        assert_relative_eq!(updated.inclination_deg, 1.2_f64.to_degrees(), epsilon = 1e-9);
        assert!((0.0..360.0).contains(&updated.right_ascension_deg));
        assert!((0.0..360.0).contains(&updated.argument_of_perigee_deg));
        assert!((0.0..360.0).contains(&updated.mean_anomaly_deg));
        // Mean motion recomputed from the semi-major axis.
        let n_rad_s = updated.mean_motion_rev_day * std::f64::consts::TAU / SECONDS_PER_DAY;
        let sma = (crate::constants::EARTH_GRAVITATIONAL_PARAMETER_KM3_S2 / (n_rad_s * n_rad_s))
            .cbrt();
        assert_relative_eq!(sma, 7000.0, max_relative = 1e-12);

        // Retrograde-folding: i > pi reflects and shifts the node.
        let folded = seed.with_orbital_state(
            seed.epoch,
            7000.0,
            0.0,
            PI + 0.3,
            0.0,
            0.0,
            0.0,
            crate::constants::EARTH_GRAVITATIONAL_PARAMETER_KM3_S2,
        );
        assert_relative_eq!(folded.inclination_deg, (PI - 0.3).to_degrees(), epsilon = 1e-9);
        assert_relative_eq!(folded.right_ascension_deg, 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invariants_enforced() {
        let mut bogus = iss().to_sgp4_elements().unwrap();
        bogus.eccentricity = 1.2;
        assert!(MeanElements::from_sgp4_elements(&bogus).is_err());
    }
}
