//! Geofence membership with an accuracy-aware tolerance.
//!
//! Raw fixes in and around buildings routinely report accuracies well above
//! 50 m. The evaluator widens the fence by the reported accuracy, clamped to
//! `[buffer_min_m, buffer_max_m]`, so fixes near the boundary do not flap and
//! a very poor fix cannot make the fence effectively unbounded.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::distance;
use crate::types::{GeofenceDefinition, PositionSample};

/// Default lower bound of the accuracy buffer in meters.
pub const DEFAULT_BUFFER_MIN_M: f64 = 50.0;

/// Default upper bound of the accuracy buffer in meters.
pub const DEFAULT_BUFFER_MAX_M: f64 = 500.0;

/// Default accuracy at or below which a fix counts as accurate.
pub const DEFAULT_ACCURACY_THRESHOLD_M: f64 = 100.0;

/// Decides whether a sample lies within a fence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeofenceEvaluator {
    /// Smallest tolerance added to the radius.
    pub buffer_min_m: f64,

    /// Largest tolerance added to the radius. Also used when accuracy is unknown.
    pub buffer_max_m: f64,

    /// Accuracy threshold for [`GeofenceEvaluator::is_accurate`].
    pub accuracy_threshold_m: f64,
}

impl Default for GeofenceEvaluator {
    fn default() -> Self {
        Self {
            buffer_min_m: DEFAULT_BUFFER_MIN_M,
            buffer_max_m: DEFAULT_BUFFER_MAX_M,
            accuracy_threshold_m: DEFAULT_ACCURACY_THRESHOLD_M,
        }
    }
}

impl GeofenceEvaluator {
    /// Create an evaluator with explicit buffer bounds.
    #[must_use]
    pub fn new(buffer_min_m: f64, buffer_max_m: f64) -> Self {
        Self {
            buffer_min_m,
            buffer_max_m,
            ..Self::default()
        }
    }

    /// Tolerance added to the fence radius for the given sample.
    ///
    /// A sample without a reported accuracy gets the maximum buffer.
    #[must_use]
    pub fn buffer_for(&self, sample: &PositionSample) -> f64 {
        sample
            .accuracy_m
            .filter(|a| !a.is_nan())
            .map_or(self.buffer_max_m, |a| a.max(self.buffer_min_m).min(self.buffer_max_m))
    }

    /// Radius the sample is actually compared against.
    #[must_use]
    pub fn effective_radius(&self, sample: &PositionSample, fence: &GeofenceDefinition) -> f64 {
        fence.radius_m + self.buffer_for(sample)
    }

    /// Whether `sample` is within `fence`. A missing sample is never within.
    #[must_use]
    pub fn is_within(&self, sample: Option<&PositionSample>, fence: &GeofenceDefinition) -> bool {
        let Some(sample) = sample else {
            return false;
        };

        let d = distance(sample.coordinate, fence.center);
        let effective_radius = self.effective_radius(sample, fence);
        let within = d <= effective_radius;

        debug!(
            distance_m = d,
            effective_radius_m = effective_radius,
            within,
            "Evaluated geofence membership"
        );

        within
    }

    /// Whether the sample's reported accuracy meets the accuracy threshold.
    #[must_use]
    pub fn is_accurate(&self, sample: Option<&PositionSample>) -> bool {
        sample
            .and_then(|s| s.accuracy_m)
            .is_some_and(|a| a <= self.accuracy_threshold_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinate;
    use chrono::Utc;

    const OFFICE: Coordinate = Coordinate::new(22.318_820, 73.187_437);

    fn fence() -> GeofenceDefinition {
        GeofenceDefinition::new(OFFICE, 250.0)
    }

    /// A point `meters` due north of the office.
    fn north_of_office(meters: f64) -> Coordinate {
        let degrees = meters / crate::distance::EARTH_RADIUS_M * (180.0 / std::f64::consts::PI);
        Coordinate::new(OFFICE.latitude + degrees, OFFICE.longitude)
    }

    fn sample_at(meters: f64, accuracy: Option<f64>) -> PositionSample {
        PositionSample::new(north_of_office(meters), accuracy, Utc::now())
    }

    #[test]
    fn test_good_fix_gets_minimum_buffer() {
        let evaluator = GeofenceEvaluator::default();
        let s = sample_at(250.0, Some(10.0));
        assert_eq!(evaluator.buffer_for(&s), 50.0);
        assert!((evaluator.effective_radius(&s, &fence()) - 300.0).abs() < f64::EPSILON);
        assert!(evaluator.is_within(Some(&s), &fence()));
    }

    #[test]
    fn test_poor_fix_buffer_is_capped() {
        let evaluator = GeofenceEvaluator::default();
        let s = sample_at(800.0, Some(1000.0));
        assert_eq!(evaluator.buffer_for(&s), 500.0);
        assert!(!evaluator.is_within(Some(&s), &fence()));
    }

    #[test]
    fn test_buffer_tracks_accuracy_between_bounds() {
        let evaluator = GeofenceEvaluator::default();
        let s = sample_at(0.0, Some(120.0));
        assert_eq!(evaluator.buffer_for(&s), 120.0);

        assert!(evaluator.is_within(Some(&sample_at(360.0, Some(120.0))), &fence()));
        assert!(!evaluator.is_within(Some(&sample_at(380.0, Some(120.0))), &fence()));
    }

    #[test]
    fn test_missing_accuracy_is_maximally_uncertain() {
        let evaluator = GeofenceEvaluator::default();
        let s = sample_at(700.0, None);
        assert_eq!(evaluator.buffer_for(&s), 500.0);
        assert!(evaluator.is_within(Some(&s), &fence()));
    }

    #[test]
    fn test_missing_sample_is_outside() {
        assert!(!GeofenceEvaluator::default().is_within(None, &fence()));
    }

    #[test]
    fn test_custom_bounds() {
        let evaluator = GeofenceEvaluator::new(10.0, 20.0);
        assert!(!evaluator.is_within(Some(&sample_at(275.0, Some(5.0))), &fence()));
        assert!(evaluator.is_within(Some(&sample_at(255.0, Some(5.0))), &fence()));
    }

    #[test]
    fn test_is_accurate() {
        let evaluator = GeofenceEvaluator::default();
        assert!(evaluator.is_accurate(Some(&sample_at(0.0, Some(100.0)))));
        assert!(!evaluator.is_accurate(Some(&sample_at(0.0, Some(100.5)))));
        assert!(!evaluator.is_accurate(Some(&sample_at(0.0, None))));
        assert!(!evaluator.is_accurate(None));
    }
}
