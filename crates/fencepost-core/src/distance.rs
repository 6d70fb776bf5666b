//! Great-circle distance between coordinates.

use crate::types::Coordinate;

/// Mean Earth radius in meters used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two coordinates.
///
/// Symmetric, and zero for identical points. Inputs are expected to be
/// valid degree values; NaN propagates.
#[must_use]
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFICE: Coordinate = Coordinate::new(22.318_820, 73.187_437);

    #[test]
    fn test_identity_is_zero() {
        assert_eq!(distance(OFFICE, OFFICE), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let pairs = [
            (OFFICE, Coordinate::new(22.319_820, 73.187_437)),
            (Coordinate::new(51.5074, -0.1278), Coordinate::new(40.7128, -74.0060)),
            (Coordinate::new(-33.8688, 151.2093), Coordinate::new(35.6762, 139.6503)),
        ];
        for (a, b) in pairs {
            assert_eq!(distance(a, b), distance(b, a));
        }
    }

    #[test]
    fn test_thousandth_degree_of_latitude() {
        let north = Coordinate::new(22.319_820, 73.187_437);
        let d = distance(OFFICE, north);
        assert!((d - 111.19).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_long_haul() {
        // London to New York is roughly 5570 km.
        let d = distance(
            Coordinate::new(51.5074, -0.1278),
            Coordinate::new(40.7128, -74.0060),
        );
        assert!((d / 1000.0 - 5570.0).abs() < 15.0, "got {d}");
    }
}
