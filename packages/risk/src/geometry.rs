//! Great-circle distance.

/// Earth radius used for all distance calculations, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometers between two `(lon, lat)` points given
/// in degrees.
///
/// Coincident points return exactly `0.0`. The argument to `asin` is
/// clamped to 1 so antipodal points cannot produce `NaN` from rounding.
/// Non-finite input yields non-finite output.
#[must_use]
pub fn distance_km(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (
        lon1.to_radians(),
        lat1.to_radians(),
        lon2.to_radians(),
        lat2.to_radians(),
    );

    let dlon = (lon2 - lon1).abs();
    let dlat = (lat2 - lat1).abs();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().clamp(0.0, 1.0).asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coincident_points_are_zero() {
        for (lon, lat) in [(0.0, 0.0), (10.0, 10.0), (-179.5, 89.9), (180.0, -90.0)] {
            assert!(distance_km(lon, lat, lon, lat).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            ((10.0, 10.0), (15.0, 5.0)),
            ((-73.9, 40.7), (2.35, 48.85)),
            ((179.0, 0.0), (-179.0, 0.0)),
        ];
        for ((lon1, lat1), (lon2, lat2)) in pairs {
            let ab = distance_km(lon1, lat1, lon2, lat2);
            let ba = distance_km(lon2, lat2, lon1, lat1);
            assert!((ab - ba).abs() < f64::EPSILON, "{ab} != {ba}");
        }
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = distance_km(0.0, 0.0, 0.0, 1.0);
        let expected = EARTH_RADIUS_KM * 1.0_f64.to_radians();
        assert!((d - expected).abs() < 1e-9);
    }

    #[test]
    fn antipodal_points_are_half_circumference() {
        let d = distance_km(0.0, 0.0, 180.0, 0.0);
        assert!(d.is_finite());
        assert!((d - EARTH_RADIUS_KM * std::f64::consts::PI).abs() < 1e-6);

        let poles = distance_km(0.0, 90.0, 0.0, -90.0);
        assert!((poles - EARTH_RADIUS_KM * std::f64::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn crosses_the_antimeridian_the_short_way() {
        let d = distance_km(179.0, 0.0, -179.0, 0.0);
        assert!(d < 250.0);
    }

    #[test]
    fn non_finite_input_propagates() {
        assert!(!distance_km(f64::NAN, 0.0, 0.0, 0.0).is_finite());
    }
}
