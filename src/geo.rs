//! Great-circle geometry helpers.
//!
//! All coordinates are WGS-84 degrees (latitude, longitude). Distances use
//! the haversine formula with a spherical Earth model, which is accurate to
//! well under a meter at campus scale.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// The 8 cardinal/ordinal labels in clockwise order starting at north.
pub const COMPASS_LABELS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Great-circle distance in meters between two points.
///
/// Total function: any finite inputs yield a finite, non-negative result,
/// and identical points yield exactly 0.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if lat1 == lat2 && lon1 == lon2 {
        return 0.0;
    }

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing in degrees from the first point towards the second,
/// normalized to `[0, 360)`.
pub fn bearing_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Map a bearing in degrees to the nearest of the 8 compass labels.
pub fn compass_label(bearing_degrees: f64) -> &'static str {
    let sector = (bearing_degrees.rem_euclid(360.0) / 45.0).round() as usize % 8;
    COMPASS_LABELS[sector]
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-6;

    #[test]
    fn distance_is_zero_for_identical_points() {
        assert_eq!(distance_meters(31.0, 121.0, 31.0, 121.0), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let d1 = distance_meters(31.0263, 121.4302, 31.0281, 121.4355);
        let d2 = distance_meters(31.0281, 121.4355, 31.0263, 121.4302);
        assert!((d1 - d2).abs() < EPSILON);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = distance_meters(31.0, 121.0, 32.0, 121.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {}", d);
    }

    #[test]
    fn bearing_cardinal_directions() {
        // Due north and due east from the same origin.
        let north = bearing_degrees(31.0, 121.0, 32.0, 121.0);
        let east = bearing_degrees(0.0, 121.0, 0.0, 122.0);
        assert!(north.abs() < EPSILON, "got {}", north);
        assert!((east - 90.0).abs() < EPSILON, "got {}", east);
    }

    #[test]
    fn bearing_is_normalized() {
        let west = bearing_degrees(0.0, 121.0, 0.0, 120.0);
        assert!((west - 270.0).abs() < EPSILON, "got {}", west);
    }

    #[test]
    fn compass_label_uses_nearest_of_eight() {
        assert_eq!(compass_label(0.0), "N");
        assert_eq!(compass_label(22.4), "N");
        assert_eq!(compass_label(22.6), "NE");
        assert_eq!(compass_label(90.0), "E");
        assert_eq!(compass_label(180.0), "S");
        assert_eq!(compass_label(337.6), "N");
        assert_eq!(compass_label(359.9), "N");
    }
}
