use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Side of a grid cell in degrees.
pub const GRID_SIZE_DEGREES: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle distance between two points in meters.
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let s1 = a.lat.to_radians();
    let s2 = b.lat.to_radians();

    let x = (d_lat / 2.0).sin().powi(2) + s1.cos() * s2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push x a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_METERS * x.sqrt().min(1.0).asin()
}

/// Inclusive radius check.
pub fn within_radius(a: GeoPoint, b: GeoPoint, radius_meters: f64) -> bool {
    distance_meters(a, b) <= radius_meters
}

fn round_to_grid(value: f64) -> f64 {
    let steps = (value / GRID_SIZE_DEGREES).round();
    let rounded = steps * GRID_SIZE_DEGREES;
    (rounded * 1000.0).round() / 1000.0
}

/// Snap a coordinate to its grid cell id, rendered as `"lat,lng"`.
pub fn cell_id(point: GeoPoint) -> String {
    format!("{},{}", round_to_grid(point.lat), round_to_grid(point.lng))
}

/// Centre of a grid cell, or `None` when the id is malformed.
pub fn cell_center(cell_id: &str) -> Option<GeoPoint> {
    let (lat, lng) = cell_id.split_once(',')?;
    let lat = lat.trim().parse::<f64>().ok()?;
    let lng = lng.trim().parse::<f64>().ok()?;
    if lat.is_nan() || lng.is_nan() {
        return None;
    }
    Some(GeoPoint { lat, lng })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint::new(42.7247, -84.4883);
        assert_eq!(distance_meters(p, p), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = distance_meters(a, b);
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint::new(42.7247, -84.4883);
        let b = GeoPoint::new(42.7368, -84.4828);
        assert!((distance_meters(a, b) - distance_meters(b, a)).abs() < 1e-9);
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let a = GeoPoint::new(42.7247, -84.4883);
        let b = GeoPoint::new(42.7260, -84.4870);
        let exact = distance_meters(a, b);

        assert!(within_radius(a, b, exact));
        assert!(!within_radius(a, b, exact - 1e-6));
        assert!(!within_radius(a, b, f64::from_bits(exact.to_bits() - 1)));
    }

    #[test]
    fn cell_id_snaps_to_grid() {
        assert_eq!(cell_id(GeoPoint::new(42.7247, -84.4883)), "42.725,-84.49");
        assert_eq!(cell_id(GeoPoint::new(42.7221, -84.4811)), "42.72,-84.48");
    }

    #[test]
    fn cell_center_parses_and_rejects_garbage() {
        assert_eq!(
            cell_center("42.725,-84.49"),
            Some(GeoPoint::new(42.725, -84.49))
        );
        assert_eq!(cell_center(""), None);
        assert_eq!(cell_center("north,south"), None);
        assert_eq!(cell_center("42.7"), None);
    }
}
