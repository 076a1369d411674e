//! Great-circle distance.

/// Mean Earth radius in miles.
const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Haversine distance in miles between two lat/lon points.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_MILES * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        assert_eq!(haversine_miles(40.7484, -73.9967, 40.7484, -73.9967), 0.0);
    }

    #[test]
    fn test_one_degree_of_longitude_at_equator() {
        // One degree of arc is 2*pi*R/360 ~= 69.09 miles
        let d = haversine_miles(0.0, 0.0, 0.0, 1.0);
        assert!((d - 69.09).abs() < 0.05, "got {}", d);
    }

    #[test]
    fn test_symmetric() {
        let a = haversine_miles(40.7484, -73.9967, 40.6892, -74.0445);
        let b = haversine_miles(40.6892, -74.0445, 40.7484, -73.9967);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_midtown_to_liberty_island() {
        // Roughly 4.8 miles
        let d = haversine_miles(40.7484, -73.9967, 40.6892, -74.0445);
        assert!((4.0..6.0).contains(&d), "got {}", d);
    }
}
