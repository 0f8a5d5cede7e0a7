//! Great-circle distance between coordinate pairs.
//!
//! The dispatch engine prefers the external mapping service for agent-to-market distances, but any error from that
//! service degrades to the Haversine result computed here. The formula is exact enough for scoring tiers measured in
//! whole kilometres.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Haversine distance between two coordinates, in kilometres. Pure, no failure modes.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_distance() {
        let origin = Coordinate::new(0.0, 0.0);
        assert_eq!(haversine_distance(origin, origin), 0.0);
    }

    #[test]
    fn symmetric() {
        let lagos = Coordinate::new(6.5244, 3.3792);
        let abuja = Coordinate::new(9.0765, 7.3986);
        let there = haversine_distance(lagos, abuja);
        let back = haversine_distance(abuja, lagos);
        assert!((there - back).abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_latitude() {
        // One degree of latitude is ~111.19 km; Haversine should land within 1%.
        let a = Coordinate::new(6.0, 3.0);
        let b = Coordinate::new(7.0, 3.0);
        let d = haversine_distance(a, b);
        assert!((d - 111.19).abs() / 111.19 < 0.01, "distance was {d}");
    }
}
