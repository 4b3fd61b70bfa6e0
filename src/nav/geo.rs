//! # Great-Circle Geometry
//!
//! Distance and bearing between two positions on a spherical Earth.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in degrees, positive north
    pub latitude: f64,

    /// Longitude in degrees, positive east
    pub longitude: f64,
}

impl Position {
    /// Create a position from degrees
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Haversine distance in metres between two positions.
///
/// ```text
/// a = sin²(Δlat/2) + cos(lat1)·cos(lat2)·sin²(Δlon/2)
/// d = 2·R·atan2(√a, √(1−a))
/// ```
pub fn haversine_distance(from: Position, to: Position) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing (forward azimuth) in radians, in `[0, 2π)`.
pub fn initial_bearing(from: Position, to: Position) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();

    let bearing = y.atan2(x).rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if bearing >= TAU { 0.0 } else { bearing }
}
