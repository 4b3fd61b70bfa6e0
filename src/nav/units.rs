//! # Unit Conversion
//!
//! Helpers between the race service units and the SI units used internally.

use std::f64::consts::PI;

/// Metres per second in one knot (as used by the race service)
pub const MPS_PER_KNOT: f64 = 0.51444;

/// Metres in one nautical mile
pub const METERS_PER_NM: f64 = 1852.0;

/// Degrees to radians
#[inline]
pub fn deg_to_rad(deg: f64) -> f64 {
    deg * PI / 180.0
}

/// Radians to degrees
#[inline]
pub fn rad_to_deg(rad: f64) -> f64 {
    rad * 180.0 / PI
}

/// Knots to metres per second
#[inline]
pub fn knots_to_mps(knots: f64) -> f64 {
    knots * MPS_PER_KNOT
}

/// Metres per second to knots
#[inline]
pub fn mps_to_knots(mps: f64) -> f64 {
    mps / MPS_PER_KNOT
}

/// Nautical miles to metres
#[inline]
pub fn nm_to_meters(nm: f64) -> f64 {
    nm * METERS_PER_NM
}
