//! # Wind Triangle
//!
//! Resolves the apparent wind felt on board from the true wind and the boat
//! velocity.
//!
//! The apparent wind vector is the true wind vector added to the negated boat
//! velocity. With the true wind angle `TWA` measured from the bow:
//!
//! ```text
//! AWA = atan2(TWS·sin(TWA), SOG + TWS·cos(TWA))
//! AWS = sqrt((TWS·sin TWA)² + (SOG + TWS·cos TWA)²)
//! ```

use super::units::deg_to_rad;

/// Apparent wind relative to the bow
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApparentWind {
    /// Apparent wind angle in radians, (-π, π], positive to starboard
    pub angle: f64,

    /// Apparent wind speed in m/s
    pub speed: f64,
}

/// Fold a true wind direction and a heading into a signed true wind angle.
///
/// Computes `((180 + TWD - HDG) mod 360) - 180` with a Euclidean modulo, so
/// the result lies in (-180°, 180°] whatever the sign of the raw difference,
/// and returns it in radians. The feed's own `TWA` field is not reliable and
/// is never used.
///
/// # Examples
///
/// ```
/// use vlm_bridge::nav::wind::fold_true_wind_angle;
///
/// let twa = fold_true_wind_angle(350.0, 10.0);
/// assert!((twa.to_degrees() + 20.0).abs() < 1e-9);
/// ```
pub fn fold_true_wind_angle(twd_deg: f64, hdg_deg: f64) -> f64 {
    let folded = (180.0 + twd_deg - hdg_deg).rem_euclid(360.0) - 180.0;
    // rem_euclid lands on [-180, 180); -180 and +180 are the same wind
    let folded = if folded <= -180.0 { 180.0 } else { folded };
    deg_to_rad(folded)
}

/// Solve the wind triangle.
///
/// # Arguments
///
/// * `tws` - True wind speed in m/s
/// * `twa` - True wind angle in radians, (-π, π]
/// * `sog` - Boat speed over ground in m/s
///
/// A head-to-wind boat moving exactly as fast as the wind gives a zero
/// longitudinal component; `atan2` then yields ±π/2 instead of a division by
/// zero.
pub fn solve_apparent_wind(tws: f64, twa: f64, sog: f64) -> ApparentWind {
    let lateral = tws * twa.sin();
    let longitudinal = sog + tws * twa.cos();

    ApparentWind {
        angle: lateral.atan2(longitudinal),
        speed: lateral.hypot(longitudinal),
    }
}
