//! # Dead Reckoning
//!
//! Extrapolates position and trip log from the last race service sample,
//! assuming constant speed and course since the sample was taken.
//!
//! This is a flat-earth (rhumb line, small angle) approximation. It is meant
//! for the few seconds to minutes between two samples; accuracy degrades with
//! elapsed time and near the poles.

use super::geo::Position;
use super::units::{deg_to_rad, METERS_PER_NM};

/// Below this `cos(latitude)` the longitude correction is skipped.
const POLE_GUARD: f64 = 1e-9;

/// Extrapolated position and log
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Extrapolated position
    pub position: Position,

    /// Extrapolated cumulative trip log in metres
    pub trip_log: f64,
}

/// Extrapolate from an origin sample.
///
/// # Arguments
///
/// * `origin` - Position at sample time
/// * `sog` - Speed over ground in m/s
/// * `cog` - Course over ground in radians
/// * `trip_log` - Trip log at sample time in metres
/// * `elapsed_secs` - Seconds since the sample; negative values count as zero
///   so the log never runs backwards
///
/// # Examples
///
/// ```
/// use vlm_bridge::nav::dead_reckoning::extrapolate;
/// use vlm_bridge::nav::geo::Position;
///
/// let origin = Position::new(0.0, 0.0);
/// let est = extrapolate(origin, 1852.0 / 3600.0, std::f64::consts::FRAC_PI_2, 0.0, 3600.0);
/// assert!((est.position.longitude - 1.0 / 60.0).abs() < 1e-9);
/// ```
pub fn extrapolate(origin: Position, sog: f64, cog: f64, trip_log: f64, elapsed_secs: f64) -> Estimate {
    let elapsed_secs = elapsed_secs.max(0.0);
    let run_m = sog * elapsed_secs;
    let distance_nm = run_m / METERS_PER_NM;

    // One minute of arc is one nautical mile
    let dlat = distance_nm / 60.0 * cog.cos();

    let cos_lat = deg_to_rad(origin.latitude).cos();
    let dlon = if cos_lat.abs() < POLE_GUARD {
        0.0
    } else {
        distance_nm / 60.0 * cog.sin() / cos_lat
    };

    Estimate {
        position: Position::new(origin.latitude + dlat, origin.longitude + dlon),
        trip_log: trip_log + run_m,
    }
}
