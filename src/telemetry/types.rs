//! # Telemetry Snapshot Types
//!
//! Records shared between ingest, the derivation engine and publishing.
//! Angles are radians and speeds are m/s throughout.

use chrono::{DateTime, Utc};

use crate::nav::autopilot::{map_pilot, AutopilotCommand, PilotMode};
use crate::nav::dead_reckoning::{extrapolate, Estimate};
use crate::nav::geo::Position;
use crate::nav::wind::{solve_apparent_wind, ApparentWind};

/// Decimal places the race service keeps for waypoint coordinates
pub const WAYPOINT_DECIMALS: i32 = 7;

/// Round a position to the waypoint precision of the race service.
pub fn round_waypoint(position: Position) -> Position {
    let scale = 10f64.powi(WAYPOINT_DECIMALS);
    Position::new(
        (position.latitude * scale).round() / scale,
        (position.longitude * scale).round() / scale,
    )
}

/// Whether two waypoints are the same at race service precision.
pub fn same_waypoint(a: Position, b: Position) -> bool {
    round_waypoint(a) == round_waypoint(b)
}

/// Last polled ground truth for our own boat
#[derive(Debug, Clone, PartialEq)]
pub struct OwnBoatFix {
    /// When the sample was received
    pub timestamp: DateTime<Utc>,

    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Speed over ground in m/s
    pub speed_over_ground: f64,

    /// Course over ground in radians
    pub course_over_ground: f64,

    /// True wind speed in m/s
    pub true_wind_speed: f64,

    /// True wind direction in radians
    pub true_wind_direction: f64,

    /// True wind angle in radians, (-π, π]
    pub true_wind_angle: f64,

    /// Cumulative trip log in metres
    pub trip_log: f64,

    /// Pilot mode
    pub pilot_mode: PilotMode,

    /// Pilot angle in radians (heading or wind angle modes only)
    pub pilot_target: f64,

    /// Current waypoint (waypoint-following modes only)
    pub waypoint: Option<Position>,

    /// Display name (`IDB`)
    pub boat_name: String,

    /// Race service boat identifier (`IDU`)
    pub boat_id: String,

    /// Race the boat is engaged in (`RAC`)
    pub race_id: Option<String>,
}

impl OwnBoatFix {
    /// Position at sample time
    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }

    /// Dead-reckoned position and trip log at `now`.
    pub fn dead_reckon(&self, now: DateTime<Utc>) -> Estimate {
        let elapsed_secs = (now - self.timestamp).num_milliseconds() as f64 / 1000.0;
        extrapolate(
            self.position(),
            self.speed_over_ground,
            self.course_over_ground,
            self.trip_log,
            elapsed_secs,
        )
    }

    /// Apparent wind for the sampled true wind and boat speed
    pub fn apparent_wind(&self) -> ApparentWind {
        solve_apparent_wind(self.true_wind_speed, self.true_wind_angle, self.speed_over_ground)
    }

    /// Autopilot command for the sampled pilot settings
    pub fn autopilot(&self) -> AutopilotCommand {
        map_pilot(self.pilot_mode, self.pilot_target, self.waypoint)
    }
}

/// Kinematic estimate for a competing boat
#[derive(Debug, Clone, PartialEq)]
pub struct VesselTrack {
    /// Stable key of the boat in the ranking feed
    pub id: String,

    /// Synthetic AIS-like identity
    pub mmsi: u32,

    /// Boat name
    pub name: String,

    /// Country flag code
    pub flag: String,

    /// Last reported latitude in degrees
    pub latitude: f64,

    /// Last reported longitude in degrees
    pub longitude: f64,

    /// Derived course over ground in radians, [0, 2π)
    pub derived_course: f64,

    /// Derived speed over ground in m/s
    pub derived_speed: f64,

    /// Cumulative trip log in metres
    pub trip_log: f64,

    /// When the boat was last seen in a ranking
    pub last_seen_at: DateTime<Utc>,
}

impl VesselTrack {
    /// Last reported position
    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}
