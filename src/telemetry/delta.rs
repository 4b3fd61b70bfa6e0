//! # Signal K Deltas
//!
//! Delta messages published on the data bus, builders for the own boat and
//! fleet pictures, and parsing of inbound waypoint change notifications.
//!
//! ## Own Boat Paths
//!
//! | Path | Unit |
//! |------|------|
//! | `navigation.position` | degrees |
//! | `navigation.speedOverGround` | m/s |
//! | `navigation.courseOverGroundTrue` | rad |
//! | `navigation.trip.log` | m |
//! | `environment.wind.speedTrue` | m/s |
//! | `environment.wind.directionTrue` | rad |
//! | `environment.wind.angleTrueGround` | rad |
//! | `environment.wind.angleApparent` | rad |
//! | `environment.wind.speedApparent` | m/s |
//! | `steering.autopilot.state` | - |
//! | `steering.autopilot.target.headingTrue` | rad |
//! | `steering.autopilot.target.windAngleTrueGround` | rad |
//! | `navigation.courseGreatCircle.nextPoint.position` | degrees |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::types::{round_waypoint, OwnBoatFix, VesselTrack};
use crate::nav::autopilot::{AutopilotState, AutopilotTarget};
use crate::nav::geo::Position;

/// Source label carried by every delta we publish
pub const SOURCE_ID: &str = "vlm-bridge";

/// Path of the next waypoint we publish in waypoint-following modes
pub const NEXT_POINT_PATH: &str = "navigation.courseGreatCircle.nextPoint.position";

/// Signal K delta message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Vessel context, absent for our own vessel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    pub updates: Vec<Update>,
}

/// One update inside a delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    #[serde(rename = "$source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub values: Vec<PathValue>,
}

/// A value published on a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    pub path: String,
    pub value: Value,
}

impl PathValue {
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

impl Delta {
    /// Single-update delta stamped with our source
    pub fn new(context: Option<String>, timestamp: DateTime<Utc>, values: Vec<PathValue>) -> Self {
        Self {
            context,
            updates: vec![Update {
                source: Some(SOURCE_ID.to_string()),
                timestamp: Some(timestamp),
                values,
            }],
        }
    }

    /// Number of path values across all updates
    pub fn value_count(&self) -> usize {
        self.updates.iter().map(|u| u.values.len()).sum()
    }
}

fn position_value(position: Position) -> Value {
    json!({
        "latitude": position.latitude,
        "longitude": position.longitude,
    })
}

/// Context of a competing vessel
pub fn vessel_context(mmsi: u32) -> String {
    format!("vessels.urn:mrn:imo:mmsi:{}", mmsi)
}

/// Delta announcing our boat name, sent after each committed ingest.
pub fn own_boat_name(fix: &OwnBoatFix, now: DateTime<Utc>) -> Delta {
    Delta::new(None, now, vec![PathValue::new("name", fix.boat_name.as_str())])
}

/// Own boat picture at `now`, dead-reckoned from the last fix.
pub fn own_boat_delta(fix: &OwnBoatFix, now: DateTime<Utc>) -> Delta {
    let estimate = fix.dead_reckon(now);
    let apparent = fix.apparent_wind();

    let mut values = vec![
        PathValue::new("navigation.position", position_value(estimate.position)),
        PathValue::new("navigation.speedOverGround", fix.speed_over_ground),
        PathValue::new("navigation.courseOverGroundTrue", fix.course_over_ground),
        PathValue::new("environment.wind.speedTrue", fix.true_wind_speed),
        PathValue::new("environment.wind.directionTrue", fix.true_wind_direction),
        PathValue::new("environment.wind.angleTrueGround", fix.true_wind_angle),
        PathValue::new("navigation.trip.log", estimate.trip_log),
        PathValue::new("environment.wind.angleApparent", apparent.angle),
        PathValue::new("environment.wind.speedApparent", apparent.speed),
    ];

    let command = fix.autopilot();
    if command.state != AutopilotState::None {
        values.push(PathValue::new("steering.autopilot.state", command.state.as_str()));
    }
    match command.target {
        Some(AutopilotTarget::HeadingTrue(heading)) => {
            values.push(PathValue::new("steering.autopilot.target.headingTrue", heading));
        }
        Some(AutopilotTarget::WindAngleTrueGround(angle)) => {
            values.push(PathValue::new("steering.autopilot.target.windAngleTrueGround", angle));
        }
        None => {}
    }
    if let Some(waypoint) = command.waypoint {
        values.push(PathValue::new(NEXT_POINT_PATH, position_value(waypoint)));
    }

    Delta::new(None, now, values)
}

/// AIS-like picture of one competitor
pub fn vessel_delta(track: &VesselTrack, now: DateTime<Utc>) -> Delta {
    let values = vec![
        PathValue::new(
            "",
            json!({
                "name": track.name,
                "mmsi": track.mmsi.to_string(),
                "flag": track.flag,
            }),
        ),
        PathValue::new("navigation.position", position_value(track.position())),
        PathValue::new("navigation.speedOverGround", track.derived_speed),
        PathValue::new("navigation.courseOverGroundTrue", track.derived_course),
        PathValue::new("navigation.trip.log", track.trip_log),
    ];

    Delta::new(Some(vessel_context(track.mmsi)), now, values)
}

/// Waypoint change requested by another bus participant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaypointNotification {
    /// Requested waypoint, rounded to race service precision
    pub position: Position,
}

/// Whether a path carries a next-point position (`navigation.course*.nextPoint.position`)
fn is_next_point_path(path: &str) -> bool {
    path.starts_with("navigation.course") && path.ends_with(".nextPoint.position")
}

/// Extract waypoint change notifications from an inbound delta.
///
/// Updates stamped with our own source are echoes of what we published and
/// are ignored. Values that are not `{latitude, longitude}` objects are
/// skipped.
pub fn waypoint_notifications(delta: &Delta) -> Vec<WaypointNotification> {
    delta
        .updates
        .iter()
        .filter(|update| update.source.as_deref() != Some(SOURCE_ID))
        .flat_map(|update| update.values.iter())
        .filter(|pv| is_next_point_path(&pv.path))
        .filter_map(|pv| serde_json::from_value::<Position>(pv.value.clone()).ok())
        .map(|position| WaypointNotification {
            position: round_waypoint(position),
        })
        .collect()
}
