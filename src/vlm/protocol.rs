//! # VLM Wire Protocol
//!
//! Response records of the Virtual Loup de Mer web services and their
//! decoding into snapshot types.
//!
//! ## Boat Info Fields
//!
//! | Field | Unit | Meaning |
//! |-------|------|---------|
//! | `LAT`, `LON` | degrees × 1000 | Position |
//! | `BSP` | knots | Boat speed |
//! | `HDG` | degrees | Heading |
//! | `TWD` | degrees | True wind direction |
//! | `TWS` | knots | True wind speed |
//! | `LOC` | nautical miles | Distance sailed |
//! | `PIM` | 0-5 | Pilot mode |
//! | `PIP` | degrees or `"lat,lon@..."` | Pilot parameter |
//! | `IDB` | - | Boat name |
//! | `IDU` | - | Boat identifier |
//! | `RAC` | - | Race identifier |
//!
//! The feed also carries `TWA`, which is not consistent with `TWD` and `HDG`;
//! the true wind angle is always folded from `TWD - HDG` instead.
//!
//! The service is loose with JSON types: numbers often arrive as strings, so
//! numeric fields accept both.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{Result, VlmBridgeError};
use crate::fleet::FleetSighting;
use crate::nav::autopilot::PilotMode;
use crate::nav::geo::Position;
use crate::nav::units::{deg_to_rad, knots_to_mps, nm_to_meters};
use crate::nav::wind::fold_true_wind_angle;
use crate::telemetry::types::OwnBoatFix;

/// Scale of the `LAT`/`LON` integer encoding
pub const POSITION_SCALE: f64 = 1000.0;

/// `targetandhdg` value asking the service to keep its own heading logic
const TARGET_AND_HEADING_NONE: i32 = -1;

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_as_f64(&value).ok_or_else(|| D::Error::custom(format!("expected a number, got {}", value)))
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_f64(&value))
}

fn lenient_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_f64(&value).map(|f| f.round() as i64))
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_string(&value))
}

/// `boatinfo.php` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoatInfo {
    #[serde(rename = "LAT", deserialize_with = "lenient_f64")]
    pub lat: f64,

    #[serde(rename = "LON", deserialize_with = "lenient_f64")]
    pub lon: f64,

    #[serde(rename = "BSP", deserialize_with = "lenient_f64")]
    pub bsp: f64,

    #[serde(rename = "HDG", deserialize_with = "lenient_f64")]
    pub hdg: f64,

    #[serde(rename = "TWD", deserialize_with = "lenient_f64")]
    pub twd: f64,

    #[serde(rename = "TWS", deserialize_with = "lenient_f64")]
    pub tws: f64,

    #[serde(rename = "LOC", deserialize_with = "lenient_f64")]
    pub loc: f64,

    #[serde(rename = "PIM", default, deserialize_with = "lenient_opt_i64")]
    pub pim: Option<i64>,

    #[serde(rename = "PIP", default)]
    pub pip: Option<Value>,

    #[serde(rename = "IDB", default)]
    pub idb: String,

    #[serde(rename = "IDU", default, deserialize_with = "lenient_opt_string")]
    pub idu: Option<String>,

    #[serde(rename = "RAC", default, deserialize_with = "lenient_opt_string")]
    pub rac: Option<String>,
}

/// One entry of `ranking.php`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RankingEntry {
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub rank: Option<i64>,

    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub idusers: Option<String>,

    #[serde(default)]
    pub boatname: String,

    #[serde(deserialize_with = "lenient_f64")]
    pub latitude: f64,

    #[serde(deserialize_with = "lenient_f64")]
    pub longitude: f64,

    #[serde(default)]
    pub country: String,

    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub loch: Option<f64>,
}

/// Ranking entries, keyed by rank or as a list in rank order
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RankingEntries {
    Keyed(BTreeMap<String, RankingEntry>),
    Listed(Vec<RankingEntry>),
}

/// `ranking.php` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RankingResponse {
    #[serde(default)]
    pub success: Option<bool>,

    pub ranking: RankingEntries,
}

/// `target_set.php` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TargetAck {
    #[serde(default)]
    pub success: bool,

    /// Whole response body, kept for diagnostics
    #[serde(skip)]
    pub raw: String,
}

/// Parse a response body, reporting shape errors as malformed responses.
pub fn parse_body<T: for<'de> Deserialize<'de>>(what: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| VlmBridgeError::MalformedResponse(format!("{}: {}", what, e)))
}

/// Parse the waypoint encoded in `PIP` for waypoint-following modes.
///
/// The format is `"lat,lon@heading"`, where the part after `@` is optional.
pub fn parse_pip_waypoint(pip: &str) -> Option<Position> {
    let coords = pip.split('@').next()?;
    let mut parts = coords.split(',');
    let latitude: f64 = parts.next()?.trim().parse().ok()?;
    let longitude: f64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() || !latitude.is_finite() || !longitude.is_finite() {
        return None;
    }
    Some(Position::new(latitude, longitude))
}

/// Decode a boat info record received at `received_at`.
pub fn decode_boat_info(info: &BoatInfo, received_at: DateTime<Utc>) -> OwnBoatFix {
    let pilot_mode = PilotMode::from_code(info.pim);

    let mut pilot_target = 0.0;
    let mut waypoint = None;
    match pilot_mode {
        PilotMode::Heading | PilotMode::Wind => {
            match info.pip.as_ref().and_then(value_as_f64) {
                Some(deg) => pilot_target = deg_to_rad(deg),
                None => warn!("Pilot parameter {:?} is not an angle", info.pip),
            }
        }
        PilotMode::Orthodromic | PilotMode::Vmg | PilotMode::Vbvmg => {
            waypoint = info
                .pip
                .as_ref()
                .and_then(Value::as_str)
                .and_then(parse_pip_waypoint);
            if waypoint.is_none() {
                warn!("Pilot parameter {:?} is not a waypoint", info.pip);
            }
        }
        PilotMode::Unknown(code) => warn!("Unknown pilot mode {}", code),
        PilotMode::None => {}
    }

    OwnBoatFix {
        timestamp: received_at,
        latitude: info.lat / POSITION_SCALE,
        longitude: info.lon / POSITION_SCALE,
        speed_over_ground: knots_to_mps(info.bsp),
        course_over_ground: deg_to_rad(info.hdg),
        true_wind_speed: knots_to_mps(info.tws),
        true_wind_direction: deg_to_rad(info.twd),
        true_wind_angle: fold_true_wind_angle(info.twd, info.hdg),
        trip_log: nm_to_meters(info.loc),
        pilot_mode,
        pilot_target,
        waypoint,
        boat_name: info.idb.clone(),
        boat_id: info.idu.clone().unwrap_or_default(),
        // race "0" means the boat is not engaged
        race_id: info.rac.clone().filter(|r| r != "0"),
    }
}

/// Decode a ranking into fleet sightings, leaving out our own boat.
///
/// # Errors
///
/// Returns error if the service reports failure
pub fn decode_ranking(response: &RankingResponse, own_boat_id: &str) -> Result<Vec<FleetSighting>> {
    if response.success == Some(false) {
        return Err(VlmBridgeError::MalformedResponse("ranking request reported failure".to_string()));
    }

    let ranked: Vec<(i64, &RankingEntry)> = match &response.ranking {
        RankingEntries::Keyed(map) => map
            .iter()
            .filter_map(|(key, entry)| {
                let rank = entry.rank.or_else(|| key.trim().parse().ok())?;
                Some((rank, entry))
            })
            .collect(),
        RankingEntries::Listed(list) => list
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.rank.unwrap_or(i as i64 + 1), entry))
            .collect(),
    };

    let mut sightings: Vec<FleetSighting> = ranked
        .into_iter()
        .filter(|(_, entry)| entry.idusers.as_deref() != Some(own_boat_id))
        .map(|(rank, entry)| {
            let rank = rank.clamp(0, u32::MAX as i64) as u32;
            FleetSighting {
                key: entry.idusers.clone().unwrap_or_else(|| format!("rank-{}", rank)),
                rank,
                name: entry.boatname.clone(),
                flag: entry.country.clone(),
                position: Position::new(entry.latitude, entry.longitude),
                trip_log: entry.loch.map(nm_to_meters).unwrap_or(0.0),
            }
        })
        .collect();
    sightings.sort_by_key(|s| s.rank);
    Ok(sightings)
}

/// `parms` payload of `target_set.php`
pub fn target_set_parms(boat_id: u64, target: Position) -> String {
    json!({
        "pip": {
            "targetlat": target.latitude,
            "targetlong": target.longitude,
            "targetandhdg": TARGET_AND_HEADING_NONE,
        },
        "idu": boat_id.to_string(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BOAT_INFO: &str = r#"{
        "LAT": 46123, "LON": "-1500", "BSP": 10, "HDG": 10, "TWD": 350, "TWA": 12,
        "TWS": "15.5", "LOC": 123.4, "PIM": "3", "PIP": "47.25,-3.75@-1",
        "IDB": "Pen Duick", "IDU": 4242, "RAC": "20241110"
    }"#;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_decode_boat_info_units() {
        let info: BoatInfo = parse_body("boat info", BOAT_INFO.as_bytes()).unwrap();
        let fix = decode_boat_info(&info, t0());

        assert_eq!(fix.timestamp, t0());
        assert!((fix.latitude - 46.123).abs() < 1e-12);
        assert!((fix.longitude + 1.5).abs() < 1e-12);
        assert!((fix.speed_over_ground - 5.1444).abs() < 1e-9);
        assert!((fix.course_over_ground - 10f64.to_radians()).abs() < 1e-12);
        assert!((fix.true_wind_speed - 15.5 * 0.51444).abs() < 1e-9);
        assert!((fix.trip_log - 123.4 * 1852.0).abs() < 1e-6);
        assert_eq!(fix.boat_name, "Pen Duick");
        assert_eq!(fix.boat_id, "4242");
        assert_eq!(fix.race_id.as_deref(), Some("20241110"));
    }

    #[test]
    fn test_decode_boat_info_folds_twa_and_ignores_feed_twa() {
        let info: BoatInfo = parse_body("boat info", BOAT_INFO.as_bytes()).unwrap();
        let fix = decode_boat_info(&info, t0());
        assert!((fix.true_wind_angle - (-20f64).to_radians()).abs() < 1e-12);
    }

    #[test]
    fn test_decode_boat_info_waypoint_mode() {
        let info: BoatInfo = parse_body("boat info", BOAT_INFO.as_bytes()).unwrap();
        let fix = decode_boat_info(&info, t0());
        assert_eq!(fix.pilot_mode, PilotMode::Orthodromic);
        assert_eq!(fix.waypoint, Some(Position::new(47.25, -3.75)));
    }

    #[test]
    fn test_decode_boat_info_angle_modes() {
        for (pim, pip) in [("1", "245"), ("2", "\"-45.5\"")] {
            let body = format!(
                r#"{{"LAT":0,"LON":0,"BSP":0,"HDG":0,"TWD":0,"TWS":0,"LOC":0,"PIM":{},"PIP":{}}}"#,
                pim, pip
            );
            let info: BoatInfo = parse_body("boat info", body.as_bytes()).unwrap();
            let fix = decode_boat_info(&info, t0());
            let expected: f64 = pip.trim_matches('"').parse().unwrap();
            assert!((fix.pilot_target - expected.to_radians()).abs() < 1e-12);
            assert!(fix.waypoint.is_none());
        }
    }

    #[test]
    fn test_decode_boat_info_no_race() {
        let body = r#"{"LAT":0,"LON":0,"BSP":0,"HDG":0,"TWD":0,"TWS":0,"LOC":0,"RAC":"0"}"#;
        let info: BoatInfo = parse_body("boat info", body.as_bytes()).unwrap();
        let fix = decode_boat_info(&info, t0());
        assert_eq!(fix.pilot_mode, PilotMode::None);
        assert!(fix.race_id.is_none());
    }

    #[test]
    fn test_malformed_boat_info() {
        let result: Result<BoatInfo> = parse_body("boat info", br#"{"LAT":"north"}"#);
        match result {
            Err(VlmBridgeError::MalformedResponse(msg)) => assert!(msg.starts_with("boat info")),
            other => panic!("Expected MalformedResponse, got: {:?}", other),
        }

        let result: Result<BoatInfo> = parse_body("boat info", b"<html>503</html>");
        assert!(matches!(result, Err(VlmBridgeError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_pip_waypoint() {
        assert_eq!(parse_pip_waypoint("46.5,-1.75@270"), Some(Position::new(46.5, -1.75)));
        assert_eq!(parse_pip_waypoint("46.5, -1.75"), Some(Position::new(46.5, -1.75)));
        assert_eq!(parse_pip_waypoint("46.5"), None);
        assert_eq!(parse_pip_waypoint("a,b@1"), None);
        assert_eq!(parse_pip_waypoint("1,2,3@4"), None);
    }

    #[test]
    fn test_decode_keyed_ranking() {
        let body = br#"{"success":true,"ranking":{
            "2":{"idusers":"202","boatname":"Joshua","latitude":"45.5","longitude":-6,"country":"FR","loch":"100"},
            "1":{"idusers":"101","boatname":"Lively Lady","latitude":45.7,"longitude":-5.5,"country":"GB","loch":110},
            "3":{"idusers":"4242","boatname":"Pen Duick","latitude":45.0,"longitude":-6.5,"country":"FR","loch":90}
        }}"#;
        let response: RankingResponse = parse_body("ranking", body).unwrap();
        let sightings = decode_ranking(&response, "4242").unwrap();

        assert_eq!(sightings.len(), 2);
        assert_eq!(sightings[0].key, "101");
        assert_eq!(sightings[0].rank, 1);
        assert_eq!(sightings[0].flag, "GB");
        assert_eq!(sightings[1].name, "Joshua");
        assert_eq!(sightings[1].position, Position::new(45.5, -6.0));
        assert_eq!(sightings[1].trip_log, 185_200.0);
    }

    #[test]
    fn test_decode_listed_ranking_without_ids() {
        let body = br#"{"ranking":[
            {"boatname":"A","latitude":1,"longitude":2},
            {"boatname":"B","latitude":3,"longitude":4,"loch":null}
        ]}"#;
        let response: RankingResponse = parse_body("ranking", body).unwrap();
        let sightings = decode_ranking(&response, "4242").unwrap();

        assert_eq!(sightings.len(), 2);
        assert_eq!(sightings[0].key, "rank-1");
        assert_eq!(sightings[1].key, "rank-2");
        assert_eq!(sightings[1].trip_log, 0.0);
    }

    #[test]
    fn test_failed_ranking_is_error() {
        let response: RankingResponse = parse_body("ranking", br#"{"success":false,"ranking":[]}"#).unwrap();
        assert!(decode_ranking(&response, "1").is_err());
    }

    #[test]
    fn test_target_set_parms() {
        let parms = target_set_parms(4242, Position::new(46.1234567, -1.5));
        let value: Value = serde_json::from_str(&parms).unwrap();
        assert_eq!(value["pip"]["targetlat"], 46.1234567);
        assert_eq!(value["pip"]["targetlong"], -1.5);
        assert_eq!(value["pip"]["targetandhdg"], -1);
        assert_eq!(value["idu"], "4242");
    }

    #[test]
    fn test_target_ack() {
        let ack: TargetAck = parse_body("target", br#"{"success":true,"request":{}}"#).unwrap();
        assert!(ack.success);
        let ack: TargetAck = parse_body("target", br#"{"error":{"code":"PIP01"}}"#).unwrap();
        assert!(!ack.success);
    }
}
