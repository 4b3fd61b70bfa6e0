//! # Fleet Kinematics Tracker
//!
//! Keeps one [`VesselTrack`] per competitor and derives course and speed from
//! the displacement between two successive ranking fixes.
//!
//! A boat seen for the first time has no previous fix, so its speed and
//! course are seeded from our own boat's current values. Tracks are never
//! pruned; a boat missing from a ranking keeps its last state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::nav::geo::{haversine_distance, initial_bearing, Position};
use crate::telemetry::types::VesselTrack;

/// Synthetic MMSIs of boats with a user id count down from this value
pub const MMSI_BASE: u32 = 999_999_999;

/// Size of each synthetic MMSI block
pub const MMSI_BLOCK: u32 = 100_000_000;

/// Synthetic MMSIs of boats known only by rank count down from this value,
/// below the user id block
pub const RANK_MMSI_BASE: u32 = MMSI_BASE - MMSI_BLOCK;

/// One competitor entry of a ranking
#[derive(Debug, Clone, PartialEq)]
pub struct FleetSighting {
    /// Stable key: the per-boat user id when the feed has one, else the rank
    pub key: String,

    /// Rank in the race
    pub rank: u32,

    /// Boat name
    pub name: String,

    /// Country flag code
    pub flag: String,

    /// Reported position
    pub position: Position,

    /// Cumulative distance sailed in metres
    pub trip_log: f64,
}

/// Synthetic identity for a competitor.
///
/// Numeric keys (user ids) below [`MMSI_BLOCK`] map to `MMSI_BASE - id`.
/// Every other key falls back to `RANK_MMSI_BASE - rank`, so the two blocks
/// never overlap.
pub fn synthetic_mmsi(sighting: &FleetSighting) -> u32 {
    match sighting.key.parse::<u32>() {
        Ok(id) if id < MMSI_BLOCK => MMSI_BASE - id,
        Ok(id) => {
            warn!("User id {} does not fit the synthetic MMSI range, using rank {}", id, sighting.rank);
            rank_mmsi(sighting.rank)
        }
        Err(_) => rank_mmsi(sighting.rank),
    }
}

fn rank_mmsi(rank: u32) -> u32 {
    RANK_MMSI_BASE - rank.min(MMSI_BLOCK - 1)
}

/// Counts from one tracker refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub created: usize,
    pub updated: usize,
}

/// Per-competitor kinematic state
#[derive(Debug, Clone, Default)]
pub struct FleetTracker {
    tracks: BTreeMap<String, VesselTrack>,
}

impl FleetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known competitors
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Track of a competitor by key
    pub fn get(&self, key: &str) -> Option<&VesselTrack> {
        self.tracks.get(key)
    }

    /// All tracks, ordered by key
    pub fn tracks(&self) -> impl Iterator<Item = &VesselTrack> {
        self.tracks.values()
    }

    /// Fold a ranking into the tracks.
    ///
    /// # Arguments
    ///
    /// * `sightings` - Ranking entries
    /// * `seen_at` - When the ranking was fetched
    /// * `own_sog` - Our speed over ground in m/s, seeds new tracks
    /// * `own_cog` - Our course over ground in radians, seeds new tracks
    pub fn refresh(
        &mut self,
        sightings: &[FleetSighting],
        seen_at: DateTime<Utc>,
        own_sog: f64,
        own_cog: f64,
    ) -> RefreshSummary {
        let mut summary = RefreshSummary::default();

        for sighting in sightings {
            let (course, speed) = match self.tracks.get(&sighting.key) {
                None => {
                    summary.created += 1;
                    (own_cog, own_sog)
                }
                Some(prev) => {
                    summary.updated += 1;
                    derive_motion(prev, sighting.position, seen_at)
                }
            };

            let track = VesselTrack {
                id: sighting.key.clone(),
                mmsi: synthetic_mmsi(sighting),
                name: sighting.name.clone(),
                flag: sighting.flag.clone(),
                latitude: sighting.position.latitude,
                longitude: sighting.position.longitude,
                derived_course: course,
                derived_speed: speed,
                trip_log: sighting.trip_log,
                last_seen_at: seen_at,
            };
            self.tracks.insert(sighting.key.clone(), track);
        }

        debug!(
            "Fleet refreshed: {} new, {} updated, {} tracked",
            summary.created,
            summary.updated,
            self.tracks.len()
        );
        summary
    }
}

/// Course and speed from the previous fix to `to`.
///
/// A non-positive interval (same ranking seen twice, clock skew) keeps the
/// previous estimate.
fn derive_motion(prev: &VesselTrack, to: Position, seen_at: DateTime<Utc>) -> (f64, f64) {
    let elapsed_secs = (seen_at - prev.last_seen_at).num_milliseconds() as f64 / 1000.0;
    if elapsed_secs <= 0.0 {
        return (prev.derived_course, prev.derived_speed);
    }

    let from = prev.position();
    let distance = haversine_distance(from, to);
    let course = if distance > 0.0 {
        initial_bearing(from, to)
    } else {
        prev.derived_course
    };

    (course, distance / elapsed_secs)
}
