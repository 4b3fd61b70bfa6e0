//! # Engine State
//!
//! The own boat fix, the fleet table and the pending waypoint request, owned
//! by the scheduler. Ingest results are committed whole; publishing only
//! reads.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::fleet::tracker::RefreshSummary;
use crate::fleet::{FleetSighting, FleetTracker};
use crate::nav::geo::Position;
use crate::telemetry::delta::{own_boat_delta, vessel_delta, Delta, WaypointNotification};
use crate::telemetry::types::{same_waypoint, OwnBoatFix};
use crate::vlm::protocol::TargetAck;

/// State of one polling session
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    fix: Option<OwnBoatFix>,
    fleet: FleetTracker,
    pending_waypoint: Option<Position>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last committed own boat fix
    pub fn fix(&self) -> Option<&OwnBoatFix> {
        self.fix.as_ref()
    }

    /// Competitor tracks
    pub fn fleet(&self) -> &FleetTracker {
        &self.fleet
    }

    /// Waypoint received from the bus and not yet handled
    pub fn pending_waypoint(&self) -> Option<Position> {
        self.pending_waypoint
    }

    /// Race our boat is engaged in, once known
    pub fn race_id(&self) -> Option<&str> {
        self.fix.as_ref().and_then(|f| f.race_id.as_deref())
    }

    /// Replace the own boat fix.
    pub fn commit_fix(&mut self, fix: OwnBoatFix) {
        if self.fix.is_none() {
            info!("First fix for {} ({})", fix.boat_name, fix.boat_id);
        }
        debug!(
            "Committed fix {:.4},{:.4} sog={:.2}m/s pilot={:?}",
            fix.latitude, fix.longitude, fix.speed_over_ground, fix.pilot_mode
        );
        self.fix = Some(fix);
    }

    /// Fold a ranking into the fleet table.
    ///
    /// New competitors inherit our current speed and course; before the first
    /// own fix that is zero.
    pub fn commit_fleet(&mut self, sightings: &[FleetSighting], seen_at: DateTime<Utc>) -> RefreshSummary {
        let (sog, cog) = self
            .fix
            .as_ref()
            .map(|f| (f.speed_over_ground, f.course_over_ground))
            .unwrap_or((0.0, 0.0));
        self.fleet.refresh(sightings, seen_at, sog, cog)
    }

    /// Own boat picture at `now`, if a fix has been committed.
    pub fn own_boat_delta(&self, now: DateTime<Utc>) -> Option<Delta> {
        self.fix.as_ref().map(|fix| own_boat_delta(fix, now))
    }

    /// One delta per tracked competitor
    pub fn fleet_deltas(&self, now: DateTime<Utc>) -> Vec<Delta> {
        self.fleet.tracks().map(|track| vessel_delta(track, now)).collect()
    }

    /// Remember a waypoint requested on the bus; a newer request replaces an
    /// older one.
    pub fn note_waypoint(&mut self, notification: WaypointNotification) {
        debug!(
            "New waypoint target received: {:.7},{:.7}",
            notification.position.latitude, notification.position.longitude
        );
        self.pending_waypoint = Some(notification.position);
    }

    /// Decide whether the pending waypoint must be sent to the race service.
    ///
    /// Requests matching the current waypoint are dropped as already done.
    /// Requests made while the pilot is not following a waypoint are dropped
    /// with a diagnostic.
    pub fn next_waypoint_request(&mut self) -> Option<Position> {
        let Some(target) = self.pending_waypoint else {
            debug!("No new waypoint to set");
            return None;
        };

        let Some(fix) = self.fix.as_ref() else {
            debug!("No fix yet, waypoint request waits");
            return None;
        };

        if fix.waypoint.map(|wp| same_waypoint(wp, target)).unwrap_or(false) {
            debug!("Same waypoint already set");
            self.pending_waypoint = None;
            return None;
        }

        if !fix.pilot_mode.follows_waypoint() {
            debug!("Pilot mode should be orthodromic, VMG or VBVMG to set a waypoint");
            self.pending_waypoint = None;
            return None;
        }

        Some(target)
    }

    /// Record the outcome of a waypoint submission.
    ///
    /// An accepted waypoint becomes current. A rejected one is dropped. A
    /// transport failure leaves the request pending for the next tick.
    pub fn waypoint_submitted(&mut self, target: Position, outcome: Result<TargetAck>) {
        match outcome {
            Ok(_) => {
                info!("Waypoint set to {:.7},{:.7}", target.latitude, target.longitude);
                if let Some(fix) = self.fix.as_mut() {
                    fix.waypoint = Some(target);
                }
                if self.pending_waypoint == Some(target) {
                    self.pending_waypoint = None;
                }
            }
            Err(e) if !e.is_retryable() => {
                error!("Error setting waypoint: {}", e);
                if self.pending_waypoint == Some(target) {
                    self.pending_waypoint = None;
                }
            }
            Err(e) => {
                warn!("Failed to set waypoint, will retry: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VlmBridgeError;
    use crate::nav::autopilot::PilotMode;
    use crate::telemetry::types::fixtures::own_fix;
    use chrono::Duration;

    fn track_mode_state() -> EngineState {
        let mut state = EngineState::new();
        let mut fix = own_fix();
        fix.pilot_mode = PilotMode::Orthodromic;
        fix.waypoint = Some(Position::new(47.0, -4.0));
        state.commit_fix(fix);
        state
    }

    fn note(lat: f64, lon: f64) -> WaypointNotification {
        WaypointNotification { position: Position::new(lat, lon) }
    }

    fn accepted() -> Result<TargetAck> {
        Ok(TargetAck { success: true, raw: "{\"success\":true}".to_string() })
    }

    #[test]
    fn test_no_fix_no_delta() {
        let state = EngineState::new();
        assert!(state.own_boat_delta(Utc::now()).is_none());
        assert!(state.fleet_deltas(Utc::now()).is_empty());
        assert!(state.race_id().is_none());
    }

    #[test]
    fn test_commit_fix_replaces_whole_fix() {
        let mut state = track_mode_state();
        let mut next = own_fix();
        next.latitude = 10.0;
        state.commit_fix(next.clone());
        assert_eq!(state.fix(), Some(&next));
        assert_eq!(state.race_id(), Some("20241110"));
    }

    #[test]
    fn test_commit_fleet_seeds_from_own_fix() {
        let mut state = track_mode_state();
        let sighting = FleetSighting {
            key: "101".to_string(),
            rank: 1,
            name: "Joshua".to_string(),
            flag: "FR".to_string(),
            position: Position::new(45.0, -5.0),
            trip_log: 0.0,
        };
        let now = state.fix().unwrap().timestamp + Duration::seconds(5);
        state.commit_fleet(&[sighting], now);

        let track = state.fleet().get("101").unwrap();
        assert_eq!(track.derived_speed, own_fix().speed_over_ground);
        assert_eq!(track.derived_course, own_fix().course_over_ground);
        assert_eq!(state.fleet_deltas(now).len(), 1);
    }

    #[test]
    fn test_waypoint_request_in_track_mode() {
        let mut state = track_mode_state();
        state.note_waypoint(note(46.5, -2.0));
        assert_eq!(state.next_waypoint_request(), Some(Position::new(46.5, -2.0)));
        // still pending until acknowledged
        assert_eq!(state.pending_waypoint(), Some(Position::new(46.5, -2.0)));
    }

    #[test]
    fn test_waypoint_request_rejected_outside_waypoint_modes() {
        for mode in [PilotMode::None, PilotMode::Heading, PilotMode::Wind, PilotMode::Unknown(8)] {
            let mut state = track_mode_state();
            let mut fix = state.fix().unwrap().clone();
            fix.pilot_mode = mode;
            state.commit_fix(fix);

            state.note_waypoint(note(46.5, -2.0));
            assert_eq!(state.next_waypoint_request(), None, "{:?}", mode);
            assert_eq!(state.pending_waypoint(), None, "request should be dropped in {:?}", mode);
        }
    }

    #[test]
    fn test_waypoint_request_waits_for_first_fix() {
        let mut state = EngineState::new();
        state.note_waypoint(note(46.5, -2.0));
        assert_eq!(state.next_waypoint_request(), None);
        assert!(state.pending_waypoint().is_some());
    }

    #[test]
    fn test_same_waypoint_twice_is_sent_once() {
        let mut state = track_mode_state();
        let mut sent = 0;

        for _ in 0..2 {
            state.note_waypoint(note(46.1234567, -2.7654321));
            if let Some(target) = state.next_waypoint_request() {
                sent += 1;
                state.waypoint_submitted(target, accepted());
            }
        }

        assert_eq!(sent, 1);
        assert_eq!(state.fix().unwrap().waypoint, Some(Position::new(46.1234567, -2.7654321)));
        assert!(state.pending_waypoint().is_none());
    }

    #[test]
    fn test_rejected_waypoint_is_dropped() {
        let mut state = track_mode_state();
        state.note_waypoint(note(46.5, -2.0));
        let target = state.next_waypoint_request().unwrap();
        state.waypoint_submitted(target, Err(VlmBridgeError::WaypointRejected("{}".to_string())));

        assert!(state.pending_waypoint().is_none());
        assert_eq!(state.fix().unwrap().waypoint, Some(Position::new(47.0, -4.0)));
    }

    #[test]
    fn test_transport_failure_keeps_request() {
        let mut state = track_mode_state();
        state.note_waypoint(note(46.5, -2.0));
        let target = state.next_waypoint_request().unwrap();
        state.waypoint_submitted(
            target,
            Err(VlmBridgeError::Transport { status: 502, reason: "Bad Gateway".to_string() }),
        );

        assert_eq!(state.pending_waypoint(), Some(target));
        assert_eq!(state.next_waypoint_request(), Some(target));
    }

    #[test]
    fn test_newer_request_survives_older_ack() {
        let mut state = track_mode_state();
        state.note_waypoint(note(46.5, -2.0));
        let first = state.next_waypoint_request().unwrap();

        // a newer request arrives while the first is in flight
        state.note_waypoint(note(46.6, -2.1));
        state.waypoint_submitted(first, accepted());

        assert_eq!(state.pending_waypoint(), Some(Position::new(46.6, -2.1)));
    }
}
