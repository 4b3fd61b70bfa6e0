//! # Ingest
//!
//! Remote round trips of the ingest tasks. Each returns a fully decoded
//! result or an error; nothing here touches engine state.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Result, VlmBridgeError};
use crate::fleet::FleetSighting;
use crate::nav::geo::Position;
use crate::telemetry::types::OwnBoatFix;
use crate::vlm::protocol::{decode_boat_info, decode_ranking, TargetAck};
use crate::vlm::RaceService;

/// Fetch and decode our boat state.
pub async fn fetch_own_boat(service: &dyn RaceService) -> Result<OwnBoatFix> {
    let info = service.boat_info().await?;
    Ok(decode_boat_info(&info, Utc::now()))
}

/// Fetch and decode a race ranking, leaving out our own boat.
pub async fn fetch_fleet(
    service: &dyn RaceService,
    race_id: &str,
    own_boat_id: &str,
) -> Result<(Vec<FleetSighting>, DateTime<Utc>)> {
    let response = service.ranking(race_id).await?;
    let seen_at = Utc::now();
    let sightings = decode_ranking(&response, own_boat_id)?;
    debug!("Ranking of race {} lists {} competitors", race_id, sightings.len());
    Ok((sightings, seen_at))
}

/// Submit a waypoint.
///
/// An answer without `success` is reported as
/// [`VlmBridgeError::WaypointRejected`] carrying the response body.
pub async fn submit_waypoint(service: &dyn RaceService, target: Position) -> Result<TargetAck> {
    let ack = service.set_target(target).await?;
    if !ack.success {
        return Err(VlmBridgeError::WaypointRejected(ack.raw));
    }
    Ok(ack)
}
