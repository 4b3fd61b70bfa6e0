//! Trait abstraction for race service operations to enable testing

use async_trait::async_trait;

use super::protocol::{BoatInfo, RankingResponse, TargetAck};
use crate::error::Result;
use crate::nav::geo::Position;

/// Race service operations used by the engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RaceService: Send + Sync {
    /// Fetch the current state of our boat
    async fn boat_info(&self) -> Result<BoatInfo>;

    /// Fetch the ranking of a race
    async fn ranking(&self, race_id: &str) -> Result<RankingResponse>;

    /// Ask the service to steer towards a new waypoint
    async fn set_target(&self, target: Position) -> Result<TargetAck>;
}
