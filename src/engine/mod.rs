//! # Engine Module
//!
//! Polling engine tying the race service to the delta stream.
//!
//! This module handles:
//! - Holding the own boat fix, fleet table and pending waypoint
//! - Fetching from the race service off the publishing path
//! - Scheduling ingest, publish and waypoint tasks with in-flight guards

pub mod state;
pub mod ingest;
pub mod scheduler;

pub use scheduler::{RunStats, Schedule, Scheduler};
pub use state::EngineState;
