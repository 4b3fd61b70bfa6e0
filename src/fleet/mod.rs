//! # Fleet Module
//!
//! Synthetic AIS-like picture of competing boats, derived only from the
//! positions reported in successive race rankings.

pub mod tracker;

pub use tracker::{FleetSighting, FleetTracker};
