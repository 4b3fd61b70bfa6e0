//! # Telemetry Module
//!
//! Snapshot records and the Signal K delta stream built from them.
//!
//! This module handles:
//! - Own boat and competitor snapshot types
//! - Building deltas for the own boat and each competitor
//! - Parsing inbound waypoint change notifications
//! - Writing deltas to stdout and to rotating JSONL record files

pub mod types;
pub mod delta;
pub mod sink;
