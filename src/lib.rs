//! # VLM Bridge Library
//!
//! Republish a Virtual Loup de Mer boat, its wind and its fleet as a
//! Signal K delta stream.
//!
//! The race service only refreshes every few minutes. This library derives a
//! 1Hz navigation picture from those sparse samples by dead reckoning, solves
//! the apparent wind, maps the race pilot mode to an autopilot state and
//! tracks competing boats as AIS-like targets.

pub mod config;
pub mod error;
pub mod nav;
pub mod fleet;
pub mod telemetry;
pub mod vlm;
pub mod engine;
