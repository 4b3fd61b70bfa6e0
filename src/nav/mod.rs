//! # Navigation Module
//!
//! Derivation engine turning sparse race service samples into a 1Hz
//! navigation picture.
//!
//! This module handles:
//! - Unit conversion between feed units (degrees, knots, nautical miles) and SI
//! - True/apparent wind triangle resolution
//! - Dead reckoning of position and trip log between samples
//! - Great-circle distance and bearing between fixes
//! - Mapping the race service pilot mode to an autopilot command

pub mod units;
pub mod wind;
pub mod dead_reckoning;
pub mod geo;
pub mod autopilot;
