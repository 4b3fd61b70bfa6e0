//! # Autopilot Mode Mapping
//!
//! Converts the race service pilot mode (`PIM`) and pilot parameter into a
//! normalized autopilot command.
//!
//! ## Pilot Modes
//!
//! | PIM | Mode | State | Target |
//! |-----|------|-------|--------|
//! | 1 | Constant heading | `auto` | heading = pilot target |
//! | 2 | Constant wind angle | `wind` | wind angle = −pilot target |
//! | 3 | Orthodromic | `track` | waypoint |
//! | 4 | Best VMG | `vmg` | waypoint |
//! | 5 | VBVMG | `vbvmg` | waypoint |
//! | 0 / missing | none | `none` | - |

use super::geo::Position;

/// Race service pilot mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PilotMode {
    /// No autopilot engaged (0 or missing)
    #[default]
    None,
    /// Hold a true heading
    Heading,
    /// Hold a true wind angle
    Wind,
    /// Follow the great circle to the waypoint
    Orthodromic,
    /// Best VMG towards the waypoint
    Vmg,
    /// Best VMG with tack/gybe optimisation towards the waypoint
    Vbvmg,
    /// A code this bridge does not know
    Unknown(i64),
}

impl PilotMode {
    /// Decode the `PIM` code.
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            None | Some(0) => Self::None,
            Some(1) => Self::Heading,
            Some(2) => Self::Wind,
            Some(3) => Self::Orthodromic,
            Some(4) => Self::Vmg,
            Some(5) => Self::Vbvmg,
            Some(other) => Self::Unknown(other),
        }
    }

    /// Whether the pilot steers towards a waypoint (PIM 3-5).
    ///
    /// Waypoint changes are only accepted in these modes.
    pub fn follows_waypoint(self) -> bool {
        matches!(self, Self::Orthodromic | Self::Vmg | Self::Vbvmg)
    }

    /// Whether `PIP` carries an angle (PIM 1-2) rather than a waypoint.
    pub fn takes_angle(self) -> bool {
        matches!(self, Self::Heading | Self::Wind)
    }
}

/// Normalized autopilot state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutopilotState {
    Auto,
    Wind,
    Track,
    Vmg,
    Vbvmg,
    None,
}

impl AutopilotState {
    /// Value published on `steering.autopilot.state`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Wind => "wind",
            Self::Track => "track",
            Self::Vmg => "vmg",
            Self::Vbvmg => "vbvmg",
            Self::None => "none",
        }
    }
}

/// Autopilot steering target
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutopilotTarget {
    /// True heading in radians
    HeadingTrue(f64),
    /// True wind angle in radians
    WindAngleTrueGround(f64),
}

/// Derived autopilot command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutopilotCommand {
    pub state: AutopilotState,
    pub target: Option<AutopilotTarget>,
    pub waypoint: Option<Position>,
}

/// Map a pilot mode and its parameters to an autopilot command.
///
/// # Arguments
///
/// * `mode` - Pilot mode
/// * `pilot_target` - Pilot angle in radians (used by heading and wind modes)
/// * `waypoint` - Current waypoint (used by waypoint-following modes)
///
/// # Examples
///
/// ```
/// use vlm_bridge::nav::autopilot::{map_pilot, AutopilotState, AutopilotTarget, PilotMode};
///
/// let cmd = map_pilot(PilotMode::Wind, 0.8, None);
/// assert_eq!(cmd.state, AutopilotState::Wind);
/// assert_eq!(cmd.target, Some(AutopilotTarget::WindAngleTrueGround(-0.8)));
/// ```
pub fn map_pilot(mode: PilotMode, pilot_target: f64, waypoint: Option<Position>) -> AutopilotCommand {
    let (state, target) = match mode {
        PilotMode::Heading => (AutopilotState::Auto, Some(AutopilotTarget::HeadingTrue(pilot_target))),
        // the race service measures the wind angle with the opposite sign
        PilotMode::Wind => (AutopilotState::Wind, Some(AutopilotTarget::WindAngleTrueGround(-pilot_target))),
        PilotMode::Orthodromic => (AutopilotState::Track, None),
        PilotMode::Vmg => (AutopilotState::Vmg, None),
        PilotMode::Vbvmg => (AutopilotState::Vbvmg, None),
        PilotMode::None | PilotMode::Unknown(_) => (AutopilotState::None, None),
    };

    AutopilotCommand {
        state,
        target,
        waypoint: if mode.follows_waypoint() { waypoint } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: f64 = 1.25;

    fn wp() -> Option<Position> {
        Some(Position::new(46.5, -1.75))
    }

    #[test]
    fn test_from_code() {
        assert_eq!(PilotMode::from_code(None), PilotMode::None);
        assert_eq!(PilotMode::from_code(Some(0)), PilotMode::None);
        assert_eq!(PilotMode::from_code(Some(1)), PilotMode::Heading);
        assert_eq!(PilotMode::from_code(Some(2)), PilotMode::Wind);
        assert_eq!(PilotMode::from_code(Some(3)), PilotMode::Orthodromic);
        assert_eq!(PilotMode::from_code(Some(4)), PilotMode::Vmg);
        assert_eq!(PilotMode::from_code(Some(5)), PilotMode::Vbvmg);
        assert_eq!(PilotMode::from_code(Some(9)), PilotMode::Unknown(9));
    }

    #[test]
    fn test_unknown_is_distinct_from_none() {
        assert_ne!(PilotMode::from_code(Some(7)), PilotMode::None);
        assert!(!PilotMode::Unknown(7).follows_waypoint());
    }

    #[test]
    fn test_mapping_table() {
        let cases = [
            (1, "auto", Some(AutopilotTarget::HeadingTrue(TARGET)), false),
            (2, "wind", Some(AutopilotTarget::WindAngleTrueGround(-TARGET)), false),
            (3, "track", None, true),
            (4, "vmg", None, true),
            (5, "vbvmg", None, true),
        ];

        for (code, state, target, has_waypoint) in cases {
            let cmd = map_pilot(PilotMode::from_code(Some(code)), TARGET, wp());
            assert_eq!(cmd.state.as_str(), state, "PIM {}", code);
            assert_eq!(cmd.target, target, "PIM {}", code);
            assert_eq!(cmd.waypoint.is_some(), has_waypoint, "PIM {}", code);
            assert_eq!(has_waypoint, code > 2);
        }
    }

    #[test]
    fn test_no_mode_has_no_target_or_waypoint() {
        for mode in [PilotMode::None, PilotMode::Unknown(42)] {
            let cmd = map_pilot(mode, TARGET, wp());
            assert_eq!(cmd.state, AutopilotState::None);
            assert!(cmd.target.is_none());
            assert!(cmd.waypoint.is_none());
        }
    }

    #[test]
    fn test_waypoint_mode_without_known_waypoint() {
        let cmd = map_pilot(PilotMode::Vmg, 0.0, None);
        assert_eq!(cmd.state, AutopilotState::Vmg);
        assert!(cmd.waypoint.is_none());
    }
}
