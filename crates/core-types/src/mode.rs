use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Operating mode of the dual-surface shell.
///
/// Exactly one mode is active at a time. `Agent` is the initial state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeState {
    #[default]
    Agent,
    Manual,
    Recording,
}

impl ModeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeState::Agent => "agent",
            ModeState::Manual => "manual",
            ModeState::Recording => "recording",
        }
    }

    /// Whether an interactive surface exists while in this mode.
    pub fn is_interactive(&self) -> bool {
        !matches!(self, ModeState::Agent)
    }
}

impl fmt::Display for ModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeState {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(ModeState::Agent),
            "manual" => Ok(ModeState::Manual),
            "recording" | "record" => Ok(ModeState::Recording),
            other => Err(CoreError::UnknownMode(other.to_string())),
        }
    }
}

/// Rectangle in host-window content coordinates.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right half of a `width` x `height` content area.
    pub fn right_half(width: u32, height: u32) -> Self {
        let half = width / 2;
        Self {
            x: half as i32,
            y: 0,
            width: half,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_is_initial_mode() {
        assert_eq!(ModeState::default(), ModeState::Agent);
        assert!(!ModeState::Agent.is_interactive());
        assert!(ModeState::Recording.is_interactive());
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("Manual".parse::<ModeState>().unwrap(), ModeState::Manual);
        assert_eq!("record".parse::<ModeState>().unwrap(), ModeState::Recording);
        assert!("autopilot".parse::<ModeState>().is_err());
    }

    #[test]
    fn right_half_floors_odd_widths() {
        let bounds = Bounds::right_half(1281, 800);
        assert_eq!(bounds, Bounds::new(640, 0, 640, 800));
        assert!(Bounds::right_half(0, 800).is_empty());
    }
}
