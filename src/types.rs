use crate::constants::{DEFAULT_SPEED, MAX_SPEED, MIN_SPEED};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumIter, EnumString};

/// Protocol device id of one gimbal.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u8);

impl From<u8> for Address {
    fn from(value: u8) -> Self {
        Address(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Axis speed, always within `MIN_SPEED..=MAX_SPEED`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Speed(u8);

impl Speed {
    pub const MIN: Speed = Speed(MIN_SPEED);
    pub const MAX: Speed = Speed(MAX_SPEED);

    pub fn new(value: u8) -> Self {
        Speed(value.clamp(MIN_SPEED, MAX_SPEED))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn increment(self) -> Self {
        Speed::new(self.0.saturating_add(1))
    }

    pub fn decrement(self) -> Self {
        Speed::new(self.0.saturating_sub(1))
    }
}

impl Default for Speed {
    fn default() -> Self {
        Speed(DEFAULT_SPEED)
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Display, Clone, Copy, Eq, PartialEq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum Axis {
    Pan,
    Tilt,
}

#[derive(Debug, Display, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[strum(serialize_all = "lowercase")]
pub enum PanDirection {
    Left,
    Right,
}

#[derive(Debug, Display, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[strum(serialize_all = "lowercase")]
pub enum TiltDirection {
    Up,
    Down,
}

/// Logical direction key, the unit the hold registry tracks.
#[derive(Debug, EnumIter, EnumString, Display, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[strum(ascii_case_insensitive)]
pub enum Direction {
    #[strum(to_string = "pan-left", serialize = "left")]
    PanLeft,
    #[strum(to_string = "pan-right", serialize = "right")]
    PanRight,
    #[strum(to_string = "tilt-up", serialize = "up")]
    TiltUp,
    #[strum(to_string = "tilt-down", serialize = "down")]
    TiltDown,
    #[strum(to_string = "stop")]
    Stop,
}

impl Direction {
    pub fn axis(self) -> Option<Axis> {
        match self {
            Direction::PanLeft | Direction::PanRight => Some(Axis::Pan),
            Direction::TiltUp | Direction::TiltDown => Some(Axis::Tilt),
            Direction::Stop => None,
        }
    }

    pub fn pan(self) -> Option<PanDirection> {
        match self {
            Direction::PanLeft => Some(PanDirection::Left),
            Direction::PanRight => Some(PanDirection::Right),
            _ => None,
        }
    }

    pub fn tilt(self) -> Option<TiltDirection> {
        match self {
            Direction::TiltUp => Some(TiltDirection::Up),
            Direction::TiltDown => Some(TiltDirection::Down),
            _ => None,
        }
    }
}

impl From<PanDirection> for Direction {
    fn from(pan: PanDirection) -> Self {
        match pan {
            PanDirection::Left => Direction::PanLeft,
            PanDirection::Right => Direction::PanRight,
        }
    }
}

impl From<TiltDirection> for Direction {
    fn from(tilt: TiltDirection) -> Self {
        match tilt {
            TiltDirection::Up => Direction::TiltUp,
            TiltDirection::Down => Direction::TiltDown,
        }
    }
}

/// How simultaneous pan and tilt holds reach the device.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagonalMode {
    /// Each held direction emits its own single-axis command.
    #[default]
    Alternate,
    /// Both active axes travel in one combined frame.
    Combined,
}
