// Port, direction and stop parameters for motor commands

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hub port a motor is plugged into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Port {
    pub const ALL: [Port; 6] = [Port::A, Port::B, Port::C, Port::D, Port::E, Port::F];

    /// Zero-based port index (A = 0)
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Which way a motor turns for positive speed and angle values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Clockwise,
    Counterclockwise,
}

impl Direction {
    /// +1.0 for clockwise, -1.0 for counterclockwise
    pub fn sign(self) -> f32 {
        match self {
            Direction::Clockwise => 1.0,
            Direction::Counterclockwise => -1.0,
        }
    }
}

/// What a motor does once a command completes or is stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stop {
    /// Let the motor spin freely
    #[default]
    Coast,
    /// Short the motor terminals so it resists motion passively
    Brake,
    /// Keep controlling the motor at the reached position
    Hold,
}
