// Loop timing, default robot geometry, log settings and robot config file
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::motor::MotorType;
use crate::robotics::DriveSettings;

// Control loop period
pub const LOOP_PERIOD: Duration = Duration::from_millis(5);

// Number of motor ports on the default hub
pub const HUB_PORTS: usize = 6;

// Default "driving base" geometry (mm)
pub const WHEEL_DIAMETER: f32 = 56.0;
pub const AXLE_TRACK: f32 = 112.0;

// Log allocation used by the four-move script
pub const LOG_DURATION_MS: u32 = 20000;
pub const LOG_DIVISOR: u32 = 4;

// Log file names
pub const LOG_SERVO_LEFT: &str = "servo_left.txt";
pub const LOG_SERVO_RIGHT: &str = "servo_right.txt";
pub const LOG_CONTROL_DISTANCE: &str = "control_distance.txt";
pub const LOG_CONTROL_HEADING: &str = "control_heading.txt";

/// Robot description, loaded from JSON. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub wheel_diameter: f32,
    pub axle_track: f32,
    pub motor_type: MotorType,
    pub loop_period_ms: u64,
    pub hub_ports: usize,
    /// Overrides for the drive base speed/acceleration defaults
    pub drive: DriveConfig,
}

/// Drive base settings from the config file. Unset fields keep the defaults
/// the drive base derives from its motors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub straight_speed: Option<f32>,
    pub straight_acceleration: Option<f32>,
    pub turn_rate: Option<f32>,
    pub turn_acceleration: Option<f32>,
}

impl DriveConfig {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fill in `defaults` with the fields set here
    pub fn merge(&self, defaults: DriveSettings) -> DriveSettings {
        DriveSettings {
            straight_speed: self.straight_speed.unwrap_or(defaults.straight_speed),
            straight_acceleration: self
                .straight_acceleration
                .unwrap_or(defaults.straight_acceleration),
            turn_rate: self.turn_rate.unwrap_or(defaults.turn_rate),
            turn_acceleration: self.turn_acceleration.unwrap_or(defaults.turn_acceleration),
        }
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            wheel_diameter: WHEEL_DIAMETER,
            axle_track: AXLE_TRACK,
            motor_type: MotorType::default(),
            loop_period_ms: LOOP_PERIOD.as_millis() as u64,
            hub_ports: HUB_PORTS,
            drive: DriveConfig::default(),
        }
    }
}

impl RobotConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading robot config from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms.max(1))
    }
}
