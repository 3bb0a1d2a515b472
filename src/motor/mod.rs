// Motor control module
//
// Provides:
// - Simulated DC motor plant for each hub port
// - Per-type model constants and control settings
// - The user-facing `Motor` handle with position/speed commands and a log
// - Differential drive kinematics used by the drive base

pub mod kinematics;
pub mod model;
mod servo;
pub mod settings;

pub use kinematics::{Geometry, WheelPair};
pub use servo::{Motor, SERVO_LOG_COLUMNS};
pub use settings::{MAX_VOLTAGE, MotorType};
