// Motor types: simulated plant constants and default control settings
//
// Gains are derived from the plant so every motor type gets a closed loop
// with the same natural frequency and damping.

use serde::{Deserialize, Serialize};

use crate::control::ControlSettings;

/// Supply voltage limit for all motors (mV)
pub const MAX_VOLTAGE: f32 = 9000.0;

// Closed-loop design targets for the position loop
const LOOP_NATURAL_FREQUENCY: f32 = 20.0; // rad/s
const LOOP_DAMPING: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorType {
    /// Medium angular motor, the usual driving base motor
    #[default]
    SpikeM,
    SpikeL,
    TechnicL,
    TechnicXl,
    /// Interactive motor with a built-in encoder
    Interactive,
}

/// First-order DC motor model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Model {
    /// Steady-state speed per applied voltage (deg/s per mV)
    pub gain: f32,
    /// Mechanical time constant (s)
    pub tau: f32,
    /// Voltage lost to static friction (mV)
    pub friction: f32,
    /// Deceleration while coasting (deg/s^2)
    pub coast_deceleration: f32,
}

impl MotorType {
    pub fn model(self) -> Model {
        let (no_load_speed, tau, friction) = match self {
            MotorType::SpikeM => (1240.0, 0.040, 450.0),
            MotorType::SpikeL => (1100.0, 0.060, 500.0),
            MotorType::TechnicL => (1700.0, 0.050, 550.0),
            MotorType::TechnicXl => (1750.0, 0.060, 400.0),
            MotorType::Interactive => (1150.0, 0.040, 500.0),
        };
        Model {
            gain: no_load_speed / MAX_VOLTAGE,
            tau,
            friction,
            coast_deceleration: 2500.0,
        }
    }

    /// Rated speed and acceleration limits (deg/s, deg/s^2)
    fn limits(self) -> (f32, f32) {
        match self {
            MotorType::SpikeM => (1080.0, 2000.0),
            MotorType::SpikeL => (970.0, 1500.0),
            MotorType::TechnicL => (1470.0, 2000.0),
            MotorType::TechnicXl => (1525.0, 2500.0),
            MotorType::Interactive => (1000.0, 2000.0),
        }
    }

    /// Default control settings in motor degrees
    pub fn control_settings(self) -> ControlSettings {
        let model = self.model();
        let (speed_max, acceleration) = self.limits();

        // tau * x'' + x' = gain * u, closed with u = kp * e + kd * e'
        let w = LOOP_NATURAL_FREQUENCY;
        let kp = w * w * model.tau / model.gain;
        let kd = (2.0 * LOOP_DAMPING * w * model.tau - 1.0).max(0.0) / model.gain;

        ControlSettings {
            speed_max,
            acceleration,
            position_tolerance: 10.0,
            speed_tolerance: 50.0,
            stall_speed_limit: 20.0,
            stall_time: 0.2,
            kp,
            ki: kp,
            kd,
            integral_max: MAX_VOLTAGE / 3.0,
            actuation_max: MAX_VOLTAGE,
            feedforward_speed: 1.0 / model.gain,
            feedforward_acceleration: model.tau / model.gain,
            feedforward_friction: model.friction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_types_have_sane_settings() {
        for motor_type in [
            MotorType::SpikeM,
            MotorType::SpikeL,
            MotorType::TechnicL,
            MotorType::TechnicXl,
            MotorType::Interactive,
        ] {
            let model = motor_type.model();
            let s = motor_type.control_settings();
            assert!(model.gain > 0.0 && model.tau > 0.0);
            assert!(s.kp > 0.0 && s.kd >= 0.0);
            // Rated speed must be reachable within the voltage limit
            let needed = s.speed_max * s.feedforward_speed + s.feedforward_friction;
            assert!(needed < MAX_VOLTAGE, "{:?} needs {} mV", motor_type, needed);
        }
    }

    #[test]
    fn test_spike_m_gains() {
        let s = MotorType::SpikeM.control_settings();
        // 400 * 0.04 / (1240 / 9000)
        assert!((s.kp - 116.13).abs() < 0.1);
        assert_eq!(s.speed_max, 1080.0);
    }
}
