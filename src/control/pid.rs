//! PID feedback on position error.
//!
//! The derivative term acts on the speed error (reference speed minus
//! measured speed) instead of differentiating the position error, so the
//! output does not spike when a new trajectory starts.

/// Individual contributions of one update, in output units
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidOutput {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

impl PidOutput {
    pub fn total(&self) -> f32 {
        self.p + self.i + self.d
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pid {
    /// Proportional gain (output per position unit)
    kp: f32,
    /// Integral gain (output per position unit second)
    ki: f32,
    /// Derivative gain (output per speed unit)
    kd: f32,

    /// Integrated position error
    integral: f32,
    /// Largest allowed integral contribution
    integral_max: f32,
}

impl Pid {
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            integral_max: f32::INFINITY,
        }
    }

    /// Limit the integral contribution for anti-windup.
    pub fn with_integral_limit(mut self, max: f32) -> Self {
        self.integral_max = max.abs();
        self
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// Update the controller.
    ///
    /// `error` is the position error, `speed_error` the speed error, `dt` the
    /// time step in seconds. The integrator only runs while `integrate` is
    /// set, so callers can freeze it while the output is saturated.
    pub fn update(&mut self, error: f32, speed_error: f32, dt: f32, integrate: bool) -> PidOutput {
        // ----- I term -----
        if integrate && self.ki != 0.0 {
            self.integral += error * dt;
            let limit = self.integral_max / self.ki.abs();
            self.integral = self.integral.clamp(-limit, limit);
        }

        PidOutput {
            p: self.kp * error,
            i: self.ki * self.integral,
            d: self.kd * speed_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proportional_and_derivative() {
        let mut pid = Pid::new(2.0, 0.0, 0.5);
        let out = pid.update(10.0, -4.0, 0.005, true);
        assert_eq!(out.p, 20.0);
        assert_eq!(out.i, 0.0);
        assert_eq!(out.d, -2.0);
        assert_eq!(out.total(), 18.0);
    }

    #[test]
    fn test_integral_accumulates_and_clamps() {
        let mut pid = Pid::new(0.0, 100.0, 0.0).with_integral_limit(50.0);
        let out = pid.update(10.0, 0.0, 0.01, true);
        assert!((out.i - 10.0).abs() < 1e-4);

        for _ in 0..100 {
            pid.update(10.0, 0.0, 0.01, true);
        }
        let out = pid.update(10.0, 0.0, 0.01, true);
        assert!((out.i - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_integral_frozen_when_not_integrating() {
        let mut pid = Pid::new(0.0, 100.0, 0.0);
        pid.update(10.0, 0.0, 0.01, false);
        assert_eq!(pid.integral(), 0.0);
        pid.update(10.0, 0.0, 0.01, true);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
    }
}
