// Speed profiles for position and timed maneuvers
//
// A profile has three phases relative to its start time:
//   [0, t1)   ramp linearly from the initial speed to the cruise speed
//   [t1, t2)  cruise
//   [t2, t3)  ramp linearly down to zero
// after t3 the reference stays at the end position. Speeds are expressed in
// the "forward" frame and multiplied by `sign` on output.

/// Reference signals at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reference {
    pub position: f32,
    pub speed: f32,
    pub acceleration: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trajectory {
    t0: f32,
    x0: f32,
    sign: f32,
    w0: f32,
    wc: f32,
    t1: f32,
    t2: f32,
    t3: f32,
}

impl Default for Trajectory {
    fn default() -> Self {
        Self::hold(0.0, 0.0)
    }
}

impl Trajectory {
    /// Stand still at `position`
    pub fn hold(t0: f32, position: f32) -> Self {
        Self {
            t0,
            x0: position,
            sign: 1.0,
            w0: 0.0,
            wc: 0.0,
            t1: 0.0,
            t2: 0.0,
            t3: 0.0,
        }
    }

    /// Move from `x0` to `target` with a trapezoidal speed profile.
    ///
    /// `speed` and `acceleration` are magnitudes. The initial speed `v0` is
    /// used as the start of the ramp when it points towards the target; it
    /// is reduced if the target could not be reached without overshoot.
    pub fn to_target(
        t0: f32,
        x0: f32,
        v0: f32,
        target: f32,
        speed: f32,
        acceleration: f32,
    ) -> Self {
        let distance = (target - x0).abs();
        let speed = speed.abs();
        let acceleration = acceleration.abs();
        if distance == 0.0 || speed == 0.0 || acceleration == 0.0 {
            return Self::hold(t0, target);
        }
        let sign = if target >= x0 { 1.0 } else { -1.0 };

        // Initial speed in the direction of travel, never faster than we can stop
        let stop_limit = (2.0 * acceleration * distance).sqrt();
        let w0 = (sign * v0).clamp(0.0, speed.min(stop_limit));

        // Peak speed if we ramp up and immediately back down
        let peak = (acceleration * distance + w0 * w0 / 2.0).sqrt();
        let wc = peak.min(speed).max(w0);

        let t1 = (wc - w0) / acceleration;
        let d_ramp_up = (w0 + wc) / 2.0 * t1;
        let t_down = wc / acceleration;
        let d_ramp_down = wc * t_down / 2.0;
        let d_cruise = (distance - d_ramp_up - d_ramp_down).max(0.0);
        let t_cruise = if wc > 0.0 { d_cruise / wc } else { 0.0 };

        Self {
            t0,
            x0,
            sign,
            w0,
            wc,
            t1,
            t2: t1 + t_cruise,
            t3: t1 + t_cruise + t_down,
        }
    }

    /// Ramp to a constant signed `speed` and keep going
    pub fn forever(t0: f32, x0: f32, v0: f32, speed: f32, acceleration: f32) -> Self {
        let (sign, w0, wc) = Self::speed_frame(v0, speed);
        let t1 = ramp_time(w0, wc, acceleration);
        Self {
            t0,
            x0,
            sign,
            w0,
            wc,
            t1,
            t2: f32::INFINITY,
            t3: f32::INFINITY,
        }
    }

    /// Ramp to a signed `speed`, then ramp down so the motion ends after `duration`
    pub fn timed(t0: f32, x0: f32, v0: f32, speed: f32, acceleration: f32, duration: f32) -> Self {
        let duration = duration.max(0.0);
        let acceleration = acceleration.abs();
        let (sign, w0, mut wc) = Self::speed_frame(v0, speed);

        let mut t1 = ramp_time(w0, wc, acceleration);
        let mut t_down = ramp_time(wc, 0.0, acceleration);
        if t1 + t_down > duration {
            // Not enough time to reach full speed
            if acceleration > 0.0 && w0 <= wc {
                wc = ((acceleration * duration + w0) / 2.0).clamp(w0.max(0.0), wc);
            }
            t1 = ramp_time(w0, wc, acceleration).min(duration);
            t_down = (duration - t1).max(0.0);
        }

        Self {
            t0,
            x0,
            sign,
            w0,
            wc,
            t1,
            t2: duration - t_down,
            t3: duration,
        }
    }

    fn speed_frame(v0: f32, speed: f32) -> (f32, f32, f32) {
        let sign = if speed >= 0.0 { 1.0 } else { -1.0 };
        (sign, sign * v0, speed.abs())
    }

    pub fn start_time(&self) -> f32 {
        self.t0
    }

    /// Time until the profile ends; infinite for `forever`
    pub fn duration(&self) -> f32 {
        self.t3
    }

    pub fn is_forever(&self) -> bool {
        self.t3.is_infinite()
    }

    /// Position where the profile comes to rest
    pub fn end_position(&self) -> f32 {
        self.reference(self.t0 + self.t3).position
    }

    pub fn reference(&self, time: f32) -> Reference {
        let tau = (time - self.t0).max(0.0);
        let a1 = if self.t1 > 0.0 {
            (self.wc - self.w0) / self.t1
        } else {
            0.0
        };
        let a3 = if self.t3 > self.t2 && self.t3.is_finite() {
            self.wc / (self.t3 - self.t2)
        } else {
            0.0
        };

        let p1 = self.w0 * self.t1 + a1 * self.t1 * self.t1 / 2.0;
        let (p, w, a) = if tau < self.t1 {
            (self.w0 * tau + a1 * tau * tau / 2.0, self.w0 + a1 * tau, a1)
        } else if tau < self.t2 {
            (p1 + self.wc * (tau - self.t1), self.wc, 0.0)
        } else {
            let p2 = p1 + self.wc * (self.t2 - self.t1);
            let s = (tau.min(self.t3) - self.t2).max(0.0);
            let position = p2 + self.wc * s - a3 * s * s / 2.0;
            if tau < self.t3 {
                (position, self.wc - a3 * s, -a3)
            } else {
                (position, 0.0, 0.0)
            }
        };

        Reference {
            position: self.x0 + self.sign * p,
            speed: self.sign * w,
            acceleration: self.sign * a,
        }
    }
}

fn ramp_time(from: f32, to: f32, acceleration: f32) -> f32 {
    if acceleration <= 0.0 {
        0.0
    } else {
        (to - from).abs() / acceleration
    }
}
