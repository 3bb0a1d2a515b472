// Feedback control shared by single motors and drive base loops
//
// A `Control` follows a `Trajectory` with PID plus feedforward and decides
// when a maneuver is complete. It works in whatever position unit its
// settings are expressed in: motor degrees for a servo, millimeters and
// degrees of heading for the drive base loops.

pub mod pid;
pub mod trajectory;

use tracing::{debug, warn};

use crate::logger::Log;
use crate::parameters::Stop;

pub use pid::{Pid, PidOutput};
pub use trajectory::{Reference, Trajectory};

/// Columns of a control log, after the implied time column
pub const CONTROL_LOG_COLUMNS: &[&str] = &[
    "maneuver_time",
    "position",
    "speed",
    "actuation",
    "voltage",
    "position_ref",
    "speed_ref",
    "position_error",
    "p",
    "i",
    "d",
    "stalled",
];

/// Control limits, tolerances and gains. Voltages are in mV.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSettings {
    pub speed_max: f32,
    pub acceleration: f32,
    pub position_tolerance: f32,
    pub speed_tolerance: f32,
    pub stall_speed_limit: f32,
    /// Seconds of saturated, slow motion before reporting a stall
    pub stall_time: f32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub integral_max: f32,
    pub actuation_max: f32,
    /// mV per unit of reference speed
    pub feedforward_speed: f32,
    /// mV per unit of reference acceleration
    pub feedforward_acceleration: f32,
    /// mV added in the direction of the reference speed
    pub feedforward_friction: f32,
}

impl ControlSettings {
    /// Re-express settings in a unit worth `scale` of the original unit.
    ///
    /// Used to turn motor-degree settings into drive base millimeters or
    /// heading degrees.
    pub fn scaled(&self, scale: f32) -> Self {
        Self {
            speed_max: self.speed_max / scale,
            acceleration: self.acceleration / scale,
            position_tolerance: self.position_tolerance / scale,
            speed_tolerance: self.speed_tolerance / scale,
            stall_speed_limit: self.stall_speed_limit / scale,
            stall_time: self.stall_time,
            kp: self.kp * scale,
            ki: self.ki * scale,
            kd: self.kd * scale,
            integral_max: self.integral_max,
            actuation_max: self.actuation_max,
            feedforward_speed: self.feedforward_speed * scale,
            feedforward_acceleration: self.feedforward_acceleration * scale,
            feedforward_friction: self.feedforward_friction,
        }
    }

    fn pid(&self) -> Pid {
        Pid::new(self.kp, self.ki, self.kd).with_integral_limit(self.integral_max)
    }
}

/// Output applied to a motor for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Actuation {
    Coast,
    Brake,
    /// Signed voltage in mV
    Voltage(f32),
}

impl Actuation {
    /// Numeric code used in logs
    pub fn code(&self) -> i32 {
        match self {
            Actuation::Coast => 0,
            Actuation::Brake => 1,
            Actuation::Voltage(_) => 2,
        }
    }

    pub fn voltage(&self) -> f32 {
        match self {
            Actuation::Voltage(v) => *v,
            _ => 0.0,
        }
    }

    pub fn from_stop(stop: Stop) -> Self {
        match stop {
            Stop::Brake => Actuation::Brake,
            _ => Actuation::Coast,
        }
    }
}

/// When a maneuver counts as complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Trajectory finished and position/speed within tolerance
    Position,
    /// Trajectory duration elapsed
    Time,
    /// Motor stalled
    Stalled,
    /// Runs until replaced or stopped
    Never,
}

/// Speed limit and acceleration of a move to a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    pub speed: f32,
    pub acceleration: f32,
}

#[derive(Debug)]
pub struct Control {
    settings: ControlSettings,
    trajectory: Trajectory,
    pid: Pid,
    completion: Completion,
    after: Stop,
    active: bool,
    done: bool,
    saturated: bool,
    stall_since: Option<f32>,
    stalled: bool,
    last_reference: Reference,
    last_error: f32,
    log: Log,
}

impl Control {
    pub fn new(settings: ControlSettings, period_ms: u32) -> Self {
        Self {
            settings,
            trajectory: Trajectory::default(),
            pid: settings.pid(),
            completion: Completion::Never,
            after: Stop::Coast,
            active: false,
            done: true,
            saturated: false,
            stall_since: None,
            stalled: false,
            last_reference: Reference::default(),
            last_error: 0.0,
            log: Log::new(CONTROL_LOG_COLUMNS, period_ms),
        }
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: ControlSettings) {
        self.settings = settings;
        self.pid = settings.pid();
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut Log {
        &mut self.log
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True when passive or when the current maneuver has completed
    pub fn is_done(&self) -> bool {
        !self.active || self.done
    }

    pub fn is_stalled(&self) -> bool {
        self.active && self.stalled
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Reference and position error from the latest update
    pub fn last_reference(&self) -> (Reference, f32) {
        (self.last_reference, self.last_error)
    }

    /// Position the control is steering towards, if active.
    ///
    /// Relative commands start from here so errors do not accumulate.
    pub fn target(&self) -> Option<f32> {
        if !self.active {
            return None;
        }
        if self.trajectory.is_forever() {
            return None;
        }
        Some(self.trajectory.end_position())
    }

    /// Make the control passive
    pub fn stop(&mut self) {
        self.active = false;
        self.done = true;
        self.saturated = false;
        self.stall_since = None;
        self.stalled = false;
        self.pid.reset();
    }

    fn start(&mut self, trajectory: Trajectory, completion: Completion, after: Stop) {
        if !self.active {
            self.pid.reset();
        }
        self.trajectory = trajectory;
        self.completion = completion;
        self.after = after;
        self.active = true;
        self.done = false;
        self.stall_since = None;
        self.stalled = false;
    }

    /// Move to an absolute target position
    pub fn start_target(
        &mut self,
        now: f32,
        position: f32,
        speed: f32,
        target: f32,
        profile: Profile,
        after: Stop,
    ) {
        let speed_limit = profile.speed.abs().min(self.settings.speed_max);
        let trajectory = Trajectory::to_target(
            now,
            position,
            speed,
            target,
            speed_limit,
            profile.acceleration,
        );
        debug!(
            "Target {:.1} from {:.1}, {:.2}s maneuver",
            target,
            position,
            trajectory.duration()
        );
        self.start(trajectory, Completion::Position, after);
    }

    /// Keep the position at `target`. Counts as done immediately.
    pub fn start_hold(&mut self, now: f32, target: f32) {
        self.start(Trajectory::hold(now, target), Completion::Never, Stop::Hold);
        self.done = true;
    }

    /// Run at a constant speed until replaced or stopped
    pub fn start_forever(&mut self, now: f32, position: f32, speed: f32, target_speed: f32) {
        let target_speed = target_speed.clamp(-self.settings.speed_max, self.settings.speed_max);
        let trajectory = Trajectory::forever(
            now,
            position,
            speed,
            target_speed,
            self.settings.acceleration,
        );
        self.start(trajectory, Completion::Never, Stop::Coast);
    }

    /// Run at a constant speed for `duration` seconds
    pub fn start_timed(
        &mut self,
        now: f32,
        position: f32,
        speed: f32,
        target_speed: f32,
        duration: f32,
        after: Stop,
    ) {
        let target_speed = target_speed.clamp(-self.settings.speed_max, self.settings.speed_max);
        let trajectory = Trajectory::timed(
            now,
            position,
            speed,
            target_speed,
            self.settings.acceleration,
            duration,
        );
        self.start(trajectory, Completion::Time, after);
    }

    /// Run at a constant speed until the motor stalls
    pub fn start_until_stalled(
        &mut self,
        now: f32,
        position: f32,
        speed: f32,
        target_speed: f32,
        after: Stop,
    ) {
        let target_speed = target_speed.clamp(-self.settings.speed_max, self.settings.speed_max);
        let trajectory = Trajectory::forever(
            now,
            position,
            speed,
            target_speed,
            self.settings.acceleration,
        );
        self.start(trajectory, Completion::Stalled, after);
    }

    fn feedforward(&self, reference: &Reference) -> f32 {
        let s = &self.settings;
        let friction = if reference.speed > 0.0 {
            s.feedforward_friction
        } else if reference.speed < 0.0 {
            -s.feedforward_friction
        } else {
            0.0
        };
        s.feedforward_speed * reference.speed
            + s.feedforward_acceleration * reference.acceleration
            + friction
    }

    fn completed(&self, now: f32, position: f32, speed: f32) -> bool {
        let elapsed = now - self.trajectory.start_time() >= self.trajectory.duration();
        match self.completion {
            Completion::Position => {
                let error = self.trajectory.end_position() - position;
                self.stalled
                    || (elapsed
                        && error.abs() <= self.settings.position_tolerance
                        && speed.abs() <= self.settings.speed_tolerance)
            }
            Completion::Time => elapsed,
            Completion::Stalled => self.stalled,
            Completion::Never => false,
        }
    }

    /// Run one control step and return the actuation to apply.
    ///
    /// `now` is in seconds, `now_us` is the same instant for the log.
    pub fn update(
        &mut self,
        now: f32,
        now_us: u64,
        dt: f32,
        position: f32,
        speed: f32,
    ) -> Actuation {
        if !self.active {
            return Actuation::Coast;
        }

        let reference = self.trajectory.reference(now);
        let error = reference.position - position;
        let speed_error = reference.speed - speed;
        let pid = self.pid.update(error, speed_error, dt, !self.saturated);

        let raw = pid.total() + self.feedforward(&reference);
        let max = self.settings.actuation_max;
        let voltage = raw.clamp(-max, max);
        self.saturated = raw.abs() > max;
        self.last_reference = reference;
        self.last_error = error;

        // Stall: pushing as hard as allowed while barely moving. Once the
        // maneuver is over, a stall stays reported until the next command.
        if self.saturated && speed.abs() < self.settings.stall_speed_limit {
            let since = *self.stall_since.get_or_insert(now);
            self.stalled |= now - since >= self.settings.stall_time;
        } else {
            self.stall_since = None;
            if !self.done {
                self.stalled = false;
            }
        }

        let mut actuation = Actuation::Voltage(voltage);
        if !self.done && self.completed(now, position, speed) {
            self.done = true;
            if self.stalled {
                warn!("Maneuver ended on stall at {:.1}", position);
            }
            match self.after {
                Stop::Hold => {
                    let hold_at = match self.completion {
                        Completion::Position if !self.stalled => self.trajectory.end_position(),
                        _ => position,
                    };
                    self.trajectory = Trajectory::hold(now, hold_at);
                }
                stop => {
                    actuation = Actuation::from_stop(stop);
                    self.active = false;
                }
            }
        }

        let maneuver_ms = ((now - self.trajectory.start_time()).max(0.0) * 1000.0) as i32;
        self.log.update(
            now_us,
            &[
                maneuver_ms,
                position.round() as i32,
                speed.round() as i32,
                actuation.code(),
                actuation.voltage().round() as i32,
                reference.position.round() as i32,
                reference.speed.round() as i32,
                error.round() as i32,
                pid.p.round() as i32,
                pid.i.round() as i32,
                pid.d.round() as i32,
                self.stalled as i32,
            ],
        );

        actuation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: Profile = Profile {
        speed: 500.0,
        acceleration: 2000.0,
    };

    fn settings() -> ControlSettings {
        ControlSettings {
            speed_max: 1000.0,
            acceleration: 2000.0,
            position_tolerance: 10.0,
            speed_tolerance: 50.0,
            stall_speed_limit: 20.0,
            stall_time: 0.2,
            kp: 100.0,
            ki: 50.0,
            kd: 3.0,
            integral_max: 3000.0,
            actuation_max: 9000.0,
            feedforward_speed: 8.0,
            feedforward_acceleration: 0.3,
            feedforward_friction: 300.0,
        }
    }

    #[test]
    fn test_scaled_settings() {
        let s = settings().scaled(2.0);
        assert_eq!(s.speed_max, 500.0);
        assert_eq!(s.position_tolerance, 5.0);
        assert_eq!(s.kp, 200.0);
        assert_eq!(s.feedforward_speed, 16.0);
        assert_eq!(s.actuation_max, 9000.0);
    }

    #[test]
    fn test_passive_control_coasts() {
        let mut control = Control::new(settings(), 5);
        assert!(control.is_done());
        assert_eq!(control.update(0.0, 0, 0.005, 0.0, 0.0), Actuation::Coast);
    }

    #[test]
    fn test_output_is_clamped() {
        let mut control = Control::new(settings(), 5);
        control.start_hold(0.0, 1000.0);
        let actuation = control.update(0.0, 0, 0.005, 0.0, 0.0);
        assert_eq!(actuation, Actuation::Voltage(9000.0));
    }

    #[test]
    fn test_hold_is_done_immediately() {
        let mut control = Control::new(settings(), 5);
        control.start_hold(0.0, 10.0);
        assert!(control.is_active());
        assert!(control.is_done());
        assert_eq!(control.target(), Some(10.0));
    }

    #[test]
    fn test_position_completion_then_hold() {
        let mut control = Control::new(settings(), 5);
        control.start_target(0.0, 0.0, 0.0, 100.0, PROFILE, Stop::Hold);
        assert!(!control.is_done());

        // Still mid-maneuver
        control.update(0.1, 100_000, 0.005, 5.0, 100.0);
        assert!(!control.is_done());

        // Trajectory over and on target
        let end = control.trajectory().duration() + 0.01;
        let actuation = control.update(end, 1_000_000, 0.005, 98.0, 0.0);
        assert!(control.is_done());
        assert!(control.is_active());
        assert!(matches!(actuation, Actuation::Voltage(_)));
        let target = control.target().unwrap();
        assert!((target - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_position_completion_then_coast() {
        let mut control = Control::new(settings(), 5);
        control.start_target(0.0, 0.0, 0.0, 100.0, PROFILE, Stop::Coast);
        let end = control.trajectory().duration() + 0.01;
        let actuation = control.update(end, 1_000_000, 0.005, 100.0, 0.0);
        assert_eq!(actuation, Actuation::Coast);
        assert!(!control.is_active());
        assert!(control.is_done());
    }

    #[test]
    fn test_not_done_while_off_target() {
        let mut control = Control::new(settings(), 5);
        control.start_target(0.0, 0.0, 0.0, 100.0, PROFILE, Stop::Hold);
        let end = control.trajectory().duration() + 0.01;
        control.update(end, 1_000_000, 0.005, 50.0, 0.0);
        assert!(!control.is_done());
    }

    #[test]
    fn test_stall_detected_after_stall_time() {
        let mut control = Control::new(settings(), 5);
        control.start_until_stalled(0.0, 0.0, 0.0, 500.0, Stop::Coast);

        // Blocked at zero while the reference runs away
        let mut t = 0.0;
        let mut last = Actuation::Voltage(0.0);
        while t < 2.0 && !control.is_done() {
            last = control.update(t, (t * 1e6) as u64, 0.005, 0.0, 0.0);
            t += 0.005;
        }
        assert!(control.is_done());
        assert_eq!(last, Actuation::Coast);
        assert!(t < 2.0);
    }

    #[test]
    fn test_stall_stays_reported_while_holding() {
        let mut control = Control::new(settings(), 5);
        control.start_target(0.0, 0.0, 0.0, 1000.0, PROFILE, Stop::Hold);

        let mut t = 0.0;
        while t < 2.0 && !control.is_done() {
            control.update(t, (t * 1e6) as u64, 0.005, 0.0, 0.0);
            t += 0.005;
        }
        assert!(control.is_done());
        assert!(control.is_stalled());
        // Holds where it got stuck, not at the unreachable target
        assert_eq!(control.trajectory().end_position(), 0.0);

        // Holding there no longer saturates, but the stall is kept
        control.update(t, (t * 1e6) as u64, 0.005, 0.0, 0.0);
        assert!(control.is_stalled());

        // A new command clears it
        control.start_hold(t, 0.0);
        assert!(!control.is_stalled());
    }

    #[test]
    fn test_timed_completion_brakes() {
        let mut control = Control::new(settings(), 5);
        control.start_timed(0.0, 0.0, 0.0, 300.0, 0.5, Stop::Brake);
        control.update(0.25, 250_000, 0.005, 40.0, 300.0);
        assert!(!control.is_done());
        let actuation = control.update(0.5, 500_000, 0.005, 120.0, 0.0);
        assert_eq!(actuation, Actuation::Brake);
        assert!(control.is_done());
    }

    #[test]
    fn test_log_rows_have_all_columns() {
        let mut control = Control::new(settings(), 5);
        control.log_mut().start(1000, 1).unwrap();
        control.start_hold(0.0, 0.0);
        control.update(0.0, 0, 0.005, 0.0, 0.0);
        assert_eq!(control.log().len(), 1);
        assert_eq!(control.log().rows()[0].len(), CONTROL_LOG_COLUMNS.len() + 1);
    }
}
