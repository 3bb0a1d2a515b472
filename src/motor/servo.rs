// Motor handle: a simulated motor on a hub port with its own position control
//
// Positive angles and speeds follow the motor's configured `Direction`.
// Blocking commands are async: they tick the hub clock and service the motor
// until the maneuver completes.

use tracing::{debug, info};

use crate::control::{Actuation, Control, Profile};
use crate::error::{Error, Result};
use crate::hub::Clock;
use crate::logger::Log;
use crate::parameters::{Direction, Port, Stop};

use super::model::SimMotor;
use super::settings::{MAX_VOLTAGE, MotorType};

/// Columns of a servo log, after the implied time column
pub const SERVO_LOG_COLUMNS: &[&str] = &[
    "angle",
    "speed",
    "actuation",
    "voltage",
    "angle_ref",
    "speed_ref",
    "error",
];

#[derive(Debug)]
pub struct Motor {
    port: Port,
    direction: Direction,
    motor_type: MotorType,
    clock: Clock,
    plant: SimMotor,
    /// User angle at plant angle zero, in the user frame
    offset: f32,
    control: Control,
    actuation: Actuation,
    log: Log,
}

impl Motor {
    pub(crate) fn new(
        port: Port,
        direction: Direction,
        motor_type: MotorType,
        clock: Clock,
    ) -> Self {
        let period_ms = clock.period_ms();
        info!("Motor on port {} ({:?}, {:?})", port, direction, motor_type);
        Self {
            port,
            direction,
            motor_type,
            plant: SimMotor::new(motor_type.model()),
            offset: 0.0,
            control: Control::new(motor_type.control_settings(), period_ms),
            actuation: Actuation::Coast,
            log: Log::new(SERVO_LOG_COLUMNS, period_ms),
            clock,
        }
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn motor_type(&self) -> MotorType {
        self.motor_type
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Rotation angle in degrees
    pub fn angle(&self) -> f32 {
        self.direction.sign() * self.plant.angle() + self.offset
    }

    /// Rotation speed in deg/s
    pub fn speed(&self) -> f32 {
        self.direction.sign() * self.plant.speed()
    }

    /// Actuation applied during the last tick
    pub fn actuation(&self) -> Actuation {
        self.actuation
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut Log {
        &mut self.log
    }

    pub fn control(&self) -> &Control {
        &self.control
    }

    /// Block the simulated shaft between two angles (deg, in this motor's frame)
    pub fn set_mechanical_limits(&mut self, limits: Option<(f32, f32)>) {
        let sign = self.direction.sign();
        let offset = self.offset;
        self.plant
            .set_limits(limits.map(|(a, b)| ((a - offset) * sign, (b - offset) * sign)));
    }

    pub fn done(&self) -> bool {
        self.control.is_done()
    }

    pub fn stalled(&self) -> bool {
        self.control.is_stalled()
    }

    /// Set the accumulated rotation angle to `angle`.
    ///
    /// A holding motor keeps holding the same physical position.
    pub fn reset_angle(&mut self, angle: f32) {
        let old_angle = self.angle();
        match self.control.target() {
            Some(target) if self.control.is_done() => {
                self.offset += angle - old_angle;
                self.control
                    .start_hold(self.clock.now(), angle + target - old_angle);
            }
            _ => {
                self.stop();
                self.offset += angle - old_angle;
            }
        }
        debug!("Port {} angle reset to {}", self.port, angle);
    }

    // === Commands ===

    /// Run at `speed` deg/s until told otherwise
    pub fn run(&mut self, speed: f32) -> Result<()> {
        check_finite(speed, "speed")?;
        debug!("Port {} run at {} deg/s", self.port, speed);
        self.control
            .start_forever(self.clock.now(), self.angle(), self.speed(), speed);
        Ok(())
    }

    /// Run at `speed` deg/s for `time` ms, then apply `then`
    pub async fn run_time(&mut self, speed: f32, time: u32, then: Stop) -> Result<()> {
        check_finite(speed, "speed")?;
        debug!("Port {} run at {} deg/s for {}ms", self.port, speed, time);
        self.control.start_timed(
            self.clock.now(),
            self.angle(),
            self.speed(),
            speed,
            time as f32 / 1000.0,
            then,
        );
        self.run_until_done().await;
        Ok(())
    }

    /// Rotate by `angle` degrees at `speed` deg/s, then apply `then`.
    ///
    /// A negative speed reverses the direction of the rotation.
    pub async fn run_angle(&mut self, speed: f32, angle: f32, then: Stop) -> Result<()> {
        check_speed(speed)?;
        check_finite(angle, "angle")?;
        let start = self.control.target().unwrap_or_else(|| self.angle());
        let target = start + angle * speed.signum();
        self.start_target(speed, target, then);
        self.run_until_done().await;
        Ok(())
    }

    /// Rotate to `target` degrees at `speed` deg/s, then apply `then`
    pub async fn run_target(&mut self, speed: f32, target: f32, then: Stop) -> Result<()> {
        check_speed(speed)?;
        check_finite(target, "target")?;
        self.start_target(speed, target, then);
        self.run_until_done().await;
        Ok(())
    }

    /// Run at `speed` deg/s until the motor stalls and return the angle there
    pub async fn run_until_stalled(&mut self, speed: f32, then: Stop) -> Result<f32> {
        check_speed(speed)?;
        self.control.start_until_stalled(
            self.clock.now(),
            self.angle(),
            self.speed(),
            speed,
            then,
        );
        self.run_until_done().await;
        let angle = self.angle();
        info!("Port {} stalled at {:.1} deg", self.port, angle);
        Ok(angle)
    }

    /// Hold `target` degrees from the next tick on, without ramping
    pub fn track_target(&mut self, target: f32) -> Result<()> {
        check_finite(target, "target")?;
        self.control.start_hold(self.clock.now(), target);
        Ok(())
    }

    /// Stop and let the motor spin freely
    pub fn stop(&mut self) {
        self.control.stop();
        self.actuate(Actuation::Coast);
    }

    /// Stop and resist motion passively
    pub fn brake(&mut self) {
        self.control.stop();
        self.actuate(Actuation::Brake);
    }

    /// Stop and actively hold the current angle
    pub fn hold(&mut self) {
        let angle = self.angle();
        self.control.start_hold(self.clock.now(), angle);
    }

    /// Apply a duty cycle in percent (-100 to 100) without feedback
    pub fn dc(&mut self, duty: f32) -> Result<()> {
        if !(-100.0..=100.0).contains(&duty) {
            return Err(Error::invalid(format!("duty {} outside -100..100", duty)));
        }
        self.control.stop();
        self.actuate(Actuation::Voltage(duty / 100.0 * MAX_VOLTAGE));
        Ok(())
    }

    /// Keep servicing the motor for `ms` milliseconds
    pub async fn wait(&mut self, ms: u32) {
        for _ in 0..self.clock.ticks_for_ms(ms) {
            self.clock.tick().await;
            self.service();
        }
    }

    async fn run_until_done(&mut self) {
        loop {
            self.clock.tick().await;
            self.service();
            if self.control.is_done() {
                break;
            }
        }
    }

    fn start_target(&mut self, speed: f32, target: f32, then: Stop) {
        let profile = Profile {
            speed,
            acceleration: self.control.settings().acceleration,
        };
        self.control.start_target(
            self.clock.now(),
            self.angle(),
            self.speed(),
            target,
            profile,
            then,
        );
    }

    /// One control tick: feedback, actuation, logging, plant update
    fn service(&mut self) {
        let now = self.clock.now();
        if self.control.is_active() {
            let actuation = self.control.update(
                now,
                self.clock.now_us(),
                self.clock.dt(),
                self.angle(),
                self.speed(),
            );
            self.actuate(actuation);
        }
        self.log_state();
        self.step_plant();
    }

    // === Hooks for the drive base, which runs its own control ===

    pub(crate) fn release_control(&mut self) {
        self.control.stop();
    }

    pub(crate) fn actuate(&mut self, actuation: Actuation) {
        self.actuation = actuation;
        let physical = match actuation {
            Actuation::Voltage(v) => Actuation::Voltage(self.direction.sign() * v),
            other => other,
        };
        self.plant.apply(physical);
    }

    pub(crate) fn log_state(&mut self) {
        let (angle_ref, speed_ref, error) = if self.control.is_active() {
            let (r, e) = self.control.last_reference();
            (r.position.round() as i32, r.speed.round() as i32, e.round() as i32)
        } else {
            (0, 0, 0)
        };
        self.log.update(
            self.clock.now_us(),
            &[
                self.angle().round() as i32,
                self.speed().round() as i32,
                self.actuation.code(),
                self.actuation.voltage().round() as i32,
                angle_ref,
                speed_ref,
                error,
            ],
        );
    }

    pub(crate) fn step_plant(&mut self) {
        self.plant.step(self.clock.dt());
    }
}

fn check_finite(value: f32, name: &str) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid(format!("{} must be finite", name)))
    }
}

fn check_speed(speed: f32) -> Result<()> {
    check_finite(speed, "speed")?;
    if speed == 0.0 {
        return Err(Error::invalid("speed must not be zero"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;
    use crate::hub::{Hub, Pacing};

    fn motor(direction: Direction) -> Motor {
        let mut hub = Hub::new(&RobotConfig::default(), Pacing::Simulated);
        hub.motor(Port::A, direction).unwrap()
    }

    #[tokio::test]
    async fn test_run_angle_reaches_target() {
        let mut motor = motor(Direction::Clockwise);
        motor.run_angle(500.0, 360.0, Stop::Hold).await.unwrap();
        assert!(motor.done());
        assert!((motor.angle() - 360.0).abs() <= 10.0, "angle {}", motor.angle());

        // Relative moves start from the held target
        motor.run_angle(500.0, -90.0, Stop::Hold).await.unwrap();
        assert!((motor.angle() - 270.0).abs() <= 10.0, "angle {}", motor.angle());
    }

    #[tokio::test]
    async fn test_counterclockwise_motor_turns_plant_backwards() {
        let mut motor = motor(Direction::Counterclockwise);
        motor.run_target(400.0, 180.0, Stop::Hold).await.unwrap();
        assert!((motor.angle() - 180.0).abs() <= 10.0);
        assert!(motor.plant.angle() < -170.0);
    }

    #[tokio::test]
    async fn test_negative_speed_reverses_run_angle() {
        let mut motor = motor(Direction::Clockwise);
        motor.run_angle(-300.0, 90.0, Stop::Brake).await.unwrap();
        assert!(motor.angle() < -70.0, "angle {}", motor.angle());
        assert_eq!(motor.actuation(), Actuation::Brake);
        assert!(!motor.control().is_active());
    }

    #[tokio::test]
    async fn test_run_time_takes_its_time() {
        let mut motor = motor(Direction::Clockwise);
        motor.run_time(600.0, 500, Stop::Coast).await.unwrap();
        let elapsed = motor.clock().now();
        assert!((elapsed - 0.5).abs() < 0.011, "elapsed {}", elapsed);
        assert!(motor.angle() > 100.0);
        assert_eq!(motor.actuation(), Actuation::Coast);
    }

    #[tokio::test]
    async fn test_run_until_stalled_stops_at_limit() {
        let mut motor = motor(Direction::Clockwise);
        motor.set_mechanical_limits(Some((-1000.0, 120.0)));
        let angle = motor.run_until_stalled(300.0, Stop::Coast).await.unwrap();
        assert!((angle - 120.0).abs() < 1.0, "angle {}", angle);
        assert!(motor.done());
    }

    #[tokio::test]
    async fn test_run_forever_and_stop() {
        let mut motor = motor(Direction::Clockwise);
        motor.run(500.0).unwrap();
        motor.wait(1000).await;
        assert!((motor.speed() - 500.0).abs() < 50.0, "speed {}", motor.speed());
        assert!(!motor.done());

        motor.stop();
        motor.wait(1000).await;
        assert_eq!(motor.speed(), 0.0);
        assert!(motor.done());
    }

    #[tokio::test]
    async fn test_reset_angle_while_holding() {
        let mut motor = motor(Direction::Clockwise);
        motor.run_angle(500.0, 90.0, Stop::Hold).await.unwrap();
        motor.reset_angle(0.0);
        assert_eq!(motor.angle(), 0.0);
        motor.wait(300).await;
        assert!(motor.angle().abs() <= 10.0, "angle {}", motor.angle());
    }

    #[tokio::test]
    async fn test_track_target_and_hold() {
        let mut motor = motor(Direction::Clockwise);
        motor.track_target(45.0).unwrap();
        motor.wait(500).await;
        assert!((motor.angle() - 45.0).abs() <= 10.0);

        motor.dc(50.0).unwrap();
        motor.wait(200).await;
        assert!(motor.speed() > 100.0);
        motor.hold();
        motor.wait(500).await;
        assert!(motor.speed().abs() < 50.0);
    }

    #[test]
    fn test_invalid_arguments() {
        let mut motor = motor(Direction::Clockwise);
        assert!(motor.dc(150.0).is_err());
        assert!(motor.run(f32::NAN).is_err());
        assert!(motor.track_target(f32::INFINITY).is_err());
    }

    #[tokio::test]
    async fn test_zero_speed_rejected() {
        let mut motor = motor(Direction::Clockwise);
        let err = motor.run_angle(0.0, 90.0, Stop::Hold).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_log_records_every_tick() {
        let mut motor = motor(Direction::Clockwise);
        motor.log_mut().start(1000, 1).unwrap();
        motor.run_angle(500.0, 90.0, Stop::Hold).await.unwrap();
        motor.wait(100).await;
        let rows = motor.log().rows();
        assert!(rows.len() > 20);
        assert_eq!(rows[0].len(), SERVO_LOG_COLUMNS.len() + 1);
        // Final rows show the motor holding with voltage actuation
        assert_eq!(rows[rows.len() - 1][3], 2);
    }
}
