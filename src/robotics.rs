//! Two-motor differential drive base.
//!
//! The base runs two feedback loops on top of its wheels: the distance loop
//! controls the average wheel rotation (in mm traveled) and the heading loop
//! controls half the wheel difference (in degrees of heading, clockwise
//! positive). Each tick the distance loop's voltage is added to both wheels
//! and the heading loop's voltage is added to the left wheel and subtracted
//! from the right.
//!
//! Motion commands block (asynchronously) until the commanded loop is on
//! target, after which both loops hold their targets until the next command
//! or [`DriveBase::stop`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::control::{Actuation, Control, Profile};
use crate::error::{Error, Result};
use crate::hub::Clock;
use crate::messages::DriveBaseState;
use crate::motor::{Geometry, Motor, WheelPair};
use crate::parameters::Stop;

/// Fraction of the rated speed used by default for straight and turn
const DEFAULT_SPEED_FRACTION: f32 = 0.4;

/// Speed and acceleration used by `straight` and `turn`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveSettings {
    /// mm/s
    pub straight_speed: f32,
    /// mm/s^2
    pub straight_acceleration: f32,
    /// deg/s
    pub turn_rate: f32,
    /// deg/s^2
    pub turn_acceleration: f32,
}

impl DriveSettings {
    fn validate(&self) -> Result<()> {
        let values = [
            self.straight_speed,
            self.straight_acceleration,
            self.turn_rate,
            self.turn_acceleration,
        ];
        if values.iter().all(|v| v.is_finite() && *v > 0.0) {
            Ok(())
        } else {
            Err(Error::invalid(format!("drive settings must be positive: {:?}", self)))
        }
    }
}

#[derive(Debug)]
pub struct DriveBase {
    left: Motor,
    right: Motor,
    geometry: Geometry,
    clock: Clock,
    distance_control: Control,
    heading_control: Control,
    settings: DriveSettings,
    stop_mode: Stop,
    distance_offset: f32,
    heading_offset: f32,
}

impl DriveBase {
    /// Build a drive base from two motors and its geometry (mm).
    ///
    /// The motors are taken over: their own control is stopped and they are
    /// driven by the base until released with [`DriveBase::into_motors`].
    pub fn new(
        mut left: Motor,
        mut right: Motor,
        wheel_diameter: f32,
        axle_track: f32,
    ) -> Result<Self> {
        for (name, value) in [("wheel_diameter", wheel_diameter), ("axle_track", axle_track)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::invalid(format!("{} must be positive, got {}", name, value)));
            }
        }
        if left.port() == right.port() {
            return Err(Error::PortInUse(right.port()));
        }
        if !left.clock().same_as(right.clock()) {
            return Err(Error::invalid(format!(
                "motors on ports {} and {} belong to different hubs",
                left.port(),
                right.port()
            )));
        }
        if left.motor_type() != right.motor_type() {
            warn!(
                "Drive base motors differ ({:?} and {:?}), using left motor settings",
                left.motor_type(),
                right.motor_type()
            );
        }

        left.stop();
        right.stop();
        left.release_control();
        right.release_control();

        let geometry = Geometry::new(wheel_diameter, axle_track);
        let clock = left.clock().clone();
        let period_ms = clock.period_ms();
        let wheel_settings = *left.control().settings();

        let distance_settings = wheel_settings.scaled(geometry.wheel_deg_per_mm());
        let heading_settings = wheel_settings.scaled(geometry.wheel_deg_per_heading_deg());
        let settings = DriveSettings {
            straight_speed: distance_settings.speed_max * DEFAULT_SPEED_FRACTION,
            straight_acceleration: distance_settings.acceleration,
            turn_rate: heading_settings.speed_max * DEFAULT_SPEED_FRACTION,
            turn_acceleration: heading_settings.acceleration,
        };

        info!(
            "Drive base on ports {} and {}: wheel {}mm, axle {}mm, {:.0}mm/s, {:.0}deg/s",
            left.port(),
            right.port(),
            wheel_diameter,
            axle_track,
            settings.straight_speed,
            settings.turn_rate
        );

        Ok(Self {
            left,
            right,
            geometry,
            clock,
            distance_control: Control::new(distance_settings, period_ms),
            heading_control: Control::new(heading_settings, period_ms),
            settings,
            stop_mode: Stop::Coast,
            distance_offset: 0.0,
            heading_offset: 0.0,
        })
    }

    /// Give the motors back, coasting
    pub fn into_motors(mut self) -> (Motor, Motor) {
        self.left.stop();
        self.right.stop();
        (self.left, self.right)
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn left_motor(&self) -> &Motor {
        &self.left
    }

    pub fn right_motor(&self) -> &Motor {
        &self.right
    }

    pub fn left_motor_mut(&mut self) -> &mut Motor {
        &mut self.left
    }

    pub fn right_motor_mut(&mut self) -> &mut Motor {
        &mut self.right
    }

    pub fn distance_control(&self) -> &Control {
        &self.distance_control
    }

    pub fn distance_control_mut(&mut self) -> &mut Control {
        &mut self.distance_control
    }

    pub fn heading_control(&self) -> &Control {
        &self.heading_control
    }

    pub fn heading_control_mut(&mut self) -> &mut Control {
        &mut self.heading_control
    }

    pub fn settings(&self) -> DriveSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: DriveSettings) -> Result<()> {
        settings.validate()?;
        debug!("Drive settings: {:?}", settings);
        self.settings = settings;
        Ok(())
    }

    pub fn stop_mode(&self) -> Stop {
        self.stop_mode
    }

    /// Choose what `stop` does
    pub fn set_stop_mode(&mut self, stop: Stop) {
        self.stop_mode = stop;
    }

    /// True when no maneuver is in progress
    pub fn done(&self) -> bool {
        self.distance_control.is_done() && self.heading_control.is_done()
    }

    pub fn stalled(&self) -> bool {
        self.distance_control.is_stalled() || self.heading_control.is_stalled()
    }

    /// Raw distance, drive speed, heading and turn rate in the control frame
    fn body_state(&self) -> (f32, f32, f32, f32) {
        let angles = WheelPair::new(self.left.angle(), self.right.angle());
        let speeds = WheelPair::new(self.left.speed(), self.right.speed());
        let (distance, heading) = self.geometry.wheels_to_body(angles);
        let (drive_speed, turn_rate) = self.geometry.wheels_to_body(speeds);
        (distance, drive_speed, heading, turn_rate)
    }

    /// Distance traveled since the last reset (mm)
    pub fn distance(&self) -> f32 {
        self.body_state().0 - self.distance_offset
    }

    /// Heading since the last reset (deg, clockwise positive)
    pub fn angle(&self) -> f32 {
        self.body_state().2 - self.heading_offset
    }

    pub fn state(&self) -> DriveBaseState {
        let (distance, drive_speed, heading, turn_rate) = self.body_state();
        DriveBaseState {
            distance: distance - self.distance_offset,
            drive_speed,
            angle: heading - self.heading_offset,
            turn_rate,
        }
    }

    /// Stop and zero the distance and heading
    pub fn reset(&mut self) {
        self.halt(Stop::Coast);
        let (distance, _, heading, _) = self.body_state();
        self.distance_offset = distance;
        self.heading_offset = heading;
    }

    // === Commands ===

    /// Drive straight for `distance` mm (negative drives backward)
    pub async fn straight(&mut self, distance: f32) -> Result<()> {
        if !distance.is_finite() {
            return Err(Error::invalid("distance must be finite"));
        }
        info!("Straight {} mm", distance);

        let now = self.clock.now();
        let (d, drive_speed, h, _) = self.body_state();
        let start = self.distance_control.target().unwrap_or(d);
        let heading = self.heading_control.target().unwrap_or(h);

        self.distance_control.start_target(
            now,
            d,
            drive_speed,
            start + distance,
            Profile {
                speed: self.settings.straight_speed,
                acceleration: self.settings.straight_acceleration,
            },
            Stop::Hold,
        );
        self.heading_control.start_hold(now, heading);
        self.run_until_done().await;
        Ok(())
    }

    /// Turn in place by `angle` degrees (positive is clockwise)
    pub async fn turn(&mut self, angle: f32) -> Result<()> {
        if !angle.is_finite() {
            return Err(Error::invalid("angle must be finite"));
        }
        info!("Turn {} deg", angle);

        let now = self.clock.now();
        let (d, _, h, turn_rate) = self.body_state();
        let start = self.heading_control.target().unwrap_or(h);
        let distance = self.distance_control.target().unwrap_or(d);

        self.heading_control.start_target(
            now,
            h,
            turn_rate,
            start + angle,
            Profile {
                speed: self.settings.turn_rate,
                acceleration: self.settings.turn_acceleration,
            },
            Stop::Hold,
        );
        self.distance_control.start_hold(now, distance);
        self.run_until_done().await;
        Ok(())
    }

    /// Keep driving at `speed` mm/s while turning at `turn_rate` deg/s
    pub fn drive(&mut self, speed: f32, turn_rate: f32) -> Result<()> {
        if !speed.is_finite() || !turn_rate.is_finite() {
            return Err(Error::invalid("speed and turn rate must be finite"));
        }
        debug!("Drive at {} mm/s, {} deg/s", speed, turn_rate);
        let now = self.clock.now();
        let (d, drive_speed, h, rate) = self.body_state();
        self.distance_control.start_forever(now, d, drive_speed, speed);
        self.heading_control.start_forever(now, h, rate, turn_rate);
        Ok(())
    }

    /// Stop moving, then coast, brake or hold as set by `set_stop_mode`
    pub fn stop(&mut self) {
        info!("Stop ({:?})", self.stop_mode);
        self.halt(self.stop_mode);
    }

    fn halt(&mut self, stop: Stop) {
        match stop {
            Stop::Hold => {
                let now = self.clock.now();
                let (d, _, h, _) = self.body_state();
                self.distance_control.start_hold(now, d);
                self.heading_control.start_hold(now, h);
            }
            stop => {
                self.distance_control.stop();
                self.heading_control.stop();
                let actuation = Actuation::from_stop(stop);
                self.left.actuate(actuation);
                self.right.actuate(actuation);
            }
        }
    }

    /// Keep servicing the base for `ms` milliseconds
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
            if self.done() {
                break;
            }
        }
        if self.stalled() {
            warn!("Drive base stalled");
        }
        debug!(
            "Maneuver done at {:.1} mm, {:.1} deg",
            self.distance(),
            self.angle()
        );
    }

    /// One control tick for both loops and both wheels
    fn service(&mut self) {
        if self.distance_control.is_active() || self.heading_control.is_active() {
            let now = self.clock.now();
            let now_us = self.clock.now_us();
            let dt = self.clock.dt();
            let (d, drive_speed, h, turn_rate) = self.body_state();

            let sum = self.distance_control.update(now, now_us, dt, d, drive_speed);
            let dif = self.heading_control.update(now, now_us, dt, h, turn_rate);

            match (sum, dif) {
                (Actuation::Voltage(_), _) | (_, Actuation::Voltage(_)) => {
                    let wheels = WheelPair::from_sum_dif(sum.voltage(), dif.voltage());
                    self.left.actuate(Actuation::Voltage(wheels.left));
                    self.right.actuate(Actuation::Voltage(wheels.right));
                }
                (passive, _) => {
                    self.left.actuate(passive);
                    self.right.actuate(passive);
                }
            }
        }

        self.left.log_state();
        self.right.log_state();
        self.left.step_plant();
        self.right.step_plant();
    }
}
