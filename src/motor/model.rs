// Simulated DC motor standing in for the hardware behind a port
//
// State is kept in the motor's physical frame: positive means clockwise as
// seen from the shaft side. Direction handling happens in `Motor`.

use crate::control::Actuation;

use super::settings::Model;

// Below this speed the shaft counts as standing still (deg/s)
const STANDSTILL: f32 = 1e-3;

#[derive(Debug, Clone)]
pub struct SimMotor {
    model: Model,
    angle: f32,
    speed: f32,
    actuation: Actuation,
    /// Hard mechanical stops (deg), if the shaft is blocked somewhere
    limits: Option<(f32, f32)>,
}

impl SimMotor {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            angle: 0.0,
            speed: 0.0,
            actuation: Actuation::Coast,
            limits: None,
        }
    }

    /// Encoder angle (deg)
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Shaft speed (deg/s)
    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn actuation(&self) -> Actuation {
        self.actuation
    }

    pub fn set_limits(&mut self, limits: Option<(f32, f32)>) {
        self.limits = limits.map(|(a, b)| (a.min(b), a.max(b)));
    }

    pub fn apply(&mut self, actuation: Actuation) {
        self.actuation = match actuation {
            Actuation::Voltage(v) => Actuation::Voltage(v.clamp(
                -super::settings::MAX_VOLTAGE,
                super::settings::MAX_VOLTAGE,
            )),
            other => other,
        };
    }

    /// Advance the model by `dt` seconds
    pub fn step(&mut self, dt: f32) {
        let m = &self.model;
        let moving = self.speed.abs() > STANDSTILL;
        let direction = self.speed.signum();

        let (acceleration, friction_only) = match self.actuation {
            Actuation::Voltage(v) => {
                if !moving && v.abs() <= m.friction {
                    // Not enough to break away
                    (0.0, true)
                } else {
                    let friction = if moving { direction } else { v.signum() } * m.friction;
                    let effective = v - friction;
                    ((m.gain * effective - self.speed) / m.tau, v.abs() <= m.friction)
                }
            }
            // Shorted terminals: back-EMF brakes the shaft
            Actuation::Brake => ((-m.gain * m.friction * direction - self.speed) / m.tau, true),
            Actuation::Coast => (-m.coast_deceleration * direction, true),
        };

        let mut next = self.speed + acceleration * dt;
        // Friction stops the shaft, it never reverses it
        if friction_only && moving && next.signum() != direction {
            next = 0.0;
        }
        if !moving && friction_only {
            next = 0.0;
        }

        self.angle += (self.speed + next) / 2.0 * dt;
        self.speed = next;

        if let Some((min, max)) = self.limits {
            let blocked = (self.angle >= max && self.speed >= 0.0)
                || (self.angle <= min && self.speed <= 0.0);
            if blocked {
                self.angle = self.angle.clamp(min, max);
                self.speed = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::MotorType;

    const DT: f32 = 0.005;

    fn run(motor: &mut SimMotor, seconds: f32) {
        let steps = (seconds / DT).round() as usize;
        for _ in 0..steps {
            motor.step(DT);
        }
    }

    #[test]
    fn test_constant_voltage_reaches_steady_speed() {
        let model = MotorType::SpikeM.model();
        let mut motor = SimMotor::new(model);
        motor.apply(Actuation::Voltage(6000.0));
        run(&mut motor, 1.0);
        let expected = model.gain * (6000.0 - model.friction);
        assert!((motor.speed() - expected).abs() < 1.0, "speed {}", motor.speed());
        assert!(motor.angle() > 0.0);
    }

    #[test]
    fn test_small_voltage_does_not_break_away() {
        let mut motor = SimMotor::new(MotorType::SpikeM.model());
        motor.apply(Actuation::Voltage(-100.0));
        run(&mut motor, 0.5);
        assert_eq!(motor.speed(), 0.0);
        assert_eq!(motor.angle(), 0.0);
    }

    #[test]
    fn test_coast_and_brake_stop_without_reversing() {
        for stop in [Actuation::Coast, Actuation::Brake] {
            let mut motor = SimMotor::new(MotorType::SpikeM.model());
            motor.apply(Actuation::Voltage(-9000.0));
            run(&mut motor, 0.5);
            assert!(motor.speed() < -500.0);

            motor.apply(stop);
            run(&mut motor, 2.0);
            assert_eq!(motor.speed(), 0.0, "{:?}", stop);
        }
    }

    #[test]
    fn test_brake_stops_faster_than_coast() {
        let mut coasting = SimMotor::new(MotorType::SpikeM.model());
        let mut braking = SimMotor::new(MotorType::SpikeM.model());
        for motor in [&mut coasting, &mut braking] {
            motor.apply(Actuation::Voltage(9000.0));
            run(motor, 0.5);
        }
        coasting.apply(Actuation::Coast);
        braking.apply(Actuation::Brake);
        run(&mut coasting, 0.1);
        run(&mut braking, 0.1);
        assert!(braking.speed() < coasting.speed());
    }

    #[test]
    fn test_mechanical_limit_blocks_shaft() {
        let mut motor = SimMotor::new(MotorType::SpikeM.model());
        motor.set_limits(Some((90.0, -90.0)));
        motor.apply(Actuation::Voltage(9000.0));
        run(&mut motor, 1.0);
        assert_eq!(motor.angle(), 90.0);
        assert_eq!(motor.speed(), 0.0);
    }

    #[test]
    fn test_voltage_is_clamped() {
        let mut motor = SimMotor::new(MotorType::SpikeM.model());
        motor.apply(Actuation::Voltage(20000.0));
        assert_eq!(motor.actuation(), Actuation::Voltage(9000.0));
    }
}
