// Four-move drive base test: drive out and back twice, then dump the logs
//
// Left motor on port A (counterclockwise), right motor on port B. Logs for
// both servos and both drive base loops run for the whole sequence and are
// saved to the output directory when the base has stopped.

use std::path::PathBuf;

use tracing::info;

use crate::config::{
    LOG_CONTROL_DISTANCE, LOG_CONTROL_HEADING, LOG_DIVISOR, LOG_DURATION_MS, LOG_SERVO_LEFT,
    LOG_SERVO_RIGHT, RobotConfig,
};
use crate::error::Result;
use crate::hub::{Hub, Pacing};
use crate::logger::Log;
use crate::messages::{RunSummary, SavedLog};
use crate::parameters::{Direction, Port};
use crate::robotics::DriveBase;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Time to keep holding after the last move, so the log shows it (ms)
const HOLD_TIME_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Move {
    /// Drive straight (mm)
    Straight(f32),
    /// Turn in place (deg)
    Turn(f32),
}

/// Drive straight forward and back again
pub const MOVES: [Move; 4] = [
    Move::Straight(500.0),
    Move::Turn(-500.0),
    Move::Straight(500.0),
    Move::Turn(-500.0),
];

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub duration_ms: u32,
    pub divisor: u32,
    pub config: RobotConfig,
    pub pacing: Pacing,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            duration_ms: LOG_DURATION_MS,
            divisor: LOG_DIVISOR,
            config: RobotConfig::default(),
            pacing: Pacing::Simulated,
        }
    }
}

pub async fn run(options: &RunOptions) -> Result<RunSummary> {
    info!("drivebase-runtime {}", VERSION);
    let config = &options.config;

    // Default "driving base" with medium motors and wheels
    let mut hub = Hub::new(config, options.pacing);
    let left = hub.motor(Port::A, Direction::Counterclockwise)?;
    let right = hub.motor(Port::B, Direction::Clockwise)?;
    let mut drive_base = DriveBase::new(left, right, config.wheel_diameter, config.axle_track)?;
    if !config.drive.is_empty() {
        let settings = config.drive.merge(drive_base.settings());
        drive_base.set_settings(settings)?;
    }

    // Allocate logs for motors and controller signals
    let (duration, divisor) = (options.duration_ms, options.divisor);
    drive_base.left_motor_mut().log_mut().start(duration, divisor)?;
    drive_base.right_motor_mut().log_mut().start(duration, divisor)?;
    drive_base.distance_control_mut().log_mut().start(duration, divisor)?;
    drive_base.heading_control_mut().log_mut().start(duration, divisor)?;

    for step in MOVES {
        match step {
            Move::Straight(distance) => drive_base.straight(distance).await?,
            Move::Turn(angle) => drive_base.turn(angle).await?,
        }
    }

    // Log the hold for a moment, then turn the motors off completely
    drive_base.wait(HOLD_TIME_MS).await;
    let final_state = drive_base.state();
    drive_base.stop();

    info!("Transferring data to {}", options.output_dir.display());
    std::fs::create_dir_all(&options.output_dir)?;
    let logs: [(&str, &Log); 4] = [
        (LOG_SERVO_LEFT, drive_base.left_motor().log()),
        (LOG_SERVO_RIGHT, drive_base.right_motor().log()),
        (LOG_CONTROL_DISTANCE, drive_base.distance_control().log()),
        (LOG_CONTROL_HEADING, drive_base.heading_control().log()),
    ];
    let mut saved = Vec::with_capacity(logs.len());
    for (file, log) in logs {
        let rows = log.save(options.output_dir.join(file))?;
        saved.push(SavedLog {
            file: file.to_string(),
            rows,
        });
    }
    info!("Done");

    Ok(RunSummary {
        version: VERSION.to_string(),
        elapsed_ms: hub.clock().now_us() / 1000,
        final_state,
        logs: saved,
    })
}
