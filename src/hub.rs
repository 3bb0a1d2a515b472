// Control clock and port bookkeeping for the simulated hub
//
// The clock counts control ticks. Time reported to controllers and logs is
// always tick count * period, so runs are reproducible whether or not the
// ticks are paced in real time.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::RobotConfig;
use crate::error::{Error, Result};
use crate::motor::{Motor, MotorType};
use crate::parameters::{Direction, Port};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Advance time as fast as the controllers can be evaluated
    Simulated,
    /// Sleep so each tick lands on its wall-clock deadline
    Realtime,
}

#[derive(Debug)]
struct ClockInner {
    period: Duration,
    pacing: Pacing,
    ticks: AtomicU64,
    started: Instant,
}

/// Shared control-loop time source. Cloning yields a handle to the same clock.
#[derive(Debug, Clone)]
pub struct Clock {
    inner: Arc<ClockInner>,
}

impl Clock {
    pub fn new(period: Duration, pacing: Pacing) -> Self {
        Self {
            inner: Arc::new(ClockInner {
                period,
                pacing,
                ticks: AtomicU64::new(0),
                started: Instant::now(),
            }),
        }
    }

    pub fn simulated(period: Duration) -> Self {
        Self::new(period, Pacing::Simulated)
    }

    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Loop period in seconds
    pub fn dt(&self) -> f32 {
        self.inner.period.as_secs_f32()
    }

    pub fn period_ms(&self) -> u32 {
        self.inner.period.as_millis().max(1) as u32
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Acquire)
    }

    /// Current control time in microseconds
    pub fn now_us(&self) -> u64 {
        self.ticks() * self.inner.period.as_micros() as u64
    }

    /// Current control time in seconds
    pub fn now(&self) -> f32 {
        self.now_us() as f32 / 1_000_000.0
    }

    /// Number of ticks covering `ms` milliseconds, rounded up
    pub fn ticks_for_ms(&self, ms: u32) -> u64 {
        let period = self.period_ms() as u64;
        (ms as u64).div_ceil(period)
    }

    /// True if both handles refer to the same clock
    pub fn same_as(&self, other: &Clock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Wait for the next control tick and advance time by one period
    pub async fn tick(&self) {
        let n = self.inner.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        match self.inner.pacing {
            Pacing::Simulated => tokio::task::yield_now().await,
            Pacing::Realtime => {
                let deadline = self.inner.started + self.inner.period * n as u32;
                tokio::time::sleep_until(deadline).await;
            }
        }
    }
}

/// The programmable brick: owns the clock and hands out motors
#[derive(Debug)]
pub struct Hub {
    clock: Clock,
    num_ports: usize,
    motor_type: MotorType,
    claimed: HashSet<Port>,
}

impl Hub {
    pub fn new(config: &RobotConfig, pacing: Pacing) -> Self {
        info!(
            "Hub started: {} ports, {}ms loop, {:?} pacing",
            config.hub_ports,
            config.loop_period().as_millis(),
            pacing
        );
        Self {
            clock: Clock::new(config.loop_period(), pacing),
            num_ports: config.hub_ports.min(Port::ALL.len()),
            motor_type: config.motor_type,
            claimed: HashSet::new(),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Claim a port and return a motor of the configured type on it
    pub fn motor(&mut self, port: Port, direction: Direction) -> Result<Motor> {
        self.motor_with_type(port, direction, self.motor_type)
    }

    pub fn motor_with_type(
        &mut self,
        port: Port,
        direction: Direction,
        motor_type: MotorType,
    ) -> Result<Motor> {
        if port.index() >= self.num_ports {
            return Err(Error::InvalidPort(port));
        }
        if !self.claimed.insert(port) {
            return Err(Error::PortInUse(port));
        }
        debug!("Claimed port {} for {:?} motor", port, motor_type);
        Ok(Motor::new(port, direction, motor_type, self.clock.clone()))
    }

    /// Free a port so it can be claimed again
    pub fn release(&mut self, motor: Motor) {
        self.claimed.remove(&motor.port());
    }

    /// Let time pass without servicing any motor
    pub async fn wait(&self, ms: u32) {
        for _ in 0..self.clock.ticks_for_ms(ms) {
            self.clock.tick().await;
        }
    }
}
