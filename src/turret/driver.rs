use crate::error::ActuatorError;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Sweep direction of the rotating base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    fn sign(self) -> f64 {
        match self {
            Direction::Left => -1.0,
            Direction::Right => 1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
        }
    }
}

/// Motor hardware behind the rotation actuator
#[async_trait]
pub trait StepperDriver: Send {
    fn name(&self) -> &str;

    /// Energize the motor in `direction` and return once `duration` elapsed
    async fn run_leg(&mut self, direction: Direction, duration: Duration) -> Result<(), ActuatorError>;

    /// De-energize the motor outputs
    async fn halt(&mut self) -> Result<(), ActuatorError>;

    /// Give the hardware back; no further calls follow
    async fn release(&mut self) -> Result<(), ActuatorError>;
}

/// Observable state of a [`SimulatedDriver`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatedDriverState {
    pub position_degrees: f64,
    pub energized: bool,
    pub legs_run: u64,
    pub halts: u64,
    pub released: bool,
}

/// Stepper stand-in that tracks an angular position.
///
/// A stuck driver never finishes a leg, which is how a lost completion
/// signal looks from the actuator's side.
pub struct SimulatedDriver {
    degrees_per_second: f64,
    stuck: bool,
    failing_legs: u32,
    state: Arc<Mutex<SimulatedDriverState>>,
}

impl SimulatedDriver {
    pub fn new(degrees_per_second: f64) -> Self {
        Self {
            degrees_per_second,
            stuck: false,
            failing_legs: 0,
            state: Arc::new(Mutex::new(SimulatedDriverState::default())),
        }
    }

    pub fn stuck(degrees_per_second: f64) -> Self {
        Self {
            stuck: true,
            ..Self::new(degrees_per_second)
        }
    }

    /// Make the next `count` legs fail with a driver error
    pub fn with_failing_legs(mut self, count: u32) -> Self {
        self.failing_legs = count;
        self
    }

    /// Shared view of the simulated hardware
    pub fn state(&self) -> Arc<Mutex<SimulatedDriverState>> {
        Arc::clone(&self.state)
    }
}

#[async_trait]
impl StepperDriver for SimulatedDriver {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn run_leg(&mut self, direction: Direction, duration: Duration) -> Result<(), ActuatorError> {
        if self.failing_legs > 0 {
            self.failing_legs -= 1;
            return Err(ActuatorError::Driver {
                driver: self.name().to_string(),
                details: format!("simulated fault rotating {}", direction),
            });
        }

        self.state.lock().energized = true;

        if self.stuck {
            debug!("Simulated driver stuck rotating {}", direction);
            std::future::pending::<()>().await;
        }

        tokio::time::sleep(duration).await;

        let mut state = self.state.lock();
        state.position_degrees += direction.sign() * self.degrees_per_second * duration.as_secs_f64();
        state.legs_run += 1;
        debug!(
            "Simulated leg {} done, position {:.1} degrees",
            direction, state.position_degrees
        );
        Ok(())
    }

    async fn halt(&mut self) -> Result<(), ActuatorError> {
        let mut state = self.state.lock();
        state.energized = false;
        state.halts += 1;
        Ok(())
    }

    async fn release(&mut self) -> Result<(), ActuatorError> {
        let mut state = self.state.lock();
        state.energized = false;
        state.released = true;
        info!("Simulated driver released at {:.1} degrees", state.position_degrees);
        Ok(())
    }
}
