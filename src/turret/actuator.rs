use crate::config::TurretMotionConfig;
use crate::error::ActuatorError;
use crate::events::{EventBus, TurretEvent};
use crate::signal::{self, SignalReader, SignalWriter};
use crate::turret::driver::{Direction, StepperDriver};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What the actuator publishes about itself.
///
/// `legs_started` and `legs_finished` only ever grow, so a reader that
/// polls late still sees that a leg began or ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorStatus {
    pub moving: bool,
    pub legs_started: u64,
    pub legs_finished: u64,
    pub direction: Direction,
}

impl Default for ActuatorStatus {
    fn default() -> Self {
        Self {
            moving: false,
            legs_started: 0,
            legs_finished: 0,
            direction: Direction::Left,
        }
    }
}

/// The coordinator's end of the actuator contract: it reads status and
/// owns the only pause writer.
#[derive(Debug)]
pub struct ActuatorLink {
    pub status: SignalReader<ActuatorStatus>,
    pub pause: SignalWriter<bool>,
}

/// The actuator's end: it owns the only status writer and reads the pause
/// intent.
#[derive(Debug)]
pub struct ActuatorPort {
    pub status: SignalWriter<ActuatorStatus>,
    pub pause: SignalReader<bool>,
}

/// Wire up both ends of the actuator contract
pub fn actuator_channel() -> (ActuatorPort, ActuatorLink) {
    let (status_writer, status_reader) = signal::channel(ActuatorStatus::default());
    let (pause_writer, pause_reader) = signal::channel(false);

    (
        ActuatorPort {
            status: status_writer,
            pause: pause_reader,
        },
        ActuatorLink {
            status: status_reader,
            pause: pause_writer,
        },
    )
}

impl ActuatorLink {
    pub fn is_moving(&self) -> bool {
        self.status.get().moving
    }

    pub fn set_pause_intent(&self, paused: bool) -> bool {
        self.pause.set(paused)
    }
}

/// Autonomous oscillating sweep.
///
/// The pause intent is read only at the start of a leg; a leg in flight
/// always runs to completion unless the whole loop is cancelled.
pub struct RotationActuator<D: StepperDriver> {
    config: TurretMotionConfig,
    driver: D,
    status: SignalWriter<ActuatorStatus>,
    pause: SignalReader<bool>,
    event_bus: Option<Arc<EventBus>>,
    direction: Direction,
    legs_in_direction: u32,
}

impl<D: StepperDriver> RotationActuator<D> {
    pub fn new(config: TurretMotionConfig, driver: D) -> (Self, ActuatorLink) {
        let (port, link) = actuator_channel();

        let actuator = Self {
            config,
            driver,
            status: port.status,
            pause: port.pause,
            event_bus: None,
            direction: Direction::Left,
            legs_in_direction: 0,
        };

        (actuator, link)
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Run the sweep until `cancel` fires. The driver is halted and released
    /// before this returns.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ActuatorError> {
        info!(
            "Starting rotation actuator ({} driver, {:?} legs, {} per direction)",
            self.driver.name(),
            self.config.leg_duration(),
            self.config.legs_before_reverse
        );

        self.sweep(&cancel).await;

        let halted = self.driver.halt().await;
        let released = self.driver.release().await;
        self.status.update(|status| status.moving = false);

        info!("Rotation actuator stopped");
        halted.and(released)
    }

    async fn sweep(&mut self, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            if self.pause.get() {
                debug!("Rotation paused, skipping leg");
            } else if !self.run_leg(cancel).await {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.wait_duration()) => {}
            }
        }
    }

    /// One leg: rotate, halt, let the motor stop, report. Returns false when
    /// cancelled mid-leg.
    async fn run_leg(&mut self, cancel: &CancellationToken) -> bool {
        let direction = self.direction;
        let leg = self.status.update(|status| {
            status.moving = true;
            status.legs_started += 1;
            status.direction = direction;
            status.legs_started
        });
        info!("Rotating {} for {:?} (leg {})", direction, self.config.leg_duration(), leg);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.driver.run_leg(direction, self.config.leg_duration()) => Some(result),
        };

        // The motor is always stopped before anything else happens
        if let Err(e) = self.driver.halt().await {
            error!("Failed to halt stepper after leg {}: {}", leg, e);
            self.report_error(&e);
        }

        let completed = match outcome {
            None => {
                info!("Leg {} abandoned on shutdown", leg);
                false
            }
            Some(Err(e)) => {
                warn!("Leg {} failed: {}", leg, e);
                self.report_error(&e);
                true
            }
            Some(Ok(())) => true,
        };

        if completed {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.config.motor_stop_delay()) => {}
            }
        }

        self.status.update(|status| {
            status.moving = false;
            status.legs_finished = leg;
        });

        self.legs_in_direction += 1;
        if self.legs_in_direction >= self.config.legs_before_reverse {
            self.direction = self.direction.reversed();
            self.legs_in_direction = 0;
            info!("Switching direction to {}", self.direction);
        }

        completed && !cancel.is_cancelled()
    }

    fn report_error(&self, error: &ActuatorError) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.publish(TurretEvent::SystemError {
                component: "rotation_actuator".to_string(),
                error: error.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TurretConfig;
    use crate::turret::driver::SimulatedDriver;
    use std::time::Duration;

    fn motion_config() -> TurretMotionConfig {
        let mut config = TurretConfig::default().turret;
        config.leg_duration_seconds = 0.2;
        config.wait_duration_seconds = 1.0;
        config.motor_stop_delay_seconds = 0.05;
        config.legs_before_reverse = 2;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_leg_reports_moving_then_finished() {
        let (actuator, link) = RotationActuator::new(motion_config(), SimulatedDriver::new(60.0));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(actuator.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = link.status.get();
        assert!(status.moving);
        assert_eq!(status.legs_started, 1);
        assert_eq!(status.legs_finished, 0);

        // Still moving while the motor stop delay runs
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(link.is_moving());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = link.status.get();
        assert!(!status.moving);
        assert_eq!(status.legs_finished, 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_direction_reverses_after_configured_legs() {
        let (actuator, link) = RotationActuator::new(motion_config(), SimulatedDriver::new(60.0));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(actuator.run(cancel.clone()));

        let mut seen = Vec::new();
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            seen.push(link.status.get().direction);
            tokio::time::sleep(Duration::from_millis(1150)).await;
        }

        assert_eq!(
            seen,
            vec![Direction::Left, Direction::Left, Direction::Right, Direction::Right]
        );

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_prevents_next_leg() {
        let (actuator, link) = RotationActuator::new(motion_config(), SimulatedDriver::new(60.0));
        link.set_pause_intent(true);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(actuator.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(link.status.get().legs_started, 0);

        link.set_pause_intent(false);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(link.status.get().legs_started, 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_does_not_interrupt_leg_in_flight() {
        let (actuator, link) = RotationActuator::new(motion_config(), SimulatedDriver::new(60.0));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(actuator.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(link.is_moving());
        link.set_pause_intent(true);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let status = link.status.get();
        assert_eq!(status.legs_finished, 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(link.status.get().legs_started, 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_leg_halts_and_releases() {
        let driver = SimulatedDriver::stuck(60.0);
        let driver_state = driver.state();
        let (actuator, link) = RotationActuator::new(motion_config(), driver);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(actuator.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(link.is_moving());

        cancel.cancel();
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("actuator did not stop within one leg")
            .unwrap()
            .unwrap();

        let state = driver_state.lock().clone();
        assert!(state.released);
        assert!(!state.energized);
        assert!(!link.is_moving());
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_fault_is_reported_and_sweep_continues() {
        let bus = Arc::new(EventBus::new(16));
        let mut events = bus.subscribe();

        let driver = SimulatedDriver::new(60.0).with_failing_legs(1);
        let (actuator, link) = RotationActuator::new(motion_config(), driver);
        let actuator = actuator.with_event_bus(Arc::clone(&bus));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(actuator.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let status = link.status.get();
        assert_eq!(status.legs_started, 2);

        match events.try_recv() {
            Ok(TurretEvent::SystemError { component, .. }) => {
                assert_eq!(component, "rotation_actuator")
            }
            other => panic!("Expected SystemError, got {:?}", other),
        }

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
