use crate::config::TurretMotionConfig;
use crate::debounce::MotionState;
use crate::error::ActuatorError;
use crate::events::TurretEvent;
use crate::signal::{self, SignalReader, SignalWriter};
use crate::turret::actuator::ActuatorLink;

use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where the platform is in its move/settle cycle, as seen by the
/// coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    Stationary,
    Rotating { since: Instant, leg: u64 },
    Settling { deadline: Instant },
}

impl RotationState {
    pub fn is_stationary(&self) -> bool {
        matches!(self, RotationState::Stationary)
    }

    pub fn name(&self) -> &'static str {
        match self {
            RotationState::Stationary => "stationary",
            RotationState::Rotating { .. } => "rotating",
            RotationState::Settling { .. } => "settling",
        }
    }
}

/// Something the coordinator decided during one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorTransition {
    RotationStarted { leg: u64 },
    RotationFinished { leg: u64 },
    RotationStalled { leg: u64, elapsed: Duration },
    SettleCompleted,
    PauseRequested,
    PauseCleared,
}

impl CoordinatorTransition {
    pub fn to_event(&self) -> TurretEvent {
        let timestamp = SystemTime::now();
        match *self {
            CoordinatorTransition::RotationStarted { leg } => {
                TurretEvent::RotationStarted { leg, timestamp }
            }
            CoordinatorTransition::RotationFinished { leg } => {
                TurretEvent::RotationFinished { leg, timestamp }
            }
            CoordinatorTransition::RotationStalled { leg, elapsed } => TurretEvent::RotationStalled {
                leg,
                elapsed_ms: elapsed.as_millis() as u64,
                timestamp,
            },
            CoordinatorTransition::SettleCompleted => TurretEvent::SettleCompleted { timestamp },
            CoordinatorTransition::PauseRequested => TurretEvent::PauseRequested { timestamp },
            CoordinatorTransition::PauseCleared => TurretEvent::PauseCleared { timestamp },
        }
    }
}

/// What the sensing loop must do with the current frame after a sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Replace the reference frame with the current frame
    pub rebaseline: bool,
    /// Do not feed this frame's motion verdict to the debouncer
    pub suppress: bool,
    /// Force the debounced motion state back to idle
    pub reset_motion: bool,
    pub transitions: Vec<CoordinatorTransition>,
}

/// Arbitrates between debounced motion and the rotating base.
///
/// Time is passed in rather than read, so every transition is a pure
/// function of (state, actuator status, now).
pub struct TurretCoordinator {
    settle_duration: Duration,
    max_rotation_duration: Duration,
    link: ActuatorLink,
    state: RotationState,
    state_signal: SignalWriter<RotationState>,
    seen_legs_started: u64,
    pause_asserted: bool,
    stalls: u64,
}

impl TurretCoordinator {
    pub fn new(config: &TurretMotionConfig, link: ActuatorLink) -> Self {
        let (state_signal, _) = signal::channel(RotationState::Stationary);
        let seen_legs_started = link.status.get().legs_started;

        Self {
            settle_duration: config.settle_duration(),
            max_rotation_duration: config.max_rotation_duration(),
            link,
            state: RotationState::Stationary,
            state_signal,
            seen_legs_started,
            pause_asserted: false,
            stalls: 0,
        }
    }

    pub fn state(&self) -> RotationState {
        self.state
    }

    pub fn subscribe_state(&self) -> SignalReader<RotationState> {
        self.state_signal.subscribe()
    }

    pub fn pause_asserted(&self) -> bool {
        self.pause_asserted
    }

    pub fn stall_count(&self) -> u64 {
        self.stalls
    }

    /// Fold the latest actuator status into the rotation state machine
    pub fn sync(&mut self, now: Instant) -> SyncOutcome {
        let status = self.link.status.get();
        let mut outcome = SyncOutcome::default();

        if status.legs_started > self.seen_legs_started {
            self.seen_legs_started = status.legs_started;

            if let RotationState::Rotating { leg, .. } = self.state {
                // Previous leg's finish was missed between two syncs
                outcome.transitions.push(CoordinatorTransition::RotationFinished { leg });
            }
            self.enter_rotating(now, status.legs_started, &mut outcome);
        }

        if let RotationState::Rotating { since, leg } = self.state {
            let elapsed = now.saturating_duration_since(since);
            if status.legs_finished >= leg {
                info!("Rotation leg {} finished, settling for {:?}", leg, self.settle_duration);
                outcome.transitions.push(CoordinatorTransition::RotationFinished { leg });
                self.enter_settling(now, &mut outcome);
            } else if elapsed >= self.max_rotation_duration {
                self.stalls += 1;
                warn!(
                    "{}; forcing settle",
                    ActuatorError::Stalled { leg, elapsed }
                );
                outcome
                    .transitions
                    .push(CoordinatorTransition::RotationStalled { leg, elapsed });
                self.enter_settling(now, &mut outcome);
            }
        }

        if let RotationState::Settling { deadline } = self.state {
            if now >= deadline {
                info!("Settle window elapsed, motion detection live");
                self.set_state(RotationState::Stationary);
                outcome.rebaseline = true;
                outcome.transitions.push(CoordinatorTransition::SettleCompleted);
            }
        }

        outcome.suppress = !self.state.is_stationary();
        outcome
    }

    /// Assert or clear the pause intent from debounced motion.
    ///
    /// Only a stationary platform is influenced; while rotating or settling
    /// the motion state is frozen and must not feed back into the actuator.
    pub fn update_pause(&mut self, motion: &MotionState) -> Option<CoordinatorTransition> {
        if !self.state.is_stationary() {
            return None;
        }

        if motion.is_active() && !self.pause_asserted {
            info!("Motion while stationary, pausing rotation");
            self.pause_asserted = true;
            self.link.set_pause_intent(true);
            return Some(CoordinatorTransition::PauseRequested);
        }

        if !motion.is_active() && self.pause_asserted {
            info!("Motion cleared, resuming rotation");
            self.pause_asserted = false;
            self.link.set_pause_intent(false);
            return Some(CoordinatorTransition::PauseCleared);
        }

        None
    }

    fn enter_rotating(&mut self, now: Instant, leg: u64, outcome: &mut SyncOutcome) {
        info!("Rotation leg {} started", leg);
        self.set_state(RotationState::Rotating { since: now, leg });
        outcome.rebaseline = true;
        outcome.reset_motion = true;
        outcome.transitions.push(CoordinatorTransition::RotationStarted { leg });

        if self.pause_asserted {
            // The leg started before the pause was observed
            self.pause_asserted = false;
            self.link.set_pause_intent(false);
            outcome.transitions.push(CoordinatorTransition::PauseCleared);
        }
    }

    fn enter_settling(&mut self, now: Instant, outcome: &mut SyncOutcome) {
        self.set_state(RotationState::Settling {
            deadline: now + self.settle_duration,
        });
        outcome.rebaseline = true;
    }

    fn set_state(&mut self, state: RotationState) {
        debug!("Rotation state {} -> {}", self.state.name(), state.name());
        self.state = state;
        self.state_signal.set(state);
    }
}
