use super::*;
use crate::config::{TurretConfig, TurretMotionConfig};
use crate::debounce::{MotionPhase, MotionState};

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn motion_config() -> TurretMotionConfig {
    let mut config = TurretConfig::default().turret;
    config.leg_duration_seconds = 0.2;
    config.wait_duration_seconds = 1.0;
    config.motor_stop_delay_seconds = 0.05;
    config.settle_duration_seconds = 1.0;
    config.max_rotation_duration_seconds = 5.0;
    config
}

fn setup() -> (ActuatorPort, TurretCoordinator) {
    let (port, link) = actuator_channel();
    (port, TurretCoordinator::new(&motion_config(), link))
}

fn active() -> MotionState {
    MotionState {
        phase: MotionPhase::Active,
        remaining: 10,
    }
}

fn start_leg(port: &ActuatorPort) {
    port.status.update(|status| {
        status.moving = true;
        status.legs_started += 1;
    });
}

fn finish_leg(port: &ActuatorPort) {
    port.status.update(|status| {
        status.moving = false;
        status.legs_finished = status.legs_started;
    });
}

#[test]
fn test_idle_stationary_sync_is_quiet() {
    let (_port, mut coordinator) = setup();
    let outcome = coordinator.sync(Instant::now());

    assert_eq!(outcome, SyncOutcome::default());
    assert_eq!(coordinator.state(), RotationState::Stationary);
}

#[test]
fn test_leg_start_enters_rotating() {
    let (port, mut coordinator) = setup();
    let now = Instant::now();

    start_leg(&port);
    let outcome = coordinator.sync(now);

    assert_eq!(coordinator.state(), RotationState::Rotating { since: now, leg: 1 });
    assert!(outcome.rebaseline);
    assert!(outcome.reset_motion);
    assert!(outcome.suppress);
    assert_eq!(
        outcome.transitions,
        vec![CoordinatorTransition::RotationStarted { leg: 1 }]
    );

    // Nothing new on the next sync
    let outcome = coordinator.sync(now + Duration::from_millis(50));
    assert!(!outcome.rebaseline);
    assert!(!outcome.reset_motion);
    assert!(outcome.suppress);
    assert!(outcome.transitions.is_empty());
}

#[test]
fn test_pause_while_rotating_does_not_interrupt_leg() {
    let (port, mut coordinator) = setup();
    let start = Instant::now();

    start_leg(&port);
    coordinator.sync(start);

    assert_eq!(coordinator.update_pause(&active()), None);
    assert!(!port.pause.get());

    for step in 1..10 {
        let outcome = coordinator.sync(start + Duration::from_millis(20 * step));
        assert!(outcome.suppress);
        assert!(matches!(coordinator.state(), RotationState::Rotating { leg: 1, .. }));
    }

    finish_leg(&port);
    let finished_at = start + Duration::from_millis(250);
    let outcome = coordinator.sync(finished_at);
    assert_eq!(
        coordinator.state(),
        RotationState::Settling {
            deadline: finished_at + Duration::from_secs(1)
        }
    );
    assert!(outcome.rebaseline);
    assert!(!outcome.reset_motion);
    assert_eq!(
        outcome.transitions,
        vec![CoordinatorTransition::RotationFinished { leg: 1 }]
    );
}

#[test]
fn test_leg_starting_under_standing_pause_clears_it() {
    let (port, mut coordinator) = setup();
    let now = Instant::now();

    assert_eq!(
        coordinator.update_pause(&active()),
        Some(CoordinatorTransition::PauseRequested)
    );
    assert!(port.pause.get());

    // The actuator passed its decision point just before the pause landed
    start_leg(&port);
    let outcome = coordinator.sync(now);

    assert!(matches!(coordinator.state(), RotationState::Rotating { .. }));
    assert!(!coordinator.pause_asserted());
    assert!(!port.pause.get());
    assert_eq!(
        outcome.transitions,
        vec![
            CoordinatorTransition::RotationStarted { leg: 1 },
            CoordinatorTransition::PauseCleared
        ]
    );
}

#[test]
fn test_settle_window_then_stationary() {
    let (port, mut coordinator) = setup();
    let start = Instant::now();

    start_leg(&port);
    coordinator.sync(start);
    finish_leg(&port);
    coordinator.sync(start + Duration::from_millis(250));

    let deadline = start + Duration::from_millis(1250);

    let outcome = coordinator.sync(deadline - Duration::from_millis(1));
    assert!(outcome.suppress);
    assert!(!outcome.rebaseline);
    assert!(outcome.transitions.is_empty());
    // Motion must not pause the actuator while settling
    assert_eq!(coordinator.update_pause(&active()), None);

    let outcome = coordinator.sync(deadline);
    assert_eq!(coordinator.state(), RotationState::Stationary);
    assert!(!outcome.suppress);
    assert!(outcome.rebaseline);
    assert_eq!(
        outcome.transitions,
        vec![CoordinatorTransition::SettleCompleted]
    );
}

#[test]
fn test_stalled_leg_is_forced_into_settling() {
    let (port, mut coordinator) = setup();
    let start = Instant::now();

    start_leg(&port);
    coordinator.sync(start);

    let outcome = coordinator.sync(start + Duration::from_millis(4999));
    assert!(outcome.transitions.is_empty());

    let stalled_at = start + Duration::from_secs(5);
    let outcome = coordinator.sync(stalled_at);
    assert_eq!(
        outcome.transitions,
        vec![CoordinatorTransition::RotationStalled {
            leg: 1,
            elapsed: Duration::from_secs(5)
        }]
    );
    assert!(outcome.rebaseline);
    assert_eq!(coordinator.stall_count(), 1);
    assert_eq!(
        coordinator.state(),
        RotationState::Settling {
            deadline: stalled_at + Duration::from_secs(1)
        }
    );

    // A late completion for the stalled leg changes nothing
    finish_leg(&port);
    let outcome = coordinator.sync(stalled_at + Duration::from_millis(100));
    assert!(outcome.transitions.is_empty());

    let outcome = coordinator.sync(stalled_at + Duration::from_secs(1));
    assert_eq!(coordinator.state(), RotationState::Stationary);
    assert_eq!(
        outcome.transitions,
        vec![CoordinatorTransition::SettleCompleted]
    );
}

#[test]
fn test_whole_leg_between_syncs() {
    let (port, mut coordinator) = setup();
    let now = Instant::now();

    start_leg(&port);
    finish_leg(&port);
    let outcome = coordinator.sync(now);

    assert_eq!(
        outcome.transitions,
        vec![
            CoordinatorTransition::RotationStarted { leg: 1 },
            CoordinatorTransition::RotationFinished { leg: 1 }
        ]
    );
    assert!(outcome.reset_motion);
    assert!(matches!(coordinator.state(), RotationState::Settling { .. }));
}

#[test]
fn test_new_leg_during_settle_goes_back_to_rotating() {
    let (port, mut coordinator) = setup();
    let start = Instant::now();

    start_leg(&port);
    coordinator.sync(start);
    finish_leg(&port);
    coordinator.sync(start + Duration::from_millis(250));

    start_leg(&port);
    let restart = start + Duration::from_millis(500);
    let outcome = coordinator.sync(restart);
    assert_eq!(
        coordinator.state(),
        RotationState::Rotating {
            since: restart,
            leg: 2
        }
    );
    assert!(outcome.rebaseline);
    assert!(outcome.reset_motion);
}

#[test]
fn test_pause_follows_motion_while_stationary() {
    let (port, mut coordinator) = setup();

    assert_eq!(
        coordinator.update_pause(&active()),
        Some(CoordinatorTransition::PauseRequested)
    );
    assert!(port.pause.get());
    assert_eq!(coordinator.update_pause(&active()), None);

    assert_eq!(
        coordinator.update_pause(&MotionState::IDLE),
        Some(CoordinatorTransition::PauseCleared)
    );
    assert!(!port.pause.get());
    assert_eq!(coordinator.update_pause(&MotionState::IDLE), None);
}

#[test]
fn test_rotation_state_is_published() {
    let (port, mut coordinator) = setup();
    let mut observer = coordinator.subscribe_state();
    assert!(!observer.has_changed());

    start_leg(&port);
    coordinator.sync(Instant::now());

    assert!(observer.has_changed());
    assert_eq!(observer.get_and_mark().name(), "rotating");
}

#[test]
fn test_transition_events() {
    let event = CoordinatorTransition::RotationStalled {
        leg: 4,
        elapsed: Duration::from_millis(5200),
    }
    .to_event();
    assert_eq!(event.event_type(), "rotation_stalled");

    assert_eq!(
        CoordinatorTransition::PauseRequested.to_event().event_type(),
        "pause_requested"
    );
}

/// Motion while stationary holds the real actuator before its next leg, and
/// clearing it lets the sweep continue.
#[tokio::test(start_paused = true)]
async fn test_pause_holds_actuator_until_motion_clears() {
    let (actuator, link) = RotationActuator::new(motion_config(), SimulatedDriver::new(60.0));
    let mut coordinator = TurretCoordinator::new(&motion_config(), link);

    assert_eq!(
        coordinator.update_pause(&active()),
        Some(CoordinatorTransition::PauseRequested)
    );

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(actuator.run(cancel.clone()));

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let outcome = coordinator.sync(Instant::now());
        assert!(outcome.transitions.is_empty());
        assert_eq!(coordinator.state(), RotationState::Stationary);
    }

    assert_eq!(
        coordinator.update_pause(&MotionState::IDLE),
        Some(CoordinatorTransition::PauseCleared)
    );

    let mut started = false;
    for _ in 0..15 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let outcome = coordinator.sync(Instant::now());
        if outcome
            .transitions
            .contains(&CoordinatorTransition::RotationStarted { leg: 1 })
        {
            started = true;
            break;
        }
    }
    assert!(started, "actuator never resumed");
    assert!(matches!(coordinator.state(), RotationState::Rotating { leg: 1, .. }));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
