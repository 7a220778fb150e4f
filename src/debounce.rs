//! Per-frame motion booleans in, debounced motion episodes out.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionPhase {
    Idle,
    Active,
}

/// Debounced motion state.
///
/// `Active` always carries `remaining > 0`; the frame that drains the
/// counter also flips the phase to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionState {
    pub phase: MotionPhase,
    pub remaining: u32,
}

impl MotionState {
    pub const IDLE: MotionState = MotionState {
        phase: MotionPhase::Idle,
        remaining: 0,
    };

    pub fn is_active(&self) -> bool {
        self.phase == MotionPhase::Active
    }
}

impl Default for MotionState {
    fn default() -> Self {
        Self::IDLE
    }
}

/// Edge emitted at most once per episode boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionEdge {
    Started,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct MotionDebouncer {
    hold_frames: u32,
    state: MotionState,
}

impl MotionDebouncer {
    pub fn new(hold_frames: u32) -> Self {
        Self {
            hold_frames: hold_frames.max(1),
            state: MotionState::IDLE,
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Consume one frame's motion verdict.
    ///
    /// A suppressed frame is not consumed at all: state and counter stay
    /// exactly as they were and no edge is produced.
    pub fn update(&mut self, motion: bool, suppressed: bool) -> Option<MotionEdge> {
        if suppressed {
            return None;
        }

        if motion {
            let was_idle = self.state.phase == MotionPhase::Idle;
            self.state = MotionState {
                phase: MotionPhase::Active,
                remaining: self.hold_frames,
            };
            if was_idle {
                info!("Motion started (hold {} frames)", self.hold_frames);
                return Some(MotionEdge::Started);
            }
            return None;
        }

        if self.state.remaining == 0 {
            return None;
        }

        self.state.remaining -= 1;
        if self.state.remaining == 0 {
            self.state.phase = MotionPhase::Idle;
            info!("Motion stopped");
            return Some(MotionEdge::Stopped);
        }

        None
    }

    /// Force the state back to `Idle`.
    ///
    /// Ending an active episode this way is a real episode boundary, so it
    /// reports `Stopped` just like a drained hold would.
    pub fn reset(&mut self) -> Option<MotionEdge> {
        let was_active = self.state.is_active();
        self.state = MotionState::IDLE;
        if was_active {
            debug!("Motion state reset while active");
            Some(MotionEdge::Stopped)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_started_edge_per_episode() {
        let mut debouncer = MotionDebouncer::new(5);
        let edges: Vec<_> = (0..3).filter_map(|_| debouncer.update(true, false)).collect();
        assert_eq!(edges, vec![MotionEdge::Started]);
        assert_eq!(debouncer.state().remaining, 5);
    }

    #[test]
    fn test_hold_releases_on_exact_frame() {
        let hold = 50;
        let mut debouncer = MotionDebouncer::new(hold);
        assert_eq!(debouncer.update(true, false), Some(MotionEdge::Started));

        for frame in 1..hold {
            assert_eq!(debouncer.update(false, false), None, "frame {}", frame);
            assert!(debouncer.state().is_active());
            assert_eq!(debouncer.state().remaining, hold - frame);
        }

        assert_eq!(debouncer.update(false, false), Some(MotionEdge::Stopped));
        assert_eq!(debouncer.state(), MotionState::IDLE);

        // Further quiet frames stay quiet
        assert_eq!(debouncer.update(false, false), None);
        assert_eq!(debouncer.state(), MotionState::IDLE);
    }

    #[test]
    fn test_motion_renews_hold() {
        let mut debouncer = MotionDebouncer::new(3);
        debouncer.update(true, false);
        debouncer.update(false, false);
        debouncer.update(false, false);
        assert_eq!(debouncer.state().remaining, 1);

        assert_eq!(debouncer.update(true, false), None);
        assert_eq!(debouncer.state().remaining, 3);
    }

    #[test]
    fn test_suppression_freezes_state() {
        let mut debouncer = MotionDebouncer::new(10);
        debouncer.update(true, false);
        debouncer.update(false, false);
        let before = debouncer.state();

        for motion in [true, false, true, true, false, false, false] {
            assert_eq!(debouncer.update(motion, true), None);
            assert_eq!(debouncer.state(), before);
        }

        let mut idle = MotionDebouncer::new(10);
        for motion in [true, true, false] {
            assert_eq!(idle.update(motion, true), None);
        }
        assert_eq!(idle.state(), MotionState::IDLE);
    }

    #[test]
    fn test_reset_ends_active_episode() {
        let mut debouncer = MotionDebouncer::new(10);
        assert_eq!(debouncer.reset(), None);

        debouncer.update(true, false);
        assert_eq!(debouncer.reset(), Some(MotionEdge::Stopped));
        assert_eq!(debouncer.state(), MotionState::IDLE);

        // A fresh episode starts cleanly afterwards
        assert_eq!(debouncer.update(true, false), Some(MotionEdge::Started));
    }
}
