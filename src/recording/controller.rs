use crate::debounce::MotionState;
use crate::error::RecordingError;
use crate::events::{EventBus, TurretEvent};
use crate::recording::sink::{RecordingSink, RecordingSummary};
use crate::signal::SignalReader;

use chrono::{DateTime, Local};
use image::RgbImage;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info, warn};

/// Opens and closes the recording sink from debounced motion and the
/// operator's enable flag.
pub struct RecordingController {
    sink: Box<dyn RecordingSink>,
    enabled: SignalReader<bool>,
    event_bus: Option<Arc<EventBus>>,
    current: Option<String>,
    frames_written: u64,
    /// Set after a start failure; cleared when the episode ends
    blocked: bool,
    completed: Vec<RecordingSummary>,
}

impl RecordingController {
    pub fn new(sink: Box<dyn RecordingSink>, enabled: SignalReader<bool>) -> Self {
        Self {
            sink,
            enabled,
            event_bus: None,
            current: None,
            frames_written: 0,
            blocked: false,
            completed: Vec::new(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn is_recording(&self) -> bool {
        self.current.is_some()
    }

    pub fn completed(&self) -> &[RecordingSummary] {
        &self.completed
    }

    /// Apply the current motion state and record `frame` if a recording is open
    pub fn on_frame(&mut self, motion: &MotionState, frame: &RgbImage, timestamp: SystemTime) {
        let enabled = self.enabled.get();

        if !motion.is_active() {
            self.blocked = false;
        }

        if self.is_recording() && (!motion.is_active() || !enabled) {
            self.stop();
        }

        if !self.is_recording() && motion.is_active() && enabled && !self.blocked {
            self.start(timestamp);
        }

        if self.is_recording() {
            if let Err(e) = self.sink.write_frame(frame) {
                self.fail("write_frame", &e);
                self.stop();
                self.blocked = true;
            } else {
                self.frames_written += 1;
            }
        }
    }

    /// Close any open recording. Safe to call on every exit path.
    pub fn shutdown(&mut self) {
        if self.is_recording() {
            info!("Closing open recording on shutdown");
            self.stop();
        }
    }

    fn start(&mut self, timestamp: SystemTime) {
        let name = recording_name(timestamp);
        match self.sink.start(&name) {
            Ok(()) => {
                self.frames_written = 0;
                self.publish(TurretEvent::RecordingStarted {
                    name: name.clone(),
                    timestamp,
                });
                self.current = Some(name);
            }
            Err(e) => {
                warn!("Recording stays off for this episode");
                self.fail("start", &e);
                self.blocked = true;
            }
        }
    }

    fn stop(&mut self) {
        let Some(name) = self.current.take() else {
            return;
        };

        let frame_count = match self.sink.stop() {
            Ok(summary) => {
                let count = summary.frame_count;
                self.completed.push(summary);
                count
            }
            Err(e) => {
                self.fail("stop", &e);
                self.frames_written
            }
        };

        self.publish(TurretEvent::RecordingStopped {
            name,
            frame_count,
            timestamp: SystemTime::now(),
        });
    }

    fn fail(&self, operation: &str, e: &RecordingError) {
        error!("Recording {} failed: {}", operation, e);
        self.publish(TurretEvent::SystemError {
            component: "recording".to_string(),
            error: e.to_string(),
        });
    }

    fn publish(&self, event: TurretEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.publish(event);
        }
    }
}

/// `<YYYYmmdd_HHMMSS>_motion` in local time
pub fn recording_name(timestamp: SystemTime) -> String {
    let local: DateTime<Local> = timestamp.into();
    format!("{}_motion", local.format("%Y%m%d_%H%M%S"))
}
