//! The frame-driven control loop: preprocess, detect, debounce, coordinate.

use crate::analyzer::{FramePreprocessor, MotionDetector, MotionRegion};
use crate::config::TurretConfig;
use crate::debounce::{MotionDebouncer, MotionEdge, MotionState};
use crate::error::SourceError;
use crate::events::{EventBus, TurretEvent};
use crate::frame::RawFrame;
use crate::recording::{annotate_regions, RecordingController};
use crate::signal::{self, SignalReader, SignalWriter};
use crate::source::FrameSource;
use crate::turret::{RotationState, TurretCoordinator};

use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters reported when the loop exits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SensingStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub source_failures: u64,
    pub motion_episodes: u64,
    pub forced_rebaselines: u64,
}

/// What happened to one frame
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_id: u64,
    pub regions: Vec<MotionRegion>,
    pub motion: MotionState,
    pub rotation: RotationState,
    pub edge: Option<MotionEdge>,
    pub rebaselined: bool,
    pub suppressed: bool,
    pub skipped: bool,
}

pub struct SensingLoop {
    source: Box<dyn FrameSource>,
    preprocessor: FramePreprocessor,
    detector: MotionDetector,
    debouncer: MotionDebouncer,
    coordinator: TurretCoordinator,
    recorder: RecordingController,
    annotate_regions: bool,
    motion_state: SignalWriter<MotionState>,
    event_bus: Arc<EventBus>,
    retry_interval: Duration,
    stats: SensingStats,
}

impl SensingLoop {
    pub fn new(
        config: &TurretConfig,
        source: Box<dyn FrameSource>,
        coordinator: TurretCoordinator,
        recorder: RecordingController,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (motion_state, _) = signal::channel(MotionState::IDLE);

        Self {
            source,
            preprocessor: FramePreprocessor::new(&config.camera, &config.detector),
            detector: MotionDetector::new(&config.detector),
            debouncer: MotionDebouncer::new(config.debounce.motion_hold_frames),
            coordinator,
            recorder,
            annotate_regions: config.recording.annotate_regions,
            motion_state,
            event_bus,
            retry_interval: config.system.frame_interval(),
            stats: SensingStats::default(),
        }
    }

    pub fn subscribe_motion(&self) -> SignalReader<MotionState> {
        self.motion_state.subscribe()
    }

    pub fn subscribe_rotation(&self) -> SignalReader<RotationState> {
        self.coordinator.subscribe_state()
    }

    pub fn stats(&self) -> &SensingStats {
        &self.stats
    }

    pub fn detector(&self) -> &MotionDetector {
        &self.detector
    }

    pub fn recorder(&self) -> &RecordingController {
        &self.recorder
    }

    /// Run one frame through the pipeline at time `now`
    pub fn process_frame(&mut self, raw: &RawFrame, now: Instant) -> FrameReport {
        let mut report = FrameReport {
            frame_id: raw.id,
            regions: Vec::new(),
            motion: self.debouncer.state(),
            rotation: self.coordinator.state(),
            edge: None,
            rebaselined: false,
            suppressed: false,
            skipped: false,
        };

        let prepared = match self.preprocessor.prepare(raw) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Skipping frame {}: {}", raw.id, e);
                self.stats.frames_skipped += 1;
                report.skipped = true;
                return report;
            }
        };
        let timestamp = prepared.timestamp();

        let sync = self.coordinator.sync(now);
        for transition in &sync.transitions {
            self.publish(transition.to_event());
        }
        report.suppressed = sync.suppress;

        if sync.reset_motion {
            if let Some(edge) = self.debouncer.reset() {
                self.on_edge(edge, &[], timestamp);
                report.edge = Some(edge);
            }
        }

        if sync.rebaseline {
            self.detector.rebaseline(&prepared.gray);
            self.stats.forced_rebaselines += 1;
            report.rebaselined = true;
        } else {
            match self.detector.analyze(&prepared.gray) {
                Ok(regions) => {
                    if let Some(edge) = self.debouncer.update(!regions.is_empty(), sync.suppress) {
                        self.on_edge(edge, &regions, timestamp);
                        report.edge = Some(edge);
                    }
                    report.regions = regions;
                }
                Err(e) => {
                    warn!("Frame {}: {}; rebaselining", raw.id, e);
                    self.detector.rebaseline(&prepared.gray);
                    self.stats.forced_rebaselines += 1;
                    self.stats.frames_skipped += 1;
                    report.rebaselined = true;
                    report.skipped = true;
                }
            }
        }

        let motion = self.debouncer.state();
        self.motion_state.set(motion);

        if let Some(transition) = self.coordinator.update_pause(&motion) {
            self.publish(transition.to_event());
        }

        let display = if self.annotate_regions && !report.regions.is_empty() {
            Cow::Owned(annotate_regions(&prepared.display, &report.regions))
        } else {
            Cow::Borrowed(prepared.display.as_ref())
        };
        self.recorder.on_frame(&motion, &display, timestamp);

        self.stats.frames_processed += 1;
        report.motion = motion;
        report.rotation = self.coordinator.state();
        report
    }

    /// Pull frames until cancelled or the source closes. The recording sink
    /// is closed before this returns.
    pub async fn run(mut self, cancel: CancellationToken) -> SensingStats {
        info!("Sensing loop started ({} source)", self.source.name());

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = self.source.next_frame() => frame,
            };

            match next {
                Ok(raw) => {
                    let report = self.process_frame(&raw, Instant::now());
                    debug!(
                        "Frame {}: {} region(s), motion {:?}, rotation {}",
                        report.frame_id,
                        report.regions.len(),
                        report.motion.phase,
                        report.rotation.name()
                    );
                }
                Err(SourceError::Closed) => {
                    info!("Frame source closed");
                    break;
                }
                Err(e) => {
                    self.stats.source_failures += 1;
                    warn!("Frame source failure: {}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_interval) => {}
                    }
                }
            }
        }

        self.recorder.shutdown();

        info!(
            "Sensing loop stopped: {} frames processed, {} skipped, {} source failures, {} motion episodes",
            self.stats.frames_processed,
            self.stats.frames_skipped,
            self.stats.source_failures,
            self.stats.motion_episodes
        );
        self.stats
    }

    fn on_edge(&mut self, edge: MotionEdge, regions: &[MotionRegion], timestamp: SystemTime) {
        let event = match edge {
            MotionEdge::Started => {
                self.stats.motion_episodes += 1;
                TurretEvent::MotionStarted {
                    area: regions.first().map(|r| r.area).unwrap_or_default(),
                    region_count: regions.len(),
                    timestamp,
                }
            }
            MotionEdge::Stopped => TurretEvent::MotionStopped { timestamp },
        };
        self.publish(event);
    }

    fn publish(&self, event: TurretEvent) {
        if let Err(e) = self.event_bus.publish(event) {
            warn!("Failed to publish event: {}", e);
        }
    }
}
