use super::types::{ComponentState, ShutdownReason};
use crate::config::TurretConfig;
use crate::debounce::MotionState;
use crate::error::{ActuatorError, Result};
use crate::events::{EventBus, EventFilter, EventMetrics, EventReceiver};
use crate::keyboard_input::KeyboardInputHandler;
use crate::recording::{JpegSequenceSink, RecordingController};
use crate::sensing::{SensingLoop, SensingStats};
use crate::signal::{self, SignalReader};
use crate::source::{self, FrameSource};
use crate::turret::{RotationActuator, RotationState, SimulatedDriver, TurretCoordinator};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main application coordinator that owns both control loops
pub struct TurretOrchestrator {
    pub(super) config: TurretConfig,
    pub(super) event_bus: Arc<EventBus>,

    // Components, taken when their tasks are spawned
    pub(super) sensing: Option<SensingLoop>,
    pub(super) actuator: Option<RotationActuator<SimulatedDriver>>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    // Running tasks
    pub(super) sensing_task: Option<JoinHandle<SensingStats>>,
    pub(super) actuator_task: Option<JoinHandle<std::result::Result<(), ActuatorError>>>,
    pub(super) monitor_task: Option<JoinHandle<EventMetrics>>,

    // Observers
    pub(super) motion_state: SignalReader<MotionState>,
    pub(super) rotation_state: SignalReader<RotationState>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_events: Option<EventReceiver>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl TurretOrchestrator {
    /// Create a new orchestrator reading frames from the configured source
    pub fn new(config: TurretConfig) -> Result<Self> {
        config.validate()?;
        let source = source::from_config(&config.camera)?;
        Self::with_source(config, source)
    }

    /// Create a new orchestrator around an explicit frame source.
    ///
    /// The configuration is validated first; durations and rates are used
    /// unchecked from here on.
    pub fn with_source(config: TurretConfig, source: Box<dyn FrameSource>) -> Result<Self> {
        config.validate()?;

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        // Subscribed up front so a shutdown request published before run()
        // is still seen
        let shutdown_events = EventReceiver::new(
            event_bus.subscribe(),
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "shutdown_listener".to_string(),
        );

        let (recording_writer, recording_reader) = signal::channel(config.recording.enabled);
        let recorder = RecordingController::new(
            Box::new(JpegSequenceSink::new(&config.recording)),
            recording_reader,
        )
        .with_event_bus(Arc::clone(&event_bus));

        let driver = SimulatedDriver::new(config.turret.degrees_per_second);
        let (actuator, link) = RotationActuator::new(config.turret.clone(), driver);
        let actuator = actuator.with_event_bus(Arc::clone(&event_bus));
        let coordinator = TurretCoordinator::new(&config.turret, link);

        let sensing = SensingLoop::new(
            &config,
            source,
            coordinator,
            recorder,
            Arc::clone(&event_bus),
        );
        let motion_state = sensing.subscribe_motion();
        let rotation_state = sensing.subscribe_rotation();

        // The handler owns the recording flag writer even when keys are off
        let keyboard_handler = Some(KeyboardInputHandler::new(
            Arc::clone(&event_bus),
            recording_writer,
        ));

        Ok(Self {
            config,
            event_bus,
            sensing: Some(sensing),
            actuator: Some(actuator),
            keyboard_handler,
            keyboard_enabled: false,
            sensing_task: None,
            actuator_task: None,
            monitor_task: None,
            motion_state,
            rotation_state,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_events: Some(shutdown_events),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Enable or disable the keyboard input handler
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn config(&self) -> &TurretConfig {
        &self.config
    }

    pub(super) fn log_summary(&self, stats: Option<&SensingStats>, metrics: Option<&EventMetrics>) {
        if let Some(stats) = stats {
            info!(
                "Sensing summary: {} frames, {} motion episodes, {} forced rebaselines",
                stats.frames_processed, stats.motion_episodes, stats.forced_rebaselines
            );
        }
        if let Some(metrics) = metrics {
            info!(
                "Event summary: {} events, {} rotations, {} stalls, {} errors",
                metrics.total_events,
                metrics.count("rotation_started"),
                metrics.count("rotation_stalled"),
                metrics.errors
            );
        }
    }
}
