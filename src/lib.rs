pub mod analyzer;
pub mod app;
pub mod config;
pub mod debounce;
pub mod error;
pub mod events;
pub mod frame;
pub mod keyboard_input;
pub mod recording;
pub mod sensing;
pub mod signal;
pub mod source;
pub mod turret;

pub use analyzer::{detect_motion, BoundingBox, FramePreprocessor, MotionDetector, MotionRegion};
pub use app::{ComponentState, ShutdownReason, TurretOrchestrator};
pub use config::TurretConfig;
pub use debounce::{MotionDebouncer, MotionEdge, MotionPhase, MotionState};
pub use error::{Result, TurretError};
pub use events::{EventBus, EventFilter, EventMetrics, EventReceiver, TurretEvent};
pub use frame::{Frame, PreparedFrame, RawFrame};
pub use keyboard_input::KeyboardInputHandler;
pub use recording::{JpegSequenceSink, RecordingController, RecordingSink, RecordingSummary};
pub use sensing::{FrameReport, SensingLoop, SensingStats};
pub use source::{DirectorySource, FrameSource, SyntheticFrameSource};
pub use turret::{
    actuator_channel, ActuatorLink, Direction, RotationActuator, RotationState, SimulatedDriver,
    StepperDriver, TurretCoordinator,
};
