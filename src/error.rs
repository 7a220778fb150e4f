use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TurretError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    #[error("Motion detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Failures of the frame source collaborator
#[derive(Error, Debug)]
pub enum SourceError {
    /// No frame this cycle; the sensing loop skips and retries
    #[error("Frame unavailable: {details}")]
    Unavailable { details: String },

    #[error("Frame source device error: {details}")]
    Device { details: String },

    #[error("Frame source closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error(
        "Reference frame is {}x{} but current frame is {}x{}",
        reference.0, reference.1, current.0, current.1
    )]
    DimensionMismatch {
        reference: (u32, u32),
        current: (u32, u32),
    },

    #[error("Frame preprocessing failed: {details}")]
    Preprocess { details: String },
}

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("Stepper driver '{driver}' failed: {details}")]
    Driver { driver: String, details: String },

    #[error("Rotation leg {leg} reported no completion after {elapsed:?}")]
    Stalled { leg: u64, elapsed: Duration },
}

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Failed to create recording directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode frame {frame} of {name}: {details}")]
    Encode {
        name: String,
        frame: u64,
        details: String,
    },

    #[error("Failed to write recording metadata for {name}: {details}")]
    Metadata { name: String, details: String },

    #[error("Recording sink is not open")]
    NotStarted,
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

impl TurretError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether the sensing/actuation loops may continue after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            TurretError::Source(e) => !matches!(e, SourceError::Closed),
            TurretError::Detector(_) => true,
            TurretError::Actuator(_) => true,
            TurretError::Recording(_) => true,
            TurretError::EventBus(_) => true,
            TurretError::Component { .. } => true,
            TurretError::Config(_)
            | TurretError::Io(_)
            | TurretError::Serialization(_)
            | TurretError::System { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TurretError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy_recoverability() {
        let transient: TurretError = SourceError::Unavailable {
            details: "camera busy".to_string(),
        }
        .into();
        assert!(transient.is_recoverable());

        let closed: TurretError = SourceError::Closed.into();
        assert!(!closed.is_recoverable());

        let mismatch: TurretError = DetectorError::DimensionMismatch {
            reference: (640, 480),
            current: (320, 240),
        }
        .into();
        assert!(mismatch.is_recoverable());
        assert!(mismatch.to_string().contains("640x480"));

        let stall: TurretError = ActuatorError::Stalled {
            leg: 3,
            elapsed: Duration::from_secs(5),
        }
        .into();
        assert!(stall.is_recoverable());

        let recording: TurretError = RecordingError::NotStarted.into();
        assert!(recording.is_recoverable());

        assert!(!TurretError::system("boom").is_recoverable());
    }
}
