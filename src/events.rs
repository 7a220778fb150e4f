use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the turret system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TurretEvent {
    /// Debounced motion went from idle to active
    MotionStarted {
        area: f64,
        region_count: usize,
        timestamp: SystemTime,
    },
    /// Debounced motion hold expired
    MotionStopped { timestamp: SystemTime },
    /// The actuator began a rotation leg
    RotationStarted { leg: u64, timestamp: SystemTime },
    /// The actuator reported the leg complete; settling begins
    RotationFinished { leg: u64, timestamp: SystemTime },
    /// A leg never reported completion and was forced into settling
    RotationStalled {
        leg: u64,
        elapsed_ms: u64,
        timestamp: SystemTime,
    },
    /// Settle window elapsed; motion detection is live again
    SettleCompleted { timestamp: SystemTime },
    /// The coordinator asked the actuator to hold before its next leg
    PauseRequested { timestamp: SystemTime },
    /// The coordinator released its hold on the actuator
    PauseCleared { timestamp: SystemTime },
    /// A recording was opened
    RecordingStarted { name: String, timestamp: SystemTime },
    /// A recording was closed
    RecordingStopped {
        name: String,
        frame_count: u64,
        timestamp: SystemTime,
    },
    /// The user flipped the recording enable flag
    RecordingToggled { enabled: bool, timestamp: SystemTime },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl TurretEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            TurretEvent::MotionStarted { timestamp, .. }
            | TurretEvent::MotionStopped { timestamp }
            | TurretEvent::RotationStarted { timestamp, .. }
            | TurretEvent::RotationFinished { timestamp, .. }
            | TurretEvent::RotationStalled { timestamp, .. }
            | TurretEvent::SettleCompleted { timestamp }
            | TurretEvent::PauseRequested { timestamp }
            | TurretEvent::PauseCleared { timestamp }
            | TurretEvent::RecordingStarted { timestamp, .. }
            | TurretEvent::RecordingStopped { timestamp, .. }
            | TurretEvent::RecordingToggled { timestamp, .. }
            | TurretEvent::ShutdownRequested { timestamp, .. } => *timestamp,
            TurretEvent::SystemError { .. } => SystemTime::now(),
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            TurretEvent::MotionStarted {
                area, region_count, ..
            } => format!(
                "Motion started: {} region(s), largest area {:.2}",
                region_count, area
            ),
            TurretEvent::MotionStopped { .. } => "Motion stopped".to_string(),
            TurretEvent::RotationStarted { leg, .. } => format!("Rotation leg {} started", leg),
            TurretEvent::RotationFinished { leg, .. } => {
                format!("Rotation leg {} finished", leg)
            }
            TurretEvent::RotationStalled {
                leg, elapsed_ms, ..
            } => format!(
                "Rotation leg {} stalled after {} ms, forcing settle",
                leg, elapsed_ms
            ),
            TurretEvent::SettleCompleted { .. } => "Settle window elapsed".to_string(),
            TurretEvent::PauseRequested { .. } => "Rotation pause requested".to_string(),
            TurretEvent::PauseCleared { .. } => "Rotation pause cleared".to_string(),
            TurretEvent::RecordingStarted { name, .. } => format!("Recording started: {}", name),
            TurretEvent::RecordingStopped {
                name, frame_count, ..
            } => format!("Recording stopped: {} ({} frames)", name, frame_count),
            TurretEvent::RecordingToggled { enabled, .. } => format!(
                "Recording {}",
                if *enabled { "enabled" } else { "disabled" }
            ),
            TurretEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            TurretEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            TurretEvent::MotionStarted { .. } => "motion_started",
            TurretEvent::MotionStopped { .. } => "motion_stopped",
            TurretEvent::RotationStarted { .. } => "rotation_started",
            TurretEvent::RotationFinished { .. } => "rotation_finished",
            TurretEvent::RotationStalled { .. } => "rotation_stalled",
            TurretEvent::SettleCompleted { .. } => "settle_completed",
            TurretEvent::PauseRequested { .. } => "pause_requested",
            TurretEvent::PauseCleared { .. } => "pause_cleared",
            TurretEvent::RecordingStarted { .. } => "recording_started",
            TurretEvent::RecordingStopped { .. } => "recording_stopped",
            TurretEvent::RecordingToggled { .. } => "recording_toggled",
            TurretEvent::SystemError { .. } => "system_error",
            TurretEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<TurretEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<TurretEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers reached; zero subscribers is not an error.
    pub fn publish(&self, event: TurretEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            TurretEvent::MotionStarted { .. }
            | TurretEvent::MotionStopped { .. }
            | TurretEvent::RecordingStarted { .. }
            | TurretEvent::RecordingStopped { .. }
            | TurretEvent::RecordingToggled { .. } => {
                info!("{}", event.description());
            }
            TurretEvent::RotationStalled { .. } => {
                warn!("{}", event.description());
            }
            TurretEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            TurretEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        if self.sender.receiver_count() == 0 {
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept events from specific components (for SystemError events)
    Components(Vec<String>),
    /// Custom filter function
    Custom(fn(&TurretEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &TurretEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Components(components) => {
                if let TurretEvent::SystemError { component, .. } = event {
                    components.contains(component)
                } else {
                    false
                }
            }
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<TurretEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<TurretEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event. Lagging is logged and skipped.
    pub async fn recv(&mut self) -> Result<TurretEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<TurretEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

/// Event counters kept by the orchestrator's event monitor
#[derive(Debug, Default, Clone)]
pub struct EventMetrics {
    pub total_events: u64,
    pub events_by_type: std::collections::HashMap<&'static str, u64>,
    pub errors: u64,
    pub last_event_time: Option<SystemTime>,
}

impl EventMetrics {
    /// Record an event
    pub fn record_event(&mut self, event: &TurretEvent) {
        self.total_events += 1;
        *self.events_by_type.entry(event.event_type()).or_insert(0) += 1;
        if matches!(event, TurretEvent::SystemError { .. }) {
            self.errors += 1;
        }
        self.last_event_time = Some(event.timestamp());
    }

    pub fn count(&self, event_type: &str) -> u64 {
        self.events_by_type.get(event_type).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let event = TurretEvent::MotionStarted {
            area: 1500.0,
            region_count: 1,
            timestamp: SystemTime::now(),
        };

        let subscriber_count = event_bus.publish(event).unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            TurretEvent::MotionStarted { area, .. } => assert_eq!(area, 1500.0),
            other => panic!("Unexpected event type: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_not_an_error() {
        let event_bus = EventBus::new(10);
        let reached = event_bus
            .publish(TurretEvent::SettleCompleted {
                timestamp: SystemTime::now(),
            })
            .unwrap();
        assert_eq!(reached, 0);
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let filter = EventFilter::EventTypes(vec!["rotation_stalled"]);
        let mut receiver = EventReceiver::new(event_bus.subscribe(), filter, "test".to_string());

        event_bus
            .publish(TurretEvent::RotationStarted {
                leg: 1,
                timestamp: SystemTime::now(),
            })
            .unwrap();
        event_bus
            .publish(TurretEvent::RotationStalled {
                leg: 1,
                elapsed_ms: 5000,
                timestamp: SystemTime::now(),
            })
            .unwrap();

        let received = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        match received {
            TurretEvent::RotationStalled { leg, elapsed_ms, .. } => {
                assert_eq!(leg, 1);
                assert_eq!(elapsed_ms, 5000);
            }
            other => panic!("Unexpected event type: {:?}", other),
        }
        assert!(receiver.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_component_filter() {
        let filter = EventFilter::Components(vec!["recording".to_string()]);
        assert!(filter.matches(&TurretEvent::SystemError {
            component: "recording".to_string(),
            error: "disk full".to_string(),
        }));
        assert!(!filter.matches(&TurretEvent::PauseCleared {
            timestamp: SystemTime::now(),
        }));
    }

    #[test]
    fn test_event_properties_and_metrics() {
        let event = TurretEvent::RecordingStopped {
            name: "20260101_120000_motion".to_string(),
            frame_count: 42,
            timestamp: SystemTime::now(),
        };
        assert_eq!(event.event_type(), "recording_stopped");
        assert!(event.description().contains("42 frames"));

        let mut metrics = EventMetrics::default();
        metrics.record_event(&event);
        metrics.record_event(&TurretEvent::SystemError {
            component: "sensing".to_string(),
            error: "oops".to_string(),
        });
        assert_eq!(metrics.total_events, 2);
        assert_eq!(metrics.errors, 1);
        assert_eq!(metrics.count("recording_stopped"), 1);
    }
}
