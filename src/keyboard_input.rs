use crate::error::Result;
use crate::events::{EventBus, TurretEvent};
use crate::signal::SignalWriter;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    ToggleRecording,
    Quit,
    Ignore,
}

impl KeyAction {
    pub fn from_key(code: KeyCode) -> Self {
        match code {
            KeyCode::Char('r') | KeyCode::Char('R') => KeyAction::ToggleRecording,
            KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,
            _ => KeyAction::Ignore,
        }
    }
}

/// Interactive operator controls on the controlling terminal
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    recording_enabled: Arc<SignalWriter<bool>>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(event_bus: Arc<EventBus>, recording_enabled: SignalWriter<bool>) -> Self {
        Self {
            event_bus,
            recording_enabled: Arc::new(recording_enabled),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Carry out `action`. Returns false once the handler should stop listening.
    pub fn apply(&self, action: KeyAction) -> bool {
        apply_action(action, &self.event_bus, &self.recording_enabled)
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input handler - press 'r' to toggle recording, 'q' to quit");

        let event_bus = Arc::clone(&self.event_bus);
        let recording_enabled = Arc::clone(&self.recording_enabled);
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard handler active");

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            // Only presses, not releases
                            if key_event.kind != KeyEventKind::Press {
                                continue;
                            }
                            let action = KeyAction::from_key(key_event.code);
                            if action == KeyAction::Ignore {
                                debug!("Key pressed: {:?}", key_event.code);
                            }
                            if !apply_action(action, &event_bus, &recording_enabled) {
                                break;
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }

            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the task a moment to clean up and disable raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;

        let _ = disable_raw_mode();

        Ok(())
    }
}

fn apply_action(action: KeyAction, event_bus: &EventBus, recording_enabled: &SignalWriter<bool>) -> bool {
    match action {
        KeyAction::ToggleRecording => {
            let enabled = recording_enabled.update(|enabled| {
                *enabled = !*enabled;
                *enabled
            });
            info!("Recording {}", if enabled { "enabled" } else { "disabled" });

            if let Err(e) = event_bus.publish(TurretEvent::RecordingToggled {
                enabled,
                timestamp: SystemTime::now(),
            }) {
                warn!("Failed to publish recording toggle: {}", e);
            }
            true
        }
        KeyAction::Quit => {
            info!("Quit key pressed - requesting shutdown");
            if let Err(e) = event_bus.publish(TurretEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "User requested via keyboard".to_string(),
            }) {
                warn!("Failed to publish shutdown event: {}", e);
            }
            false
        }
        KeyAction::Ignore => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal;

    #[test]
    fn test_key_mapping() {
        assert_eq!(KeyAction::from_key(KeyCode::Char('r')), KeyAction::ToggleRecording);
        assert_eq!(KeyAction::from_key(KeyCode::Char('q')), KeyAction::Quit);
        assert_eq!(KeyAction::from_key(KeyCode::Esc), KeyAction::Quit);
        assert_eq!(KeyAction::from_key(KeyCode::Char(' ')), KeyAction::Ignore);
    }

    #[tokio::test]
    async fn test_toggle_flips_recording_flag() {
        let event_bus = Arc::new(EventBus::new(16));
        let mut events = event_bus.subscribe();
        let (writer, reader) = signal::channel(false);
        let handler = KeyboardInputHandler::new(Arc::clone(&event_bus), writer);

        assert!(handler.apply(KeyAction::ToggleRecording));
        assert!(reader.get());
        assert!(matches!(
            events.try_recv(),
            Ok(TurretEvent::RecordingToggled { enabled: true, .. })
        ));

        assert!(handler.apply(KeyAction::ToggleRecording));
        assert!(!reader.get());
    }

    #[tokio::test]
    async fn test_quit_requests_shutdown() {
        let event_bus = Arc::new(EventBus::new(16));
        let mut events = event_bus.subscribe();
        let (writer, _reader) = signal::channel(false);
        let handler = KeyboardInputHandler::new(Arc::clone(&event_bus), writer);

        assert!(!handler.apply(KeyAction::Quit));
        assert!(matches!(
            events.try_recv(),
            Ok(TurretEvent::ShutdownRequested { .. })
        ));
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let event_bus = Arc::new(EventBus::new(100));
        let (writer, _reader) = signal::channel(false);
        let handler = KeyboardInputHandler::new(event_bus, writer);

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}
