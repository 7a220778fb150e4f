use super::{ComponentState, TurretOrchestrator};
use crate::error::{Result, TurretError};
use crate::events::{EventFilter, EventMetrics, EventReceiver, TurretEvent};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info};

impl TurretOrchestrator {
    /// Register all system components
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing turret system components");

        let mut states = self.component_states.lock().await;
        states.insert("event_monitor".to_string(), ComponentState::Stopped);
        states.insert("sensing".to_string(), ComponentState::Stopped);

        if self.config.turret.enabled {
            states.insert("actuator".to_string(), ComponentState::Stopped);
        }

        // Only register keyboard component if enabled
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }

        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start both control loops
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting turret system");

        self.start_event_monitor().await;

        // Sensing first so the first leg finds a reference frame in place
        let sensing = self
            .sensing
            .take()
            .ok_or_else(|| TurretError::system("Sensing loop already started"))?;
        self.set_component_state("sensing", ComponentState::Starting)
            .await;

        let cancel = self.cancellation_token.clone();
        let event_bus = Arc::clone(&self.event_bus);
        self.sensing_task = Some(tokio::spawn(async move {
            let stats = sensing.run(cancel.clone()).await;
            if !cancel.is_cancelled() {
                // The frame source ran dry; nothing left to watch
                let _ = event_bus.publish(TurretEvent::ShutdownRequested {
                    timestamp: SystemTime::now(),
                    reason: "Frame source closed".to_string(),
                });
            }
            stats
        }));
        self.set_component_state("sensing", ComponentState::Running)
            .await;
        info!("Sensing loop started");

        if self.config.turret.enabled {
            let actuator = self
                .actuator
                .take()
                .ok_or_else(|| TurretError::system("Rotation actuator already started"))?;
            self.set_component_state("actuator", ComponentState::Starting)
                .await;
            self.actuator_task = Some(tokio::spawn(actuator.run(self.cancellation_token.clone())));
            self.set_component_state("actuator", ComponentState::Running)
                .await;
            info!("Rotation actuator started");
        } else {
            info!("Turret rotation disabled; platform stays stationary");
        }

        // Start keyboard input handler (only if enabled)
        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Starting)
                    .await;

                keyboard_handler.start().await.map_err(|e| {
                    error!("Failed to start keyboard handler: {}", e);
                    e
                })?;

                self.set_component_state("keyboard", ComponentState::Running)
                    .await;
                info!("Keyboard input handler started - press 'r' to toggle recording, 'q' to quit");
            }
        }

        info!("Turret system started successfully");
        Ok(())
    }

    async fn start_event_monitor(&mut self) {
        self.set_component_state("event_monitor", ComponentState::Starting)
            .await;

        let mut receiver = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::All,
            "event_monitor".to_string(),
        );
        let cancel = self.cancellation_token.clone();

        self.monitor_task = Some(tokio::spawn(async move {
            let mut metrics = EventMetrics::default();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = receiver.recv() => match event {
                        Ok(event) => metrics.record_event(&event),
                        Err(_) => break,
                    },
                }
            }
            // Pick up whatever was published during shutdown
            while let Ok(Some(event)) = receiver.try_recv() {
                metrics.record_event(&event);
            }
            metrics
        }));

        self.set_component_state("event_monitor", ComponentState::Running)
            .await;
    }
}
