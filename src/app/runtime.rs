use super::{ShutdownReason, TurretOrchestrator};
use crate::error::{Result, TurretError};
use crate::events::{EventReceiver, TurretEvent};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

type SharedShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

impl TurretOrchestrator {
    /// Run until a signal or a shutdown request arrives, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Turret system is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| TurretError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| TurretError::system("Shutdown receiver already taken"))?;

        let shutdown_events = self
            .shutdown_events
            .take()
            .ok_or_else(|| TurretError::system("Shutdown listener already taken"))?;

        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));
        self.setup_signal_handlers(Arc::clone(&shutdown_sender));
        self.setup_shutdown_listener(shutdown_events, shutdown_sender);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| TurretError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Turret system shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self, shutdown_sender: SharedShutdownSender) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    send_shutdown(
                        &shutdown_sender_sigterm,
                        ShutdownReason::Signal("SIGTERM".to_string()),
                    )
                    .await;
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_shutdown(
                    &shutdown_sender,
                    ShutdownReason::Signal("SIGINT".to_string()),
                )
                .await;
            }
        });
    }

    /// Turn `ShutdownRequested` events (keyboard, exhausted source) into a
    /// shutdown
    fn setup_shutdown_listener(&self, mut events: EventReceiver, shutdown_sender: SharedShutdownSender) {
        let cancel: CancellationToken = self.cancellation_token.clone();
        tokio::spawn(async move {
            let event = tokio::select! {
                _ = cancel.cancelled() => return,
                event = events.recv() => event,
            };
            if let Ok(TurretEvent::ShutdownRequested { reason, .. }) = event {
                send_shutdown(&shutdown_sender, ShutdownReason::UserRequest(reason)).await;
            }
        });
    }
}

async fn send_shutdown(sender: &SharedShutdownSender, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
