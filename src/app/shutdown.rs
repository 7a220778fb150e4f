use super::{ComponentState, TurretOrchestrator};
use crate::error::{Result, TurretError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info};

const SENSING_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const ACTUATOR_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const MONITOR_STOP_TIMEOUT: Duration = Duration::from_secs(2);
const KEYBOARD_STOP_TIMEOUT: Duration = Duration::from_secs(2);

impl TurretOrchestrator {
    /// Cancel both loops, wait for them and report an exit code
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if self.keyboard_enabled {
            if let Err(e) = self.stop_keyboard().await {
                error!("Error stopping keyboard: {}", e);
                exit_code = 1;
            }
        }

        // The sensing loop closes the recording sink before its task ends
        let sensing_task = self.sensing_task.take();
        let stats = match self
            .join_component("sensing", sensing_task, SENSING_STOP_TIMEOUT)
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                error!("Error stopping sensing: {}", e);
                exit_code = 1;
                None
            }
        };

        let actuator_task = self.actuator_task.take();
        match self
            .join_component("actuator", actuator_task, ACTUATOR_STOP_TIMEOUT)
            .await
        {
            Ok(Some(Err(e))) => {
                error!("Actuator reported an error while stopping: {}", e);
                self.set_component_state("actuator", ComponentState::Failed)
                    .await;
                exit_code = 1;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error stopping actuator: {}", e);
                exit_code = 1;
            }
        }

        let monitor_task = self.monitor_task.take();
        let metrics = match self
            .join_component("event_monitor", monitor_task, MONITOR_STOP_TIMEOUT)
            .await
        {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("Error stopping event monitor: {}", e);
                exit_code = 1;
                None
            }
        };

        self.log_summary(stats.as_ref(), metrics.as_ref());

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Wait for a spawned component task to finish within `limit`
    async fn join_component<T>(
        &self,
        component: &str,
        handle: Option<JoinHandle<T>>,
        limit: Duration,
    ) -> Result<Option<T>> {
        let Some(handle) = handle else {
            self.set_component_state(component, ComponentState::Stopped)
                .await;
            return Ok(None);
        };

        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(limit, handle).await {
            Ok(Ok(output)) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(Some(output))
            }
            Ok(Err(join_error)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(TurretError::component(
                    component.to_string(),
                    format!("task failed: {}", join_error),
                ))
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component stop timeout", component);
                Err(TurretError::system(format!("{} component stop timeout", component)))
            }
        }
    }

    async fn stop_keyboard(&self) -> Result<()> {
        let Some(keyboard_handler) = &self.keyboard_handler else {
            return Ok(());
        };

        self.set_component_state("keyboard", ComponentState::Stopping)
            .await;
        match timeout(KEYBOARD_STOP_TIMEOUT, keyboard_handler.stop()).await {
            Ok(Ok(())) => {
                self.set_component_state("keyboard", ComponentState::Stopped)
                    .await;
                info!("keyboard component stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state("keyboard", ComponentState::Failed)
                    .await;
                Err(e)
            }
            Err(_) => {
                self.set_component_state("keyboard", ComponentState::Failed)
                    .await;
                Err(TurretError::system("keyboard component stop timeout"))
            }
        }
    }
}
