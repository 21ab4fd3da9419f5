use super::types::{CAMERA, KEYBOARD, LOOKUP, PIPELINE, PRESENTER};
use super::{ComponentState, ScannerOrchestrator};
use crate::error::{Result, ScannerError};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const SOURCE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl ScannerOrchestrator {
    /// Close the scan screen and report an exit code
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Cancel all background tasks
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if self.keyboard_enabled {
            if let Err(e) = self.stop_keyboard().await {
                error!("Error stopping keyboard: {}", e);
                exit_code = 1;
            }
        }

        if let Err(e) = self.stop_camera().await {
            error!("Error stopping camera: {}", e);
            exit_code = 1;
        }

        if let Err(e) = self.stop_pipeline().await {
            error!("Error stopping pipeline: {}", e);
            exit_code = 1;
        }

        self.set_component_state(LOOKUP, ComponentState::Stopped).await;

        // Let the presenter show whatever the drained pipeline published
        self.state.flush().await;
        if let Some(presenter) = &self.presenter {
            presenter.stop();
            self.set_component_state(PRESENTER, ComponentState::Stopped).await;
        }

        for task in self.background_tasks.drain(..) {
            task.abort();
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_keyboard(&self) -> Result<()> {
        let Some(keyboard_handler) = &self.keyboard_handler else {
            return Ok(());
        };

        self.set_component_state(KEYBOARD, ComponentState::Stopping).await;
        match keyboard_handler.stop().await {
            Ok(()) => {
                self.set_component_state(KEYBOARD, ComponentState::Stopped).await;
                Ok(())
            }
            Err(e) => {
                self.set_component_state(KEYBOARD, ComponentState::Failed).await;
                Err(e)
            }
        }
    }

    /// Stop frame delivery; frames already handed to the pipeline stay valid
    async fn stop_camera(&self) -> Result<()> {
        info!("Stopping {} component", CAMERA);
        self.set_component_state(CAMERA, ComponentState::Stopping).await;

        match timeout(SOURCE_STOP_TIMEOUT, self.source.unsubscribe()).await {
            Ok(Ok(())) => {
                self.set_component_state(CAMERA, ComponentState::Stopped).await;
                info!("{} component stopped", CAMERA);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(CAMERA, ComponentState::Failed).await;
                Err(e.into())
            }
            Err(_) => {
                self.set_component_state(CAMERA, ComponentState::Failed).await;
                error!("{} component stop timeout", CAMERA);
                Err(ScannerError::component(
                    CAMERA.to_string(),
                    "stop timeout".to_string(),
                ))
            }
        }
    }

    /// Wait for in-flight decodes so every outstanding frame gets released
    async fn stop_pipeline(&self) -> Result<()> {
        info!("Stopping {} component", PIPELINE);
        self.set_component_state(PIPELINE, ComponentState::Stopping).await;

        self.pipeline.stop();
        if self.pipeline.drain(self.config.system.shutdown_timeout()).await {
            self.set_component_state(PIPELINE, ComponentState::Stopped).await;
            info!("{} component stopped", PIPELINE);
            Ok(())
        } else {
            self.set_component_state(PIPELINE, ComponentState::Failed).await;
            Err(ScannerError::component(PIPELINE.to_string(), "drain timeout".to_string()))
        }
    }
}
