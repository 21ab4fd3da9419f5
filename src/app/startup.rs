use super::types::{CAMERA, KEYBOARD, LOOKUP, PERMISSION_DENIED_MESSAGE, PIPELINE, PRESENTER};
use super::{ComponentState, ScannerOrchestrator};
use crate::error::{CameraError, Result, ScannerError};
use crate::events::ScanEvent;
use crate::state::ScanState;
use std::time::SystemTime;
use tracing::{error, info, warn};

/// Text shown when the frame source cannot be brought up
pub(super) fn camera_error_message(error: &CameraError) -> String {
    match error {
        CameraError::Initialization { .. } => error.to_string(),
        CameraError::Configuration { details } => {
            format!("Camera initialization failed: {}", details)
        }
        other => format!("Camera initialization failed: {}", other),
    }
}

impl ScannerOrchestrator {
    /// Register all components as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing scanner components");

        let mut states = self.component_states.lock().await;
        states.insert(CAMERA.to_string(), ComponentState::Stopped);
        states.insert(PIPELINE.to_string(), ComponentState::Stopped);
        states.insert(LOOKUP.to_string(), ComponentState::Stopped);

        if self.presenter.is_some() {
            states.insert(PRESENTER.to_string(), ComponentState::Stopped);
        }

        // Only register keyboard component if enabled
        if self.keyboard_enabled {
            states.insert(KEYBOARD.to_string(), ComponentState::Stopped);
        }

        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Open the scan screen: sinks first, then permission, then the camera
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting scanner");

        // The presenter shows "Initializing" and any error that follows
        if let Some(presenter) = &self.presenter {
            self.set_component_state(PRESENTER, ComponentState::Starting).await;
            let task = presenter.start(self.store.subscribe());
            self.background_tasks.push(task);
            self.set_component_state(PRESENTER, ComponentState::Running).await;
        }

        self.set_component_state(CAMERA, ComponentState::Starting).await;

        if !self.permission.request().await {
            error!("Camera permission denied");
            self.state.set_state(ScanState::Error(PERMISSION_DENIED_MESSAGE.to_string()));
            self.state.flush().await;
            self.set_component_state(CAMERA, ComponentState::Failed).await;
            return Err(ScannerError::permission_denied(PERMISSION_DENIED_MESSAGE));
        }

        self.set_component_state(PIPELINE, ComponentState::Starting).await;

        if let Err(e) = self.source.subscribe(self.pipeline.frame_handler()).await {
            error!("Failed to start frame source: {}", e);
            self.set_component_state(CAMERA, ComponentState::Failed).await;
            self.set_component_state(PIPELINE, ComponentState::Stopped).await;

            if self.config.scanner.surface_camera_errors {
                self.state.set_state(ScanState::Error(camera_error_message(&e)));
                self.state.flush().await;
            } else {
                warn!("Camera errors are not surfaced, scan screen stays initializing");
            }

            let _ = self.event_bus.publish(ScanEvent::CameraStatusChanged {
                connected: false,
                timestamp: SystemTime::now(),
            });
            return Err(e.into());
        }

        self.state.set_state(ScanState::Ready);
        self.state.flush().await;
        self.set_component_state(CAMERA, ComponentState::Running).await;
        self.set_component_state(PIPELINE, ComponentState::Running).await;
        let _ = self.event_bus.publish(ScanEvent::CameraStatusChanged {
            connected: true,
            timestamp: SystemTime::now(),
        });
        info!("Frame source subscribed, scanning");

        self.set_component_state(LOOKUP, ComponentState::Starting).await;
        let listener = self
            .lookups
            .spawn_request_listener(self.store.subscribe(), self.cancellation_token.clone());
        self.background_tasks.push(listener);
        if self.config.metadata.auto_lookup {
            let auto = self
                .lookups
                .spawn_auto_lookup(self.store.subscribe(), self.cancellation_token.clone());
            self.background_tasks.push(auto);
            info!("Automatic metadata lookup enabled");
        }
        self.set_component_state(LOOKUP, ComponentState::Running).await;

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state(KEYBOARD, ComponentState::Starting).await;

                keyboard_handler.start().await.map_err(|e| {
                    error!("Failed to start keyboard handler: {}", e);
                    e
                })?;

                self.set_component_state(KEYBOARD, ComponentState::Running).await;
            }
        }

        info!("Scanner started successfully");
        Ok(())
    }
}
