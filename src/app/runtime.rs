use super::{ScannerOrchestrator, ShutdownReason};
use crate::error::{Result, ScannerError};
use crate::events::{EventFilter, EventReceiver, ScanEvent};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

type SharedSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

async fn send_shutdown(sender: &SharedSender, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}

impl ScannerOrchestrator {
    /// Run until a signal or a quit request arrives, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Scanner is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| ScannerError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| ScannerError::system("Shutdown receiver already taken"))?;

        self.setup_shutdown_triggers(shutdown_sender);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| ScannerError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Scanner shutdown complete");
        Ok(exit_code)
    }

    fn setup_shutdown_triggers(&mut self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender: SharedSender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM - Unix only
        #[cfg(unix)]
        {
            let sender = Arc::clone(&shutdown_sender);
            let task = tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    send_shutdown(&sender, ShutdownReason::Signal("SIGTERM".to_string())).await;
                }
            });
            self.background_tasks.push(task);
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let sender = Arc::clone(&shutdown_sender);
        let task = tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_shutdown(&sender, ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        });
        self.background_tasks.push(task);

        // Quit requests from the keyboard or other components
        let sender = Arc::clone(&shutdown_sender);
        let token = self.cancellation_token.clone();
        let mut events = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "shutdown".to_string(),
        );
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                event = events.recv() => {
                    if let Ok(ScanEvent::ShutdownRequested { reason, .. }) = event {
                        info!("Shutdown requested: {}", reason);
                        send_shutdown(&sender, ShutdownReason::UserRequest).await;
                    }
                }
            }
        });
        self.background_tasks.push(task);
    }
}
