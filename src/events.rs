use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events exchanged between scanner components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// A frame produced a textual value
    CodeDecoded {
        value: String,
        frame_id: u64,
        timestamp: SystemTime,
    },
    /// A decode attempt failed; the pipeline keeps running
    DecodeFailed { frame_id: u64, error: String },
    /// Camera connection status changed
    CameraStatusChanged {
        connected: bool,
        timestamp: SystemTime,
    },
    /// Metadata lookup requested for the current decoded value
    LookupRequested { timestamp: SystemTime },
    /// A metadata lookup finished
    LookupCompleted {
        identifier: i64,
        success: bool,
        message: String,
    },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl ScanEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ScanEvent::CodeDecoded {
                value, frame_id, ..
            } => format!("Code '{}' decoded from frame {}", value, frame_id),
            ScanEvent::DecodeFailed { frame_id, error } => {
                format!("Decode of frame {} failed: {}", frame_id, error)
            }
            ScanEvent::CameraStatusChanged { connected, .. } => format!(
                "Camera {}",
                if *connected {
                    "connected"
                } else {
                    "disconnected"
                }
            ),
            ScanEvent::LookupRequested { .. } => "Metadata lookup requested".to_string(),
            ScanEvent::LookupCompleted {
                identifier,
                success,
                message,
            } => format!(
                "Lookup of {} {}: {}",
                identifier,
                if *success { "succeeded" } else { "failed" },
                message
            ),
            ScanEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::CodeDecoded { .. } => "code_decoded",
            ScanEvent::DecodeFailed { .. } => "decode_failed",
            ScanEvent::CameraStatusChanged { .. } => "camera_status_changed",
            ScanEvent::LookupRequested { .. } => "lookup_requested",
            ScanEvent::LookupCompleted { .. } => "lookup_completed",
            ScanEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ScanEvent) -> Result<usize, EventBusError> {
        debug!("Publishing event: {}", event.description());

        match &event {
            ScanEvent::CameraStatusChanged { connected, .. } => {
                if *connected {
                    info!("Camera connected");
                } else {
                    warn!("Camera disconnected");
                }
            }
            ScanEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {}
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

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &ScanEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<ScanEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<ScanEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event. Lagging is logged and skipped over.
    pub async fn recv(&mut self) -> Result<ScanEvent, EventBusError> {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let event = ScanEvent::CodeDecoded {
            value: "42".to_string(),
            frame_id: 3,
            timestamp: SystemTime::now(),
        };

        let subscriber_count = event_bus.publish(event).unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            ScanEvent::CodeDecoded {
                value, frame_id, ..
            } => {
                assert_eq!(value, "42");
                assert_eq!(frame_id, 3);
            }
            other => panic!("Unexpected event type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());
        assert!(event_bus
            .publish(ScanEvent::LookupRequested {
                timestamp: SystemTime::now()
            })
            .is_err());
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut receiver = EventReceiver::new(
            event_bus.subscribe(),
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "test".to_string(),
        );

        event_bus
            .publish(ScanEvent::DecodeFailed {
                frame_id: 1,
                error: "blurry".to_string(),
            })
            .unwrap();
        event_bus
            .publish(ScanEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "test".to_string(),
            })
            .unwrap();

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type(), "shutdown_requested");
    }
}
