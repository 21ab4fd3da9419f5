use crate::events::{EventBus, EventFilter, EventReceiver, ScanEvent};
use crate::lookup::{parse_identifier, MetadataLookup};
use crate::state::{MetadataView, ScanSnapshot, StateHandle};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bridges decoded values to metadata lookups and writes the outcome back to state
#[derive(Clone)]
pub struct LookupCoordinator {
    lookup: MetadataLookup,
    state: StateHandle,
    event_bus: Arc<EventBus>,
}

impl LookupCoordinator {
    pub fn new(lookup: MetadataLookup, state: StateHandle, event_bus: Arc<EventBus>) -> Self {
        Self {
            lookup,
            state,
            event_bus,
        }
    }

    /// Look up `text` if it names a record. Returns `None` when it is not an identifier.
    pub fn request(&self, text: &str) -> Option<JoinHandle<()>> {
        let Some(id) = parse_identifier(text) else {
            debug!("Decoded value '{}' is not a record identifier, skipping lookup", text);
            return None;
        };

        info!("Looking up metadata for {}", id);

        let for_text = text.to_string();
        let success_state = self.state.clone();
        let success_bus = Arc::clone(&self.event_bus);
        let success_text = for_text.clone();
        let error_state = self.state.clone();
        let error_bus = Arc::clone(&self.event_bus);

        Some(self.lookup.fetch(
            id,
            move |record| {
                let message = record.data.clone();
                success_state.publish_metadata(success_text, MetadataView::Found(record));
                let _ = success_bus.publish(ScanEvent::LookupCompleted {
                    identifier: id,
                    success: true,
                    message,
                });
            },
            move |message| {
                error_state.publish_metadata(for_text, MetadataView::Failed(message.clone()));
                let _ = error_bus.publish(ScanEvent::LookupCompleted {
                    identifier: id,
                    success: false,
                    message,
                });
            },
        ))
    }

    /// Look up every distinct decoded value as it appears
    pub fn spawn_auto_lookup(
        &self,
        mut receiver: watch::Receiver<ScanSnapshot>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let coordinator = self.clone();

        tokio::spawn(async move {
            let mut last_text: Option<String> = None;

            loop {
                let current = receiver.borrow_and_update().decoded_text().map(str::to_string);
                if current.is_some() && current != last_text {
                    if let Some(text) = current.as_deref() {
                        coordinator.request(text);
                    }
                    last_text = current;
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = receiver.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            debug!("Auto lookup task stopped");
        })
    }

    /// Serve `LookupRequested` events against the current decoded value
    pub fn spawn_request_listener(
        &self,
        receiver: watch::Receiver<ScanSnapshot>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let coordinator = self.clone();
        let mut events = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::EventTypes(vec!["lookup_requested"]),
            "lookup".to_string(),
        );

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => {
                        if event.is_err() {
                            break;
                        }
                        let current = receiver.borrow().decoded_text().map(str::to_string);
                        match current {
                            Some(text) => {
                                if coordinator.request(&text).is_none() {
                                    warn!("Current code '{}' cannot be looked up", text);
                                }
                            }
                            None => info!("No code decoded yet, nothing to look up"),
                        }
                    }
                }
            }

            debug!("Lookup request listener stopped");
        })
    }
}
