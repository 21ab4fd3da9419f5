use crate::lookup::MetadataRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// What the presentation sink shows before (or instead of) a decoded value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScanState {
    Initializing,
    Ready,
    Error(String),
}

impl ScanState {
    pub fn is_error(&self) -> bool {
        matches!(self, ScanState::Error(_))
    }
}

/// Most recently published decoded text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedValue {
    pub text: String,
    pub frame_id: u64,
    pub observed_at: DateTime<Utc>,
}

/// Outcome of the latest metadata lookup for the current value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MetadataView {
    Found(MetadataRecord),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSnapshot {
    pub state: ScanState,
    pub decoded: Option<DecodedValue>,
    pub metadata: Option<MetadataView>,
    /// Incremented on every applied change, including repeats of the same value
    pub revision: u64,
}

impl Default for ScanSnapshot {
    fn default() -> Self {
        Self {
            state: ScanState::Initializing,
            decoded: None,
            metadata: None,
            revision: 0,
        }
    }
}

impl ScanSnapshot {
    pub fn decoded_text(&self) -> Option<&str> {
        self.decoded.as_ref().map(|value| value.text.as_str())
    }
}

#[derive(Debug)]
pub enum StateUpdate {
    Decoded(DecodedValue),
    State(ScanState),
    Metadata { for_text: String, view: MetadataView },
    Flush(oneshot::Sender<()>),
}

/// Cloneable producer side of the update channel
#[derive(Debug, Clone)]
pub struct StateHandle {
    sender: mpsc::UnboundedSender<StateUpdate>,
}

impl StateHandle {
    /// Publish a decoded value. Returns false once the store is gone.
    pub fn publish_decoded<S: Into<String>>(&self, text: S, frame_id: u64) -> bool {
        self.send(StateUpdate::Decoded(DecodedValue {
            text: text.into(),
            frame_id,
            observed_at: Utc::now(),
        }))
    }

    pub fn set_state(&self, state: ScanState) -> bool {
        self.send(StateUpdate::State(state))
    }

    /// Attach a lookup outcome; dropped if `for_text` is no longer the current value
    pub fn publish_metadata<S: Into<String>>(&self, for_text: S, view: MetadataView) -> bool {
        self.send(StateUpdate::Metadata {
            for_text: for_text.into(),
            view,
        })
    }

    /// Resolves once every update sent before this call has been applied
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.send(StateUpdate::Flush(ack)) {
            let _ = done.await;
        }
    }

    fn send(&self, update: StateUpdate) -> bool {
        match self.sender.send(update) {
            Ok(()) => true,
            Err(e) => {
                debug!("Scan state store closed, dropping update: {:?}", e.0);
                false
            }
        }
    }
}

/// Owner of the UI-visible snapshot and its single writer task.
///
/// Producers never mutate the snapshot directly. They send [`StateUpdate`]s through a
/// [`StateHandle`]; the writer applies them in arrival order and swaps the whole
/// [`ScanSnapshot`] inside a `watch` channel, so observers never see a partial update
/// and are notified on every change.
pub struct ScanStore {
    sender: Arc<watch::Sender<ScanSnapshot>>,
    writer: JoinHandle<()>,
}

impl ScanStore {
    /// Create the store and the handle producers use to update it.
    ///
    /// Must be called from within a tokio runtime. The writer exits once every
    /// `StateHandle` has been dropped.
    pub fn new() -> (Self, StateHandle) {
        let (watch_tx, _) = watch::channel(ScanSnapshot::default());
        let sender = Arc::new(watch_tx);
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(Self::run_writer(Arc::clone(&sender), update_rx));

        (
            Self { sender, writer },
            StateHandle { sender: update_tx },
        )
    }

    async fn run_writer(
        sender: Arc<watch::Sender<ScanSnapshot>>,
        mut updates: mpsc::UnboundedReceiver<StateUpdate>,
    ) {
        while let Some(update) = updates.recv().await {
            match update {
                StateUpdate::Flush(ack) => {
                    let _ = ack.send(());
                }
                other => {
                    sender.send_if_modified(|snapshot| Self::apply(snapshot, other));
                }
            }
        }
        debug!("Scan state writer exiting");
    }

    /// Apply one update; returns whether observers must be notified
    fn apply(snapshot: &mut ScanSnapshot, update: StateUpdate) -> bool {
        match update {
            StateUpdate::Decoded(value) => {
                trace!("Publishing decoded value from frame {}", value.frame_id);
                if snapshot.decoded_text() != Some(value.text.as_str()) {
                    snapshot.metadata = None;
                }
                snapshot.decoded = Some(value);
                snapshot.revision += 1;
                true
            }
            StateUpdate::State(state) => {
                if snapshot.state == state {
                    return false;
                }
                if snapshot.state.is_error() {
                    warn!("Ignoring scan state change to {:?} after terminal error", state);
                    return false;
                }
                debug!("Scan state changed to {:?}", state);
                snapshot.state = state;
                snapshot.revision += 1;
                true
            }
            StateUpdate::Metadata { for_text, view } => {
                if snapshot.decoded_text() != Some(for_text.as_str()) {
                    debug!("Discarding stale metadata for '{}'", for_text);
                    return false;
                }
                snapshot.metadata = Some(view);
                snapshot.revision += 1;
                true
            }
            StateUpdate::Flush(_) => false,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanSnapshot> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        self.sender.borrow().clone()
    }

    pub fn current_decoded_value(&self) -> Option<String> {
        self.sender.borrow().decoded_text().map(str::to_string)
    }

    pub fn scan_state(&self) -> ScanState {
        self.sender.borrow().state.clone()
    }

    pub fn is_writer_running(&self) -> bool {
        !self.writer.is_finished()
    }
}

impl Drop for ScanStore {
    fn drop(&mut self) {
        self.writer.abort();
    }
}
