use crate::decoder::{Decoder, Symbol};
use crate::error::DecodeError;
use crate::events::{EventBus, ScanEvent};
use crate::frame::Frame;
use crate::source::FrameHandler;
use crate::state::StateHandle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub frames_submitted: AtomicU64,
    pub decodes_succeeded: AtomicU64,
    pub decodes_empty: AtomicU64,
    pub decodes_failed: AtomicU64,
    pub decodes_cancelled: AtomicU64,
    pub values_published: AtomicU64,
    pub completed: AtomicU64,
    pub in_flight: AtomicU64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            decodes_succeeded: self.decodes_succeeded.load(Ordering::Relaxed),
            decodes_empty: self.decodes_empty.load(Ordering::Relaxed),
            decodes_failed: self.decodes_failed.load(Ordering::Relaxed),
            decodes_cancelled: self.decodes_cancelled.load(Ordering::Relaxed),
            values_published: self.values_published.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStatsSnapshot {
    pub frames_submitted: u64,
    pub decodes_succeeded: u64,
    pub decodes_empty: u64,
    pub decodes_failed: u64,
    pub decodes_cancelled: u64,
    pub values_published: u64,
    pub completed: u64,
    pub in_flight: u64,
}

/// Decrements the in-flight gauge however the decode task ends
struct InFlightGuard(Arc<PipelineStats>);

impl InFlightGuard {
    fn enter(stats: &Arc<PipelineStats>) -> Self {
        stats.in_flight.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(stats))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// First symbol with a present, non-empty text value, in decoder order
pub fn select_text(symbols: &[Symbol]) -> Option<&str> {
    symbols.iter().find_map(Symbol::display_text)
}

enum Completion {
    Decoded(Vec<Symbol>),
    Failed(DecodeError),
    Cancelled,
}

struct Shared<D: ?Sized> {
    decoder: Arc<D>,
    state: StateHandle,
    events: Option<Arc<EventBus>>,
    stats: Arc<PipelineStats>,
    cancellation: CancellationToken,
    cancel_on_stop: bool,
}

/// Bridges frames to the decoder and decoded text to the state store.
///
/// Every frame gets its own decode task. Completions are not ordered against each
/// other, so the last completion in real time wins, whichever frame it belongs to.
pub struct ScanPipeline<D: Decoder + ?Sized> {
    shared: Arc<Shared<D>>,
    tracker: TaskTracker,
}

impl<D: Decoder + ?Sized> Clone for ScanPipeline<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            tracker: self.tracker.clone(),
        }
    }
}

impl<D: Decoder + ?Sized> ScanPipeline<D> {
    pub fn new(decoder: Arc<D>, state: StateHandle) -> Self {
        Self::with_options(decoder, state, None, false)
    }

    /// `cancel_on_stop` makes [`ScanPipeline::stop`] abandon in-flight decodes.
    pub fn with_options(
        decoder: Arc<D>,
        state: StateHandle,
        events: Option<Arc<EventBus>>,
        cancel_on_stop: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                decoder,
                state,
                events,
                stats: Arc::new(PipelineStats::default()),
                cancellation: CancellationToken::new(),
                cancel_on_stop,
            }),
            tracker: TaskTracker::new(),
        }
    }

    /// Submit one frame for decoding and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_frame(&self, frame: Frame) {
        let shared = Arc::clone(&self.shared);
        shared.stats.frames_submitted.fetch_add(1, Ordering::Relaxed);
        trace!("Submitting frame {} for decode", frame.id());

        let guard = InFlightGuard::enter(&shared.stats);
        self.tracker.spawn(async move {
            let _guard = guard;
            Self::process(shared, frame).await;
        });
    }

    /// Handler suitable for [`crate::source::FrameSource::subscribe`]
    pub fn frame_handler(&self) -> FrameHandler {
        let pipeline = self.clone();
        Arc::new(move |frame| pipeline.on_frame(frame))
    }

    async fn process(shared: Arc<Shared<D>>, frame: Frame) {
        let frame_id = frame.id();

        let completion = if shared.cancel_on_stop {
            tokio::select! {
                biased;
                _ = shared.cancellation.cancelled() => Completion::Cancelled,
                result = shared.decoder.decode(frame.data()) => Completion::from(result),
            }
        } else {
            Completion::from(shared.decoder.decode(frame.data()).await)
        };

        match completion {
            Completion::Decoded(symbols) => {
                shared.stats.decodes_succeeded.fetch_add(1, Ordering::Relaxed);
                match select_text(&symbols) {
                    Some(text) => Self::publish(&shared, text, frame_id),
                    None => {
                        shared.stats.decodes_empty.fetch_add(1, Ordering::Relaxed);
                        trace!(
                            "Frame {} produced {} symbols without text",
                            frame_id,
                            symbols.len()
                        );
                    }
                }
            }
            Completion::Failed(e) => {
                shared.stats.decodes_failed.fetch_add(1, Ordering::Relaxed);
                warn!("QR code scanning failed for frame {}: {}", frame_id, e);
                if let Some(events) = &shared.events {
                    let _ = events.publish(ScanEvent::DecodeFailed {
                        frame_id,
                        error: e.to_string(),
                    });
                }
            }
            Completion::Cancelled => {
                shared.stats.decodes_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!("Decode of frame {} cancelled", frame_id);
            }
        }

        frame.release();
        shared.stats.completed.fetch_add(1, Ordering::Relaxed);
    }

    fn publish(shared: &Shared<D>, text: &str, frame_id: u64) {
        debug!("QR code from frame {}: {}", frame_id, text);
        if shared.state.publish_decoded(text, frame_id) {
            shared.stats.values_published.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(events) = &shared.events {
            let _ = events.publish(ScanEvent::CodeDecoded {
                value: text.to_string(),
                frame_id,
                timestamp: SystemTime::now(),
            });
        }
    }

    /// Stop accepting tracked work; cancels in-flight decodes when configured to
    pub fn stop(&self) {
        self.tracker.close();
        if self.shared.cancel_on_stop {
            info!("Cancelling in-flight decodes");
            self.shared.cancellation.cancel();
        }
    }

    /// Wait for in-flight decodes to finish. Returns false on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "{} decodes still in flight after {:?}",
                    self.shared.stats.in_flight.load(Ordering::Relaxed),
                    timeout
                );
                false
            }
        }
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn in_flight(&self) -> u64 {
        self.shared.stats.in_flight.load(Ordering::Relaxed)
    }
}

impl From<Result<Vec<Symbol>, DecodeError>> for Completion {
    fn from(result: Result<Vec<Symbol>, DecodeError>) -> Self {
        match result {
            Ok(symbols) => Completion::Decoded(symbols),
            Err(e) => Completion::Failed(e),
        }
    }
}
