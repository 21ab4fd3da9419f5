use super::traits::FrameHandler;
use crate::frame::{Frame, FrameData};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Counters shared by a source, its slot and its delivery task
#[derive(Debug, Default)]
pub struct SourceStats {
    pub frames_captured: AtomicU64,
    pub frames_delivered: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_released: AtomicU64,
}

impl SourceStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current statistics as a snapshot
    pub fn snapshot(&self) -> SourceStatsSnapshot {
        SourceStatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_released: self.frames_released.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStatsSnapshot {
    pub frames_captured: u64,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
    pub frames_released: u64,
}

impl SourceStatsSnapshot {
    /// Delivered frames whose release has not happened yet
    pub fn outstanding(&self) -> u64 {
        self.frames_delivered.saturating_sub(self.frames_released)
    }
}

/// Single-slot buffer that only ever keeps the newest undelivered frame
pub struct LatestFrameSlot {
    slot: Mutex<Option<FrameData>>,
    notify: Notify,
    stats: Arc<SourceStats>,
}

impl LatestFrameSlot {
    pub fn new(stats: Arc<SourceStats>) -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
            stats,
        }
    }

    /// Store `frame`, discarding any frame that was not picked up yet.
    /// Returns true when a stale frame was discarded.
    pub fn offer(&self, frame: FrameData) -> bool {
        let frame_id = frame.id;
        let stale = self.slot.lock().replace(frame);
        self.notify.notify_one();

        match stale {
            Some(stale) => {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Frame {} replaced by frame {}", stale.id, frame_id);
                true
            }
            None => false,
        }
    }

    pub fn take(&self) -> Option<FrameData> {
        self.slot.lock().take()
    }

    /// Wait for the next frame
    pub async fn next(&self) -> FrameData {
        loop {
            if let Some(frame) = self.take() {
                return frame;
            }
            self.notify.notified().await;
        }
    }

    /// Discard the pending frame, if any
    pub fn clear(&self) {
        if let Some(stale) = self.take() {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Discarded undelivered frame {}", stale.id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Spawn the single delivery task that feeds `handler` from `slot`.
///
/// At most `max_outstanding` frames are handed out at a time; each delivered
/// [`Frame`] holds one permit until it is released. While the consumer is busy the
/// slot keeps being overwritten, so the next delivery is always the newest frame.
pub fn spawn_delivery(
    slot: Arc<LatestFrameSlot>,
    handler: FrameHandler,
    max_outstanding: usize,
    stats: Arc<SourceStats>,
    token: CancellationToken,
) -> JoinHandle<()> {
    let permits = Arc::new(Semaphore::new(max_outstanding.max(1)));

    tokio::spawn(async move {
        debug!("Frame delivery task started (max outstanding: {})", max_outstanding);

        loop {
            let permit = tokio::select! {
                _ = token.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let data = tokio::select! {
                _ = token.cancelled() => break,
                data = slot.next() => data,
            };

            stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
            trace!("Delivering frame {}", data.id);

            let release_stats = Arc::clone(&stats);
            let frame = Frame::new(data, move |_| {
                release_stats.frames_released.fetch_add(1, Ordering::Relaxed);
                drop(permit);
            });

            handler(frame);
        }

        debug!("Frame delivery task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFormat, Rotation};
    use std::time::{Duration, SystemTime};

    fn frame_data(id: u64) -> FrameData {
        FrameData::new(
            id,
            SystemTime::now(),
            vec![0u8; 4],
            2,
            2,
            FrameFormat::Gray8,
            Rotation::Rotate0,
        )
    }

    #[test]
    fn test_offer_keeps_only_latest() {
        let stats = Arc::new(SourceStats::new());
        let slot = LatestFrameSlot::new(Arc::clone(&stats));

        assert!(!slot.offer(frame_data(1)));
        assert!(slot.offer(frame_data(2)));
        assert!(slot.offer(frame_data(3)));

        assert_eq!(slot.take().map(|f| f.id), Some(3));
        assert!(slot.is_empty());
        assert_eq!(stats.snapshot().frames_dropped, 2);
    }

    #[test]
    fn test_clear_counts_drop() {
        let stats = Arc::new(SourceStats::new());
        let slot = LatestFrameSlot::new(Arc::clone(&stats));

        slot.clear();
        assert_eq!(stats.snapshot().frames_dropped, 0);

        slot.offer(frame_data(1));
        slot.clear();
        assert!(slot.is_empty());
        assert_eq!(stats.snapshot().frames_dropped, 1);
    }

    #[tokio::test]
    async fn test_next_waits_for_offer() {
        let slot = Arc::new(LatestFrameSlot::new(Arc::new(SourceStats::new())));

        let waiter = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.next().await.id })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        slot.offer(frame_data(9));

        let id = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id, 9);
    }

    #[tokio::test]
    async fn test_delivery_blocks_until_release() {
        let stats = Arc::new(SourceStats::new());
        let slot = Arc::new(LatestFrameSlot::new(Arc::clone(&stats)));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Frame>();
        let handler: FrameHandler = Arc::new(move |frame| {
            let _ = tx.send(frame);
        });
        let token = CancellationToken::new();

        let task = spawn_delivery(
            Arc::clone(&slot),
            handler,
            1,
            Arc::clone(&stats),
            token.clone(),
        );

        slot.offer(frame_data(1));
        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id(), 1);

        // First frame still held: newer frames pile up in the slot and replace each other
        slot.offer(frame_data(2));
        slot.offer(frame_data(3));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());

        first.release();
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id(), 3);
        drop(next);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_delivered, 2);
        assert_eq!(snapshot.frames_released, 2);
        assert_eq!(snapshot.frames_dropped, 1);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
