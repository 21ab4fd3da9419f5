use super::slot::{spawn_delivery, LatestFrameSlot, SourceStats, SourceStatsSnapshot};
use super::traits::{FrameHandler, FrameSource};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

struct Subscription {
    token: CancellationToken,
    capture_task: JoinHandle<()>,
    delivery_task: JoinHandle<()>,
}

/// Frame generator standing in for a camera device.
///
/// Produces placeholder MJPEG frames at the configured rate into a
/// [`LatestFrameSlot`], from which a single delivery task feeds the subscriber.
pub struct SyntheticCamera {
    config: CameraConfig,
    slot: Arc<LatestFrameSlot>,
    stats: Arc<SourceStats>,
    frame_counter: Arc<AtomicU64>,
    is_running: Arc<AtomicBool>,
    subscription: tokio::sync::Mutex<Option<Subscription>>,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Self {
        info!(
            "Creating synthetic camera ({}x{} @ {}fps, {:?})",
            config.resolution.0, config.resolution.1, config.fps, config.rotation
        );

        let stats = Arc::new(SourceStats::new());
        Self {
            config,
            slot: Arc::new(LatestFrameSlot::new(Arc::clone(&stats))),
            stats,
            frame_counter: Arc::new(AtomicU64::new(0)),
            is_running: Arc::new(AtomicBool::new(false)),
            subscription: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Get current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    fn check_config(&self) -> Result<(), CameraError> {
        let (width, height) = self.config.resolution;
        if width == 0 || height == 0 {
            return Err(CameraError::Configuration {
                details: format!("unsupported resolution {}x{}", width, height),
            });
        }
        if self.config.fps == 0 {
            return Err(CameraError::Configuration {
                details: "frame rate must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Placeholder JPEG payload whose body varies per frame
    fn generate_payload(frame_id: u64) -> Vec<u8> {
        let mut data = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01,
            0x00, 0x48, 0x00, 0x48, 0x00, 0x00,
        ];

        let pattern_size = 1000 + (frame_id % 500) as usize;
        let pattern_byte = (frame_id % 256) as u8;
        data.extend(vec![pattern_byte; pattern_size]);
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }

    fn spawn_capture_loop(&self, token: CancellationToken) -> JoinHandle<()> {
        let config = self.config.clone();
        let slot = Arc::clone(&self.slot);
        let stats = Arc::clone(&self.stats);
        let frame_counter = Arc::clone(&self.frame_counter);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(config.frame_interval());
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            info!("Synthetic capture loop started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval_timer.tick() => {}
                }

                let frame_id = frame_counter.fetch_add(1, Ordering::Relaxed);
                let (width, height) = config.resolution;
                let frame = FrameData::new(
                    frame_id,
                    SystemTime::now(),
                    Self::generate_payload(frame_id),
                    width,
                    height,
                    FrameFormat::Mjpeg,
                    config.rotation,
                );

                trace!(
                    "Generated frame {} ({}x{}, {} bytes)",
                    frame_id,
                    width,
                    height,
                    frame.data.len()
                );

                stats.frames_captured.fetch_add(1, Ordering::Relaxed);
                slot.offer(frame);
            }

            info!("Synthetic capture loop stopped");
        })
    }
}

#[async_trait]
impl FrameSource for SyntheticCamera {
    async fn subscribe(&self, handler: FrameHandler) -> Result<(), CameraError> {
        let mut subscription = self.subscription.lock().await;
        if subscription.is_some() {
            warn!("Synthetic camera is already subscribed");
            return Err(CameraError::AlreadySubscribed);
        }

        self.check_config().map_err(|e| {
            error!("Camera initialization failed: {}", e);
            e
        })?;

        let token = CancellationToken::new();
        let delivery_task = spawn_delivery(
            Arc::clone(&self.slot),
            handler,
            self.config.max_outstanding_frames,
            Arc::clone(&self.stats),
            token.clone(),
        );
        let capture_task = self.spawn_capture_loop(token.clone());

        *subscription = Some(Subscription {
            token,
            capture_task,
            delivery_task,
        });
        self.is_running.store(true, Ordering::Relaxed);

        info!("Synthetic camera subscribed");
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), CameraError> {
        let Some(subscription) = self.subscription.lock().await.take() else {
            debug!("Synthetic camera is not subscribed");
            return Ok(());
        };

        info!("Unsubscribing synthetic camera");
        self.is_running.store(false, Ordering::Relaxed);
        subscription.token.cancel();

        for (name, task) in [
            ("capture", subscription.capture_task),
            ("delivery", subscription.delivery_task),
        ] {
            match tokio::time::timeout(Duration::from_secs(3), task).await {
                Ok(Ok(())) => debug!("Synthetic camera {} task completed", name),
                Ok(Err(e)) => error!("Error waiting for synthetic camera {} task: {}", name, e),
                Err(_) => warn!("Synthetic camera {} task did not complete within timeout", name),
            }
        }

        self.slot.clear();
        info!("Synthetic camera unsubscribed");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    fn stats(&self) -> SourceStatsSnapshot {
        self.stats.snapshot()
    }
}
