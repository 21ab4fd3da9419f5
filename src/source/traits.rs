use super::slot::SourceStatsSnapshot;
use crate::error::CameraError;
use crate::frame::Frame;
use async_trait::async_trait;
use std::sync::Arc;

/// Callback invoked on the source's delivery task for every frame.
///
/// Must return quickly; the frame it receives has to be released (or dropped)
/// before the source can deliver beyond its outstanding-frame limit.
pub type FrameHandler = Arc<dyn Fn(Frame) + Send + Sync>;

/// Producer of camera frames with keep-only-latest backpressure
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Start delivering frames to `handler`
    async fn subscribe(&self, handler: FrameHandler) -> Result<(), CameraError>;

    /// Stop delivery. Frames already handed out stay valid until released.
    async fn unsubscribe(&self) -> Result<(), CameraError>;

    fn is_active(&self) -> bool;

    fn stats(&self) -> SourceStatsSnapshot;
}
