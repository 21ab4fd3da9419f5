use async_trait::async_trait;
use tracing::{info, warn};

/// Camera access check performed before the frame source is started
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn request(&self) -> bool;
}

/// Permission decided up front, e.g. from configuration
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission {
    granted: bool,
}

impl StaticPermission {
    pub fn new(granted: bool) -> Self {
        Self { granted }
    }
}

#[async_trait]
impl PermissionGate for StaticPermission {
    async fn request(&self) -> bool {
        if self.granted {
            info!("Camera permission granted");
        } else {
            warn!("Camera permission denied");
        }
        self.granted
    }
}
