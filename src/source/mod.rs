mod permission;
mod slot;
mod synthetic;
mod traits;

pub use permission::{PermissionGate, StaticPermission};
pub use slot::{spawn_delivery, LatestFrameSlot, SourceStats, SourceStatsSnapshot};
pub use synthetic::SyntheticCamera;
pub use traits::{FrameHandler, FrameSource};
