/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
}

pub(super) const CAMERA: &str = "camera";
pub(super) const PIPELINE: &str = "pipeline";
pub(super) const PRESENTER: &str = "presenter";
pub(super) const LOOKUP: &str = "lookup";
pub(super) const KEYBOARD: &str = "keyboard";

pub(super) const PERMISSION_DENIED_MESSAGE: &str =
    "Permission for camera is required to run the app";
