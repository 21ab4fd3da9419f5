use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Metadata lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ScannerError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Whether the error ends the scan screen and needs user action to recover.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. } | Self::Camera(_))
    }
}

/// Failures while bringing up or running the frame source.
#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Camera initialization failed: {details}")]
    Initialization { details: String },

    #[error("Camera configuration invalid: {details}")]
    Configuration { details: String },

    #[error("Camera already subscribed")]
    AlreadySubscribed,
}

/// A single decode attempt failed. Never fatal to the pipeline.
#[derive(Error, Debug, Clone)]
pub enum DecodeError {
    #[error("Decoder failed on frame {frame_id}: {details}")]
    Failed { frame_id: u64, details: String },
}

impl DecodeError {
    pub fn failed<S: Into<String>>(frame_id: u64, details: S) -> Self {
        Self::Failed {
            frame_id,
            details: details.into(),
        }
    }
}

/// Metadata lookup failures. The display text is the message handed to `on_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Server error: {status}")]
    Status { status: u16 },

    #[error("Request failed: {details}")]
    Transport { details: String },

    #[error("Request failed: request timed out")]
    Timeout,

    #[error("Invalid response body: {details}")]
    InvalidBody { details: String },

    #[error("Invalid base URL: {details}")]
    InvalidUrl { details: String },
}

impl LookupError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            LookupError::Status { status } => Some(*status),
            _ => None,
        }
    }

    /// Transport-level failures: no response was received at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, LookupError::Transport { .. } | LookupError::Timeout)
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            LookupError::Timeout
        } else if error.is_decode() {
            LookupError::InvalidBody {
                details: error.to_string(),
            }
        } else {
            LookupError::Transport {
                details: error.to_string(),
            }
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ScannerError>;
