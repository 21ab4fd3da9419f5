use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::trace;

/// Frame format enumeration supporting different video formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// YUV 4:2:0 planar, the usual analysis format of phone cameras
    Yuv420,
    /// 8-bit luminance only
    Gray8,
}

impl FrameFormat {
    /// Get bytes per pixel for the format (0 for compressed formats)
    pub fn bytes_per_pixel(&self) -> f32 {
        match self {
            FrameFormat::Mjpeg => 0.0,
            FrameFormat::Yuv420 => 1.5,
            FrameFormat::Gray8 => 1.0,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// Sensor rotation that must be applied to the image to get it upright
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    /// Get rotation angle in degrees
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Rotate0 => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Rotate0),
            90 => Some(Rotation::Rotate90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Rotate270),
            _ => None,
        }
    }

    /// Whether width and height swap once the rotation is applied
    pub fn is_transposed(&self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

/// Raw image and metadata for one captured frame
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
    /// Rotation reported by the sensor for this frame
    pub rotation: Rotation,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
        rotation: Rotation,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
            rotation,
        }
    }

    /// Get the expected frame size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            let pixels = self.width as usize * self.height as usize;
            Some((pixels as f32 * self.format.bytes_per_pixel()) as usize)
        }
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => true,
        }
    }

    /// Dimensions after the sensor rotation is applied
    pub fn upright_dimensions(&self) -> (u32, u32) {
        if self.rotation.is_transposed() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

type ReleaseHook = Box<dyn FnOnce(u64) + Send + 'static>;

/// Owned handle to a camera frame that must go back to its source.
///
/// The release hook runs exactly once: either through [`Frame::release`], which
/// consumes the handle, or from `Drop` when the handle goes out of scope on any
/// other path (early return, cancellation, panic unwinding).
pub struct Frame {
    data: FrameData,
    release: Option<ReleaseHook>,
}

impl Frame {
    pub fn new<F>(data: FrameData, on_release: F) -> Self
    where
        F: FnOnce(u64) + Send + 'static,
    {
        Self {
            data,
            release: Some(Box::new(on_release)),
        }
    }

    pub fn id(&self) -> u64 {
        self.data.id
    }

    pub fn data(&self) -> &FrameData {
        &self.data
    }

    pub fn rotation(&self) -> Rotation {
        self.data.rotation
    }

    /// Hand the frame back to its source
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(hook) = self.release.take() {
            trace!("Releasing frame {}", self.data.id);
            hook(self.data.id);
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.data.id)
            .field("width", &self.data.width)
            .field("height", &self.data.height)
            .field("format", &self.data.format)
            .field("rotation", &self.data.rotation)
            .field("released", &self.release.is_none())
            .finish()
    }
}
