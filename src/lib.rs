pub mod app;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod frame;
pub mod keyboard_input;
pub mod lookup;
pub mod pipeline;
pub mod presenter;
pub mod source;
pub mod state;

pub use app::{ComponentState, ScannerOrchestrator, ScannerOrchestratorBuilder, ShutdownReason};
pub use config::ScannerConfig;
pub use decoder::{Decoder, SimulatedDecoder, Symbol, SymbolFormat};
pub use error::{CameraError, DecodeError, LookupError, Result, ScannerError};
pub use events::{EventBus, EventFilter, EventReceiver, ScanEvent};
pub use frame::{Frame, FrameData, FrameFormat, Rotation};
pub use keyboard_input::KeyboardInputHandler;
pub use lookup::{parse_identifier, MetadataClient, MetadataLookup, MetadataRecord};
pub use pipeline::{select_text, PipelineStatsSnapshot, ScanPipeline};
pub use presenter::{overlay_lines, OverlayKind, OverlayLine, TerminalPresenter};
pub use source::{FrameHandler, FrameSource, PermissionGate, StaticPermission, SyntheticCamera};
pub use state::{DecodedValue, MetadataView, ScanSnapshot, ScanState, ScanStore, StateHandle};
