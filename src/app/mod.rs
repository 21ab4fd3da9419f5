mod lookup;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::{ScannerOrchestrator, ScannerOrchestratorBuilder};
pub use types::{ComponentState, ShutdownReason};
