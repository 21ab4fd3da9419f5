use super::lookup::LookupCoordinator;
use super::types::{ComponentState, ShutdownReason};
use crate::config::ScannerConfig;
use crate::decoder::{Decoder, SimulatedDecoder};
use crate::error::Result;
use crate::events::EventBus;
use crate::keyboard_input::KeyboardInputHandler;
use crate::lookup::{MetadataClient, MetadataLookup};
use crate::pipeline::ScanPipeline;
use crate::presenter::TerminalPresenter;
use crate::source::{FrameSource, PermissionGate, StaticPermission, SyntheticCamera};
use crate::state::{ScanStore, StateHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Coordinates one scan session: permission, frame source, pipeline, sinks, lookups
pub struct ScannerOrchestrator {
    pub(super) config: ScannerConfig,
    pub(super) session_id: Uuid,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) store: ScanStore,
    pub(super) state: StateHandle,

    // Components
    pub(super) pipeline: ScanPipeline<dyn Decoder>,
    pub(super) source: Arc<dyn FrameSource>,
    pub(super) permission: Arc<dyn PermissionGate>,
    pub(super) lookups: LookupCoordinator,
    pub(super) presenter: Option<TerminalPresenter>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
    pub(super) background_tasks: Vec<JoinHandle<()>>,
}

impl ScannerOrchestrator {
    /// Create an orchestrator with the synthetic camera and simulated decoder
    pub async fn new(config: ScannerConfig) -> Result<Self> {
        ScannerOrchestratorBuilder::new(config).build().await
    }

    pub fn builder(config: ScannerConfig) -> ScannerOrchestratorBuilder {
        ScannerOrchestratorBuilder::new(config)
    }

    /// Enable or disable the keyboard input handler
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn store(&self) -> &ScanStore {
        &self.store
    }

    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn pipeline(&self) -> &ScanPipeline<dyn Decoder> {
        &self.pipeline
    }

    pub fn source(&self) -> Arc<dyn FrameSource> {
        Arc::clone(&self.source)
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }
}

/// Builder for the orchestrator; unset collaborators come from configuration
pub struct ScannerOrchestratorBuilder {
    config: ScannerConfig,
    source: Option<Arc<dyn FrameSource>>,
    permission: Option<Arc<dyn PermissionGate>>,
    decoder: Option<Arc<dyn Decoder>>,
    presenter_enabled: bool,
}

impl ScannerOrchestratorBuilder {
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            config,
            source: None,
            permission: None,
            decoder: None,
            presenter_enabled: true,
        }
    }

    pub fn source(mut self, source: Arc<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn permission(mut self, permission: Arc<dyn PermissionGate>) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Render to the terminal (on by default)
    pub fn presenter(mut self, enabled: bool) -> Self {
        self.presenter_enabled = enabled;
        self
    }

    pub async fn build(self) -> Result<ScannerOrchestrator> {
        let config = self.config;
        let session_id = Uuid::new_v4();
        info!("Creating scan session {}", session_id);

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let (store, state) = ScanStore::new();

        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(SimulatedDecoder::from_config(&config.scanner)));
        let pipeline = ScanPipeline::with_options(
            decoder,
            state.clone(),
            Some(Arc::clone(&event_bus)),
            config.scanner.cancel_in_flight_on_stop,
        );

        let source = self
            .source
            .unwrap_or_else(|| Arc::new(SyntheticCamera::new(config.camera.clone())));
        let permission = self
            .permission
            .unwrap_or_else(|| Arc::new(StaticPermission::new(config.camera.permission_granted)));

        let lookup = MetadataLookup::new(MetadataClient::from_config(&config.metadata)?);
        let lookups = LookupCoordinator::new(lookup, state.clone(), Arc::clone(&event_bus));

        let presenter = self.presenter_enabled.then(TerminalPresenter::new);
        let keyboard_handler = Some(KeyboardInputHandler::new(Arc::clone(&event_bus)));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(ScannerOrchestrator {
            config,
            session_id,
            event_bus,
            store,
            state,
            pipeline,
            source,
            permission,
            lookups,
            presenter,
            keyboard_handler,
            keyboard_enabled: false,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
            background_tasks: Vec::new(),
        })
    }
}
