//! Application state shared across all route handlers.
//!
//! AppState holds the pipeline services built over one database handle.
//! It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pmo_action::{
    ActionRegistry, AuditTrail, DecisionRecorder, EventSink, ExecutionDispatcher, ProposalIntake,
};
use pmo_core::config::PmoConfig;
use pmo_core::events::DomainEvent;
use pmo_storage::Database;
use tokio::sync::broadcast;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (read-only after startup).
    pub config: Arc<PmoConfig>,
    /// SQLite database for persistent storage.
    pub database: Arc<Database>,
    pub proposals: Arc<ProposalIntake>,
    pub recorder: Arc<DecisionRecorder>,
    pub dispatcher: Arc<ExecutionDispatcher>,
    pub audit: Arc<AuditTrail>,
    /// Broadcast sender for SSE events.
    pub event_tx: broadcast::Sender<DomainEvent>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Wire the pipeline services with the built-in action handlers.
    pub fn new(config: PmoConfig, database: Arc<Database>) -> Self {
        let mut registry = ActionRegistry::new();
        registry.register_defaults(Arc::clone(&database));
        Self::with_registry(config, database, registry)
    }

    /// Same as [`AppState::new`] with a caller-supplied handler registry.
    pub fn with_registry(
        config: PmoConfig,
        database: Arc<Database>,
        registry: ActionRegistry,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let events = EventSink::new(event_tx.clone());
        let registry = Arc::new(registry);

        Self {
            proposals: Arc::new(ProposalIntake::new(
                Arc::clone(&database),
                Arc::clone(&registry),
                events.clone(),
            )),
            recorder: Arc::new(DecisionRecorder::new(
                Arc::clone(&database),
                Arc::clone(&registry),
                events.clone(),
            )),
            dispatcher: Arc::new(ExecutionDispatcher::new(
                Arc::clone(&database),
                registry,
                Duration::from_secs(config.execution.handler_timeout_secs),
                events,
            )),
            audit: Arc::new(AuditTrail::new(
                Arc::clone(&database),
                config.execution.audit_default_limit,
                config.execution.audit_max_limit,
            )),
            config: Arc::new(config),
            database,
            event_tx,
            start_time: Instant::now(),
        }
    }
}
