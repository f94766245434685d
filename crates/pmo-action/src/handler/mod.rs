//! Action handler registry and trait definition.
//!
//! Defines the `ActionHandler` async trait and provides the handler
//! registry the dispatcher routes decisions through.

pub mod task_create;
pub mod task_update;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pmo_core::types::ActionType;
use pmo_storage::Database;

use crate::error::ActionError;
use crate::types::{ActionPayload, ActionResult, HandlerContext};

pub use task_create::TaskCreateHandler;
pub use task_update::TaskUpdateHandler;

/// A side-effecting operation applied when a decision is executed.
///
/// Implementations must be idempotent per `HandlerContext::decision_id`:
/// two concurrent executions of the same decision may both reach
/// `execute`, and only one SUCCESS is ever recorded.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action_type(&self) -> ActionType;

    /// Check a payload without side effects. Used at proposal intake and
    /// for MODIFIED payloads at decision time.
    fn validate(&self, payload: &ActionPayload) -> Result<(), ActionError>;

    async fn execute(
        &self,
        ctx: &HandlerContext,
        payload: &ActionPayload,
    ) -> Result<ActionResult, ActionError>;

    /// Short human-readable summary of what `execute` would do.
    fn describe(&self, payload: &ActionPayload) -> String;
}

/// Maps action types to their handlers.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in task handlers backed by `db`.
    pub fn register_defaults(&mut self, db: Arc<Database>) {
        self.register(Arc::new(TaskCreateHandler::new(Arc::clone(&db))));
        self.register(Arc::new(TaskUpdateHandler::new(db)));
    }

    /// Register a handler, replacing any previous one for its type.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.action_type(), handler);
    }

    pub fn get(&self, action_type: ActionType) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&action_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<ActionType> {
        let mut types: Vec<ActionType> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.to_string());
        types
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("handlers", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_defaults() {
        let db = Arc::new(Database::in_memory().unwrap());
        let mut registry = ActionRegistry::new();
        registry.register_defaults(db);

        assert_eq!(
            registry.registered_types(),
            vec![ActionType::TaskCreate, ActionType::TaskUpdate]
        );
        assert!(registry.get(ActionType::TaskCreate).is_some());
    }

    #[test]
    fn test_empty_registry() {
        let registry = ActionRegistry::new();
        assert!(registry.get(ActionType::TaskUpdate).is_none());
        assert!(registry.registered_types().is_empty());
    }
}
