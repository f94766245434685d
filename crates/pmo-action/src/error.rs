//! Error types for the decision pipeline.

use pmo_core::access::Permission;
use pmo_core::error::PmoError;
use pmo_core::types::ActionType;
use uuid::Uuid;

/// Errors from action handler execution.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Action handler failed: {0}")]
    HandlerFailed(String),
    #[error("Action type not registered: {0}")]
    UnregisteredHandler(ActionType),
    #[error("Payload validation failed: {0}")]
    InvalidPayload(String),
    #[error("Action execution timed out after {0} seconds")]
    Timeout(u64),
    #[error("Storage error: {0}")]
    Storage(#[from] PmoError),
}

/// Errors from recording, executing, and reading decisions.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("Invalid decision: '{0}' (expected APPROVED, REJECTED or MODIFIED)")]
    InvalidDecisionKind(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),
    #[error("Decision not found: {0}")]
    DecisionNotFound(Uuid),
    #[error("Missing permission: {0}")]
    Forbidden(Permission),
    #[error("Decision {0} is not executable: only APPROVED/MODIFIED decisions are executable")]
    DecisionNotExecutable(Uuid),
    #[error("Decision {decision_id} was superseded by {latest_id}")]
    DecisionSuperseded { decision_id: Uuid, latest_id: Uuid },
    #[error("Proposal already exists: {0}")]
    ProposalConflict(String),
    #[error("Execution {execution_id} failed: {message}")]
    ExecutionHandlerFailure { execution_id: Uuid, message: String },
    #[error("Storage error: {0}")]
    Storage(#[from] PmoError),
}
