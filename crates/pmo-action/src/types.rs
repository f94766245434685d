//! Request and result types for the decision pipeline.

use pmo_core::types::{ActionDecision, ExecutionStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload passed to action handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPayload {
    pub data: serde_json::Value,
}

impl ActionPayload {
    pub fn new(data: serde_json::Value) -> Self {
        Self { data }
    }

    /// Optional string field. A present value of another type is an error.
    pub fn opt_str(&self, key: &str) -> Result<Option<&str>, String> {
        match self.data.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(format!("field '{}' must be a string", key)),
        }
    }
}

/// Result returned by action handlers; `output` becomes the execution's
/// stored result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub message: String,
    pub output: serde_json::Value,
}

/// Who and what a handler is acting for.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub organization_id: String,
    pub decision_id: Uuid,
    pub correlation_id: String,
    pub executed_by: String,
}

/// Body of a decision submission. `decision` is parsed by the recorder so
/// an unknown value surfaces as a typed error instead of a decode failure.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionRequest {
    pub proposal_id: String,
    pub decision: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub original_payload: Option<serde_json::Value>,
}

/// A decision that was just persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedDecision {
    pub decision_id: Uuid,
    pub decision: ActionDecision,
}

/// Outcome of an execute call, including replays.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub execution_id: Uuid,
    pub already_executed: bool,
    pub status: ExecutionStatus,
    pub attempt: u32,
    pub result: serde_json::Value,
}

/// Body of a proposal registration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProposal {
    pub id: String,
    pub action_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Audit listing filters, as received from a query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionFilters {
    pub proposal_id: Option<String>,
    pub decision: Option<String>,
    pub action_type: Option<String>,
    pub decided_by: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
