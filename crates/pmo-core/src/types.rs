//! Shared domain types for the decision pipeline.
//!
//! Proposals, decisions, executions, and the PMO entities that action
//! handlers operate on. Storage and API crates use these directly.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// `decided_by` marker for decisions taken by the automated policy engine.
pub const SYSTEM_POLICY_ENGINE: &str = "system-policy-engine";

// =============================================================================
// Enums
// =============================================================================

/// Disposition recorded against a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Approved,
    Rejected,
    Modified,
}

impl DecisionKind {
    pub const ALL: [DecisionKind; 3] = [
        DecisionKind::Approved,
        DecisionKind::Rejected,
        DecisionKind::Modified,
    ];

    /// Whether a decision of this kind may be handed to the dispatcher.
    pub fn is_executable(&self) -> bool {
        matches!(self, DecisionKind::Approved | DecisionKind::Modified)
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionKind::Approved => write!(f, "APPROVED"),
            DecisionKind::Rejected => write!(f, "REJECTED"),
            DecisionKind::Modified => write!(f, "MODIFIED"),
        }
    }
}

impl std::str::FromStr for DecisionKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPROVED" => Ok(DecisionKind::Approved),
            "REJECTED" => Ok(DecisionKind::Rejected),
            "MODIFIED" => Ok(DecisionKind::Modified),
            _ => Err(format!("Unknown decision kind: {}", s)),
        }
    }
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "SUCCESS"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            _ => Err(format!("Unknown execution status: {}", s)),
        }
    }
}

/// Action tags a proposal can carry. Each maps to one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    TaskCreate,
    TaskUpdate,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::TaskCreate => write!(f, "TASK_CREATE"),
            ActionType::TaskUpdate => write!(f, "TASK_UPDATE"),
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TASK_CREATE" => Ok(ActionType::TaskCreate),
            "TASK_UPDATE" => Ok(ActionType::TaskUpdate),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// Task workflow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Blocked,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "todo"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "blocked" => Ok(TaskStatus::Blocked),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// An AI- or rule-engine-generated suggestion, stored server-side so that
/// decisions can snapshot it without trusting client data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub organization_id: String,
    pub action_type: ActionType,
    pub payload: serde_json::Value,
    pub correlation_id: String,
    pub proposed_by: String,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An immutable disposition on a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDecision {
    pub id: Uuid,
    pub proposal_id: String,
    pub organization_id: String,
    pub decision: DecisionKind,
    pub decided_by: String,
    pub action_type: ActionType,
    pub original_payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_payload: Option<serde_json::Value>,
    pub correlation_id: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActionDecision {
    /// Parameters the dispatcher must apply: the modified payload when the
    /// actor supplied one, otherwise the snapshot taken at decision time.
    pub fn effective_payload(&self) -> &serde_json::Value {
        self.modified_payload
            .as_ref()
            .unwrap_or(&self.original_payload)
    }
}

/// One attempt at applying a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionExecution {
    pub id: Uuid,
    pub decision_id: Uuid,
    pub proposal_id: String,
    pub action_type: ActionType,
    pub organization_id: String,
    pub correlation_id: String,
    pub status: ExecutionStatus,
    pub result: serde_json::Value,
    pub attempt: u32,
    pub executed_by: String,
    pub created_at: DateTime<Utc>,
}

/// A PMO project, the container tasks are filed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A PMO task row as created or modified by action handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub organization_id: String,
    pub project_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub assignee_id: Option<String>,
    pub due_date: Option<String>,
    pub source_decision_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Time helpers
// =============================================================================

/// Millisecond epoch value used for every persisted timestamp column.
pub fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Inverse of [`to_millis`]. Out-of-range values collapse to the epoch.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================
