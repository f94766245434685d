use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ActionType, DecisionKind};

/// Events emitted by the decision pipeline after each state change.
///
/// Consumed by the SSE broadcast channel (real-time UI updates, filtered per
/// organization) and by the structured log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DomainEvent {
    /// A proposal was registered by the AI worker or policy engine.
    ProposalRegistered {
        organization_id: String,
        proposal_id: String,
        action_type: ActionType,
        correlation_id: String,
    },

    /// A decision was recorded against a proposal.
    DecisionRecorded {
        organization_id: String,
        decision_id: Uuid,
        proposal_id: String,
        decision: DecisionKind,
        decided_by: String,
        correlation_id: String,
    },

    /// An approved decision was applied.
    ExecutionSucceeded {
        organization_id: String,
        decision_id: Uuid,
        execution_id: Uuid,
        action_type: ActionType,
        correlation_id: String,
    },

    /// A handler failed; the attempt was recorded as FAILED.
    ExecutionFailed {
        organization_id: String,
        decision_id: Uuid,
        execution_id: Uuid,
        correlation_id: String,
        error: String,
    },

    /// An execute call resolved to an earlier SUCCESS execution.
    ExecutionReplayed {
        organization_id: String,
        decision_id: Uuid,
        execution_id: Uuid,
        correlation_id: String,
    },
}

impl DomainEvent {
    /// Tenant the event belongs to; subscribers only see their own.
    pub fn organization_id(&self) -> &str {
        match self {
            DomainEvent::ProposalRegistered { organization_id, .. }
            | DomainEvent::DecisionRecorded { organization_id, .. }
            | DomainEvent::ExecutionSucceeded { organization_id, .. }
            | DomainEvent::ExecutionFailed { organization_id, .. }
            | DomainEvent::ExecutionReplayed { organization_id, .. } => organization_id,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            DomainEvent::ProposalRegistered { correlation_id, .. }
            | DomainEvent::DecisionRecorded { correlation_id, .. }
            | DomainEvent::ExecutionSucceeded { correlation_id, .. }
            | DomainEvent::ExecutionFailed { correlation_id, .. }
            | DomainEvent::ExecutionReplayed { correlation_id, .. } => correlation_id,
        }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::ProposalRegistered { .. } => "proposal_registered",
            DomainEvent::DecisionRecorded { .. } => "decision_recorded",
            DomainEvent::ExecutionSucceeded { .. } => "execution_succeeded",
            DomainEvent::ExecutionFailed { .. } => "execution_failed",
            DomainEvent::ExecutionReplayed { .. } => "execution_replayed",
        }
    }
}
