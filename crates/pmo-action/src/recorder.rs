//! Decision recorder.
//!
//! Persists an actor's disposition on a proposal. The payload stored with the
//! decision is always the server-side proposal snapshot; a client-supplied
//! payload only ever becomes the `modified_payload` of a MODIFIED decision.

use std::sync::Arc;

use chrono::Utc;
use pmo_core::access::{can, Actor, Permission};
use pmo_core::events::DomainEvent;
use pmo_core::types::{ActionDecision, DecisionKind};
use pmo_storage::{Database, DecisionRepository, ProposalRepository};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DecisionError;
use crate::events::EventSink;
use crate::handler::ActionRegistry;
use crate::types::{ActionPayload, DecisionRequest, RecordedDecision};

pub const MAX_REASON_LEN: usize = 2000;

pub struct DecisionRecorder {
    proposals: ProposalRepository,
    decisions: DecisionRepository,
    registry: Arc<ActionRegistry>,
    events: EventSink,
}

impl DecisionRecorder {
    pub fn new(db: Arc<Database>, registry: Arc<ActionRegistry>, events: EventSink) -> Self {
        Self {
            proposals: ProposalRepository::new(Arc::clone(&db)),
            decisions: DecisionRepository::new(db),
            registry,
            events,
        }
    }

    /// Record a decision. Never executes it.
    ///
    /// Everything that can be checked without storage (permission, decision
    /// kind, reason) is checked first, so a rejected request touches nothing.
    pub fn record_decision(
        &self,
        actor: &Actor,
        request: DecisionRequest,
    ) -> Result<RecordedDecision, DecisionError> {
        if !can(actor, Permission::RecordDecision) {
            return Err(DecisionError::Forbidden(Permission::RecordDecision));
        }

        let kind: DecisionKind = request
            .decision
            .parse()
            .map_err(|_| DecisionError::InvalidDecisionKind(request.decision.clone()))?;

        let proposal_id = request.proposal_id.trim();
        if proposal_id.is_empty() {
            return Err(DecisionError::InvalidRequest(
                "proposal_id must not be empty".to_string(),
            ));
        }

        let reason = normalize_reason(request.reason)?;

        let proposal = self
            .proposals
            .find(&actor.organization_id, proposal_id)?
            .ok_or_else(|| DecisionError::ProposalNotFound(proposal_id.to_string()))?;

        let modified_payload = match (kind, request.original_payload) {
            (DecisionKind::Modified, Some(payload)) => {
                if !payload.is_object() {
                    return Err(DecisionError::InvalidRequest(
                        "modified payload must be a JSON object".to_string(),
                    ));
                }
                if let Some(handler) = self.registry.get(proposal.action_type) {
                    handler
                        .validate(&ActionPayload::new(payload.clone()))
                        .map_err(|e| DecisionError::InvalidRequest(e.to_string()))?;
                }
                Some(payload)
            }
            (_, Some(payload)) => {
                if payload != proposal.payload {
                    warn!(
                        proposal_id = %proposal.id,
                        decision = %kind,
                        "Ignoring client payload that differs from the proposal snapshot"
                    );
                }
                None
            }
            (_, None) => None,
        };

        let decision = ActionDecision {
            id: Uuid::new_v4(),
            proposal_id: proposal.id.clone(),
            organization_id: actor.organization_id.clone(),
            decision: kind,
            decided_by: actor.audit_identity().to_string(),
            action_type: proposal.action_type,
            original_payload: proposal.payload,
            modified_payload,
            correlation_id: proposal.correlation_id,
            reason,
            created_at: Utc::now(),
        };
        self.decisions.save(&decision)?;

        info!(
            decision_id = %decision.id,
            proposal_id = %decision.proposal_id,
            organization_id = %decision.organization_id,
            correlation_id = %decision.correlation_id,
            decision = %decision.decision,
            decided_by = %decision.decided_by,
            "Decision recorded"
        );

        self.events.emit(DomainEvent::DecisionRecorded {
            organization_id: decision.organization_id.clone(),
            decision_id: decision.id,
            proposal_id: decision.proposal_id.clone(),
            decision: decision.decision,
            decided_by: decision.decided_by.clone(),
            correlation_id: decision.correlation_id.clone(),
        });

        Ok(RecordedDecision {
            decision_id: decision.id,
            decision,
        })
    }
}

fn normalize_reason(reason: Option<String>) -> Result<Option<String>, DecisionError> {
    let reason = reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    if let Some(ref r) = reason {
        if r.chars().count() > MAX_REASON_LEN {
            return Err(DecisionError::InvalidRequest(format!(
                "reason exceeds {} characters",
                MAX_REASON_LEN
            )));
        }
    }
    Ok(reason)
}
