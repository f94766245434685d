//! Proposal intake.
//!
//! Proposals are the server-side record a decision snapshots its payload
//! from. They are written once by the AI worker or policy engine and never
//! changed.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use pmo_core::access::{can, Actor, Permission};
use pmo_core::error::PmoError;
use pmo_core::events::DomainEvent;
use pmo_core::types::{ActionType, Proposal};
use pmo_storage::{Database, ProposalRepository};
use regex::Regex;
use tracing::info;
use uuid::Uuid;

use crate::error::DecisionError;
use crate::events::EventSink;
use crate::handler::ActionRegistry;
use crate::types::{ActionPayload, NewProposal};

const MAX_SUMMARY_LEN: usize = 1000;

fn identifier_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.:\-]{1,128}$").expect("Invalid identifier regex"))
}

/// True for ids usable as proposal and correlation identifiers.
pub fn is_valid_identifier(id: &str) -> bool {
    identifier_pattern().is_match(id)
}

pub struct ProposalIntake {
    proposals: ProposalRepository,
    registry: Arc<ActionRegistry>,
    events: EventSink,
}

impl ProposalIntake {
    pub fn new(db: Arc<Database>, registry: Arc<ActionRegistry>, events: EventSink) -> Self {
        Self {
            proposals: ProposalRepository::new(db),
            registry,
            events,
        }
    }

    pub fn register_proposal(
        &self,
        actor: &Actor,
        new: NewProposal,
    ) -> Result<Proposal, DecisionError> {
        if !can(actor, Permission::WriteProposal) {
            return Err(DecisionError::Forbidden(Permission::WriteProposal));
        }

        if !is_valid_identifier(&new.id) {
            return Err(DecisionError::InvalidRequest(format!(
                "proposal id '{}' must match [A-Za-z0-9_.:-]{{1,128}}",
                new.id
            )));
        }

        let action_type: ActionType = new
            .action_type
            .parse()
            .map_err(DecisionError::InvalidRequest)?;

        if !new.payload.is_object() {
            return Err(DecisionError::InvalidRequest(
                "payload must be a JSON object".to_string(),
            ));
        }
        let handler = self.registry.get(action_type).ok_or_else(|| {
            DecisionError::InvalidRequest(format!("no handler registered for {}", action_type))
        })?;
        let payload = ActionPayload::new(new.payload.clone());
        handler
            .validate(&payload)
            .map_err(|e| DecisionError::InvalidRequest(e.to_string()))?;

        let correlation_id = match new.correlation_id.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => {
                if !is_valid_identifier(c) {
                    return Err(DecisionError::InvalidRequest(format!(
                        "correlation id '{}' is not a valid identifier",
                        c
                    )));
                }
                c.to_string()
            }
            _ => Uuid::new_v4().to_string(),
        };

        let summary = new
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if summary.as_ref().is_some_and(|s| s.chars().count() > MAX_SUMMARY_LEN) {
            return Err(DecisionError::InvalidRequest(format!(
                "summary exceeds {} characters",
                MAX_SUMMARY_LEN
            )));
        }
        // Without a summary, fall back to the handler's description.
        let summary = summary.unwrap_or_else(|| handler.describe(&payload));

        let proposal = Proposal {
            id: new.id,
            organization_id: actor.organization_id.clone(),
            action_type,
            payload: new.payload,
            correlation_id,
            proposed_by: actor.audit_identity().to_string(),
            summary: Some(summary),
            created_at: Utc::now(),
        };

        self.proposals.save(&proposal).map_err(|e| match e {
            PmoError::Constraint(_) => DecisionError::ProposalConflict(proposal.id.clone()),
            other => DecisionError::Storage(other),
        })?;

        info!(
            proposal_id = %proposal.id,
            organization_id = %proposal.organization_id,
            correlation_id = %proposal.correlation_id,
            action_type = %proposal.action_type,
            "Proposal registered"
        );
        self.events.emit(DomainEvent::ProposalRegistered {
            organization_id: proposal.organization_id.clone(),
            proposal_id: proposal.id.clone(),
            action_type: proposal.action_type,
            correlation_id: proposal.correlation_id.clone(),
        });

        Ok(proposal)
    }

    pub fn get_proposal(&self, actor: &Actor, id: &str) -> Result<Proposal, DecisionError> {
        if !can(actor, Permission::ReadAudit) {
            return Err(DecisionError::Forbidden(Permission::ReadAudit));
        }
        self.proposals
            .find(&actor.organization_id, id)?
            .ok_or_else(|| DecisionError::ProposalNotFound(id.to_string()))
    }
}
