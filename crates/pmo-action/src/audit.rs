//! Audit trail reader.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pmo_core::access::{can, Actor, Permission};
use pmo_core::types::{ActionDecision, ActionExecution, ActionType, DecisionKind};
use pmo_storage::{Database, DecisionQuery, DecisionRepository, ExecutionRepository};
use uuid::Uuid;

use crate::error::DecisionError;
use crate::types::DecisionFilters;

/// Read-only, organization-scoped view over decisions and executions.
pub struct AuditTrail {
    decisions: DecisionRepository,
    executions: ExecutionRepository,
    default_limit: u32,
    max_limit: u32,
}

impl AuditTrail {
    pub fn new(db: Arc<Database>, default_limit: u32, max_limit: u32) -> Self {
        Self {
            decisions: DecisionRepository::new(Arc::clone(&db)),
            executions: ExecutionRepository::new(db),
            default_limit,
            max_limit,
        }
    }

    /// Decisions of the actor's organization, newest first.
    pub fn list_decisions(
        &self,
        actor: &Actor,
        filters: &DecisionFilters,
    ) -> Result<Vec<ActionDecision>, DecisionError> {
        require_read(actor)?;
        let query = self.build_query(filters)?;
        Ok(self.decisions.list(&actor.organization_id, &query)?)
    }

    pub fn get_decision(
        &self,
        actor: &Actor,
        decision_id: Uuid,
    ) -> Result<ActionDecision, DecisionError> {
        require_read(actor)?;
        self.decisions
            .find(&actor.organization_id, decision_id)?
            .ok_or(DecisionError::DecisionNotFound(decision_id))
    }

    /// Every execution attempt of one decision, oldest first.
    pub fn list_executions(
        &self,
        actor: &Actor,
        decision_id: Uuid,
    ) -> Result<Vec<ActionExecution>, DecisionError> {
        let decision = self.get_decision(actor, decision_id)?;
        Ok(self
            .executions
            .list_for_decision(&actor.organization_id, decision.id)?)
    }

    fn build_query(&self, filters: &DecisionFilters) -> Result<DecisionQuery, DecisionError> {
        let decision = filters
            .decision
            .as_deref()
            .map(|d| {
                d.parse::<DecisionKind>()
                    .map_err(|_| DecisionError::InvalidDecisionKind(d.to_string()))
            })
            .transpose()?;

        let action_type = filters
            .action_type
            .as_deref()
            .map(|t| t.parse::<ActionType>().map_err(DecisionError::InvalidRequest))
            .transpose()?;

        let since = parse_time("since", filters.since.as_deref())?;
        let until = parse_time("until", filters.until.as_deref())?;
        if let (Some(s), Some(u)) = (since, until) {
            if s > u {
                return Err(DecisionError::InvalidRequest(
                    "since must not be after until".to_string(),
                ));
            }
        }

        let limit = match filters.limit {
            Some(0) => {
                return Err(DecisionError::InvalidRequest(
                    "limit must be at least 1".to_string(),
                ))
            }
            Some(n) => n.min(self.max_limit),
            None => self.default_limit,
        };

        Ok(DecisionQuery {
            proposal_id: non_empty(filters.proposal_id.as_deref()),
            decision,
            action_type,
            decided_by: non_empty(filters.decided_by.as_deref()),
            since,
            until,
            limit,
            offset: filters.offset.unwrap_or(0),
        })
    }
}

fn require_read(actor: &Actor) -> Result<(), DecisionError> {
    if can(actor, Permission::ReadAudit) {
        Ok(())
    } else {
        Err(DecisionError::Forbidden(Permission::ReadAudit))
    }
}

fn parse_time(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, DecisionError> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| {
                    DecisionError::InvalidRequest(format!("{} '{}' is not an RFC 3339 timestamp", name, v))
                })
        })
        .transpose()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
