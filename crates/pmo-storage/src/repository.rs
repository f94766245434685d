//! Repositories for the decision pipeline tables.
//!
//! ProposalRepository, DecisionRepository and ExecutionRepository operate
//! on the Database struct using raw SQL. Every read is scoped by
//! organization id; callers never get rows of another tenant.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use pmo_core::error::PmoError;
use pmo_core::types::{
    from_millis, to_millis, ActionDecision, ActionExecution, ActionType, DecisionKind,
    ExecutionStatus, Proposal,
};

use crate::db::{is_unique_violation, sql_err, Database};

// =============================================================================
// Proposals
// =============================================================================

/// Repository for server-side proposal snapshots.
pub struct ProposalRepository {
    db: Arc<Database>,
}

impl ProposalRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new proposal. A duplicate id yields `PmoError::Constraint`.
    pub fn save(&self, proposal: &Proposal) -> Result<(), PmoError> {
        let payload = serde_json::to_string(&proposal.payload)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO action_proposals
                    (id, organization_id, action_type, payload, correlation_id, proposed_by, summary, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    proposal.id,
                    proposal.organization_id,
                    proposal.action_type.to_string(),
                    payload,
                    proposal.correlation_id,
                    proposal.proposed_by,
                    proposal.summary,
                    to_millis(proposal.created_at),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    PmoError::Constraint(format!("proposal '{}' already exists", proposal.id))
                } else {
                    PmoError::Storage(format!("Failed to save proposal: {}", e))
                }
            })?;
            Ok(())
        })
    }

    /// Find a proposal by id within one organization.
    pub fn find(&self, organization_id: &str, id: &str) -> Result<Option<Proposal>, PmoError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT id, organization_id, action_type, payload, correlation_id, proposed_by, summary, created_at
                     FROM action_proposals
                     WHERE id = ?1 AND organization_id = ?2",
                    rusqlite::params![id, organization_id],
                    |row| Ok(row_to_proposal(row)),
                )
                .optional()
                .map_err(sql_err("Proposal lookup"))?;

            result.transpose()
        })
    }
}

fn row_to_proposal(row: &rusqlite::Row<'_>) -> Result<Proposal, PmoError> {
    let get = |e: rusqlite::Error| PmoError::Storage(e.to_string());
    Ok(Proposal {
        id: row.get(0).map_err(get)?,
        organization_id: row.get(1).map_err(get)?,
        action_type: parse_column::<ActionType>(row.get(2).map_err(get)?)?,
        payload: parse_json(row.get(3).map_err(get)?)?,
        correlation_id: row.get(4).map_err(get)?,
        proposed_by: row.get(5).map_err(get)?,
        summary: row.get(6).map_err(get)?,
        created_at: from_millis(row.get(7).map_err(get)?),
    })
}

// =============================================================================
// Decisions
// =============================================================================

/// Filters for audit listings. `limit` is applied as given; callers clamp it.
#[derive(Debug, Clone)]
pub struct DecisionQuery {
    pub proposal_id: Option<String>,
    pub decision: Option<DecisionKind>,
    pub action_type: Option<ActionType>,
    pub decided_by: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for DecisionQuery {
    fn default() -> Self {
        Self {
            proposal_id: None,
            decision: None,
            action_type: None,
            decided_by: None,
            since: None,
            until: None,
            limit: 50,
            offset: 0,
        }
    }
}

const DECISION_COLUMNS: &str = "id, proposal_id, organization_id, decision, decided_by, action_type,
     original_payload, modified_payload, correlation_id, reason, created_at";

/// Repository for immutable decision records.
pub struct DecisionRepository {
    db: Arc<Database>,
}

impl DecisionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a decision. There is no update path; the schema rejects one.
    pub fn save(&self, decision: &ActionDecision) -> Result<(), PmoError> {
        let original = serde_json::to_string(&decision.original_payload)?;
        let modified = decision
            .modified_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO action_decisions
                    (id, proposal_id, organization_id, decision, decided_by, action_type,
                     original_payload, modified_payload, correlation_id, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    decision.id.to_string(),
                    decision.proposal_id,
                    decision.organization_id,
                    decision.decision.to_string(),
                    decision.decided_by,
                    decision.action_type.to_string(),
                    original,
                    modified,
                    decision.correlation_id,
                    decision.reason,
                    to_millis(decision.created_at),
                ],
            )
            .map_err(sql_err("Failed to save decision"))?;
            Ok(())
        })
    }

    /// Find a decision by id within one organization.
    pub fn find(&self, organization_id: &str, id: Uuid) -> Result<Option<ActionDecision>, PmoError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM action_decisions WHERE id = ?1 AND organization_id = ?2",
                DECISION_COLUMNS
            );
            let result = conn
                .query_row(&sql, rusqlite::params![id.to_string(), organization_id], |row| {
                    Ok(row_to_decision(row))
                })
                .optional()
                .map_err(sql_err("Decision lookup"))?;

            result.transpose()
        })
    }

    /// Id of the most recently recorded decision for a proposal.
    pub fn latest_for_proposal(
        &self,
        organization_id: &str,
        proposal_id: &str,
    ) -> Result<Option<Uuid>, PmoError> {
        self.db.with_conn(|conn| {
            let id: Option<String> = conn
                .query_row(
                    "SELECT id FROM action_decisions
                     WHERE organization_id = ?1 AND proposal_id = ?2
                     ORDER BY seq DESC
                     LIMIT 1",
                    rusqlite::params![organization_id, proposal_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(sql_err("Latest decision lookup"))?;

            id.map(|s| parse_uuid(&s)).transpose()
        })
    }

    /// List decisions of one organization, newest first.
    pub fn list(
        &self,
        organization_id: &str,
        query: &DecisionQuery,
    ) -> Result<Vec<ActionDecision>, PmoError> {
        let mut clauses = vec!["organization_id = ?".to_string()];
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(organization_id.to_string())];

        if let Some(ref proposal_id) = query.proposal_id {
            clauses.push("proposal_id = ?".to_string());
            params.push(Box::new(proposal_id.clone()));
        }
        if let Some(kind) = query.decision {
            clauses.push("decision = ?".to_string());
            params.push(Box::new(kind.to_string()));
        }
        if let Some(action_type) = query.action_type {
            clauses.push("action_type = ?".to_string());
            params.push(Box::new(action_type.to_string()));
        }
        if let Some(ref decided_by) = query.decided_by {
            clauses.push("decided_by = ?".to_string());
            params.push(Box::new(decided_by.clone()));
        }
        if let Some(since) = query.since {
            clauses.push("created_at >= ?".to_string());
            params.push(Box::new(to_millis(since)));
        }
        if let Some(until) = query.until {
            clauses.push("created_at <= ?".to_string());
            params.push(Box::new(to_millis(until)));
        }
        params.push(Box::new(i64::from(query.limit)));
        params.push(Box::new(i64::from(query.offset)));

        let sql = format!(
            "SELECT {} FROM action_decisions
             WHERE {}
             ORDER BY created_at DESC, seq DESC
             LIMIT ? OFFSET ?",
            DECISION_COLUMNS,
            clauses.join(" AND ")
        );

        self.db.with_conn(|conn| {
            let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql).map_err(sql_err("Decision list prepare"))?;
            let rows = stmt
                .query_map(params_refs.as_slice(), |row| Ok(row_to_decision(row)))
                .map_err(sql_err("Decision list"))?;

            let mut decisions = Vec::new();
            for row in rows {
                decisions.push(row.map_err(|e| PmoError::Storage(e.to_string()))??);
            }
            Ok(decisions)
        })
    }
}

fn row_to_decision(row: &rusqlite::Row<'_>) -> Result<ActionDecision, PmoError> {
    let get = |e: rusqlite::Error| PmoError::Storage(e.to_string());
    let id: String = row.get(0).map_err(get)?;
    let modified: Option<String> = row.get(7).map_err(get)?;
    Ok(ActionDecision {
        id: parse_uuid(&id)?,
        proposal_id: row.get(1).map_err(get)?,
        organization_id: row.get(2).map_err(get)?,
        decision: parse_column::<DecisionKind>(row.get(3).map_err(get)?)?,
        decided_by: row.get(4).map_err(get)?,
        action_type: parse_column::<ActionType>(row.get(5).map_err(get)?)?,
        original_payload: parse_json(row.get(6).map_err(get)?)?,
        modified_payload: modified.map(parse_json).transpose()?,
        correlation_id: row.get(8).map_err(get)?,
        reason: row.get(9).map_err(get)?,
        created_at: from_millis(row.get(10).map_err(get)?),
    })
}

// =============================================================================
// Executions
// =============================================================================

/// Fields of an execution attempt; `attempt` is assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub id: Uuid,
    pub decision_id: Uuid,
    pub proposal_id: String,
    pub action_type: ActionType,
    pub organization_id: String,
    pub correlation_id: String,
    pub status: ExecutionStatus,
    pub result: serde_json::Value,
    pub executed_by: String,
    pub created_at: DateTime<Utc>,
}

/// Result of inserting an execution row.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionInsert {
    /// The row was written.
    Inserted(ActionExecution),
    /// A SUCCESS row for the decision already existed; nothing was written.
    DuplicateSuccess(ActionExecution),
}

const EXECUTION_COLUMNS: &str = "id, decision_id, proposal_id, action_type, organization_id,
     correlation_id, status, result, attempt, executed_by, created_at";

/// Repository for execution attempts.
pub struct ExecutionRepository {
    db: Arc<Database>,
}

impl ExecutionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The SUCCESS execution of a decision, if any.
    pub fn find_success(&self, decision_id: Uuid) -> Result<Option<ActionExecution>, PmoError> {
        self.db.with_conn(|conn| find_success_with(conn, decision_id))
    }

    /// Append an execution attempt.
    ///
    /// A SUCCESS insert that collides with an existing SUCCESS row (the
    /// partial unique index) is reported as `DuplicateSuccess` carrying the
    /// winning row instead of an error.
    pub fn insert(&self, execution: &NewExecution) -> Result<ExecutionInsert, PmoError> {
        let result = serde_json::to_string(&execution.result)?;
        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO action_executions
                    (id, decision_id, proposal_id, action_type, organization_id, correlation_id,
                     status, result, attempt, executed_by, created_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                        (SELECT COUNT(*) + 1 FROM action_executions WHERE decision_id = ?2),
                        ?9, ?10",
                rusqlite::params![
                    execution.id.to_string(),
                    execution.decision_id.to_string(),
                    execution.proposal_id,
                    execution.action_type.to_string(),
                    execution.organization_id,
                    execution.correlation_id,
                    execution.status.to_string(),
                    result,
                    execution.executed_by,
                    to_millis(execution.created_at),
                ],
            );

            match inserted {
                Ok(_) => {
                    let sql = format!(
                        "SELECT {} FROM action_executions WHERE id = ?1",
                        EXECUTION_COLUMNS
                    );
                    let row = conn
                        .query_row(&sql, rusqlite::params![execution.id.to_string()], |row| {
                            Ok(row_to_execution(row))
                        })
                        .map_err(sql_err("Execution reload"))??;
                    Ok(ExecutionInsert::Inserted(row))
                }
                Err(e) if is_unique_violation(&e) => {
                    let existing = find_success_with(conn, execution.decision_id)?.ok_or_else(|| {
                        PmoError::Storage(format!(
                            "unique violation without a SUCCESS row for decision {}",
                            execution.decision_id
                        ))
                    })?;
                    Ok(ExecutionInsert::DuplicateSuccess(existing))
                }
                Err(e) => Err(PmoError::Storage(format!("Failed to save execution: {}", e))),
            }
        })
    }

    /// All attempts for a decision within one organization, oldest first.
    pub fn list_for_decision(
        &self,
        organization_id: &str,
        decision_id: Uuid,
    ) -> Result<Vec<ActionExecution>, PmoError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM action_executions
                 WHERE organization_id = ?1 AND decision_id = ?2
                 ORDER BY seq ASC",
                EXECUTION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(sql_err("Execution list prepare"))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![organization_id, decision_id.to_string()],
                    |row| Ok(row_to_execution(row)),
                )
                .map_err(sql_err("Execution list"))?;

            let mut executions = Vec::new();
            for row in rows {
                executions.push(row.map_err(|e| PmoError::Storage(e.to_string()))??);
            }
            Ok(executions)
        })
    }
}

fn find_success_with(
    conn: &rusqlite::Connection,
    decision_id: Uuid,
) -> Result<Option<ActionExecution>, PmoError> {
    let sql = format!(
        "SELECT {} FROM action_executions WHERE decision_id = ?1 AND status = 'SUCCESS'",
        EXECUTION_COLUMNS
    );
    let result = conn
        .query_row(&sql, rusqlite::params![decision_id.to_string()], |row| {
            Ok(row_to_execution(row))
        })
        .optional()
        .map_err(sql_err("Execution lookup"))?;

    result.transpose()
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> Result<ActionExecution, PmoError> {
    let get = |e: rusqlite::Error| PmoError::Storage(e.to_string());
    let id: String = row.get(0).map_err(get)?;
    let decision_id: String = row.get(1).map_err(get)?;
    let attempt: i64 = row.get(8).map_err(get)?;
    Ok(ActionExecution {
        id: parse_uuid(&id)?,
        decision_id: parse_uuid(&decision_id)?,
        proposal_id: row.get(2).map_err(get)?,
        action_type: parse_column::<ActionType>(row.get(3).map_err(get)?)?,
        organization_id: row.get(4).map_err(get)?,
        correlation_id: row.get(5).map_err(get)?,
        status: parse_column::<ExecutionStatus>(row.get(6).map_err(get)?)?,
        result: parse_json(row.get(7).map_err(get)?)?,
        attempt: attempt as u32,
        executed_by: row.get(9).map_err(get)?,
        created_at: from_millis(row.get(10).map_err(get)?),
    })
}

// =============================================================================
// Column helpers
// =============================================================================

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, PmoError> {
    Uuid::parse_str(s).map_err(|e| PmoError::Storage(format!("Invalid UUID '{}': {}", s, e)))
}

pub(crate) fn parse_column<T>(s: String) -> Result<T, PmoError>
where
    T: std::str::FromStr<Err = String>,
{
    s.parse::<T>().map_err(PmoError::Storage)
}

pub(crate) fn parse_json(s: String) -> Result<serde_json::Value, PmoError> {
    serde_json::from_str(&s).map_err(|e| PmoError::Storage(format!("Corrupt JSON column: {}", e)))
}
