//! Database schema migrations.
//!
//! Applies the decision pipeline schema: proposals, decisions, executions,
//! and the projects/tasks tables the built-in handlers write to.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::info;

use pmo_core::error::PmoError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), PmoError> {
    // The version check and the schema change share one write transaction,
    // so concurrent openers of a fresh file apply v1 exactly once.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| PmoError::Storage(format!("Failed to begin migration: {}", e)))?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| PmoError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = tx
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| PmoError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(&tx)?;
        info!("Applied migration v1: decision_pipeline");
    }

    tx.commit()
        .map_err(|e| PmoError::Storage(format!("Failed to commit migrations: {}", e)))?;

    Ok(())
}

/// Version 1: decision pipeline schema.
fn apply_v1(conn: &Connection) -> Result<(), PmoError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            id              TEXT PRIMARY KEY NOT NULL,
            organization_id TEXT NOT NULL,
            name            TEXT NOT NULL,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_projects_org
            ON projects (organization_id);

        CREATE TABLE IF NOT EXISTS tasks (
            id                  TEXT PRIMARY KEY NOT NULL,
            organization_id     TEXT NOT NULL,
            project_id          TEXT REFERENCES projects(id),
            title               TEXT NOT NULL,
            description         TEXT,
            status              TEXT NOT NULL DEFAULT 'todo'
                                CHECK (status IN ('todo', 'in_progress', 'done', 'blocked')),
            assignee_id         TEXT,
            due_date            TEXT,
            -- One task per decision: the handler-level idempotency key.
            source_decision_id  TEXT UNIQUE,
            created_by          TEXT NOT NULL,
            created_at          INTEGER NOT NULL,
            updated_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_org_project
            ON tasks (organization_id, project_id);

        CREATE TABLE IF NOT EXISTS action_proposals (
            id              TEXT PRIMARY KEY NOT NULL,
            organization_id TEXT NOT NULL,
            action_type     TEXT NOT NULL,
            payload         TEXT NOT NULL,
            correlation_id  TEXT NOT NULL,
            proposed_by     TEXT NOT NULL,
            summary         TEXT,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_action_proposals_org
            ON action_proposals (organization_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS action_decisions (
            seq              INTEGER PRIMARY KEY AUTOINCREMENT,
            id               TEXT NOT NULL UNIQUE,
            proposal_id      TEXT NOT NULL REFERENCES action_proposals(id),
            organization_id  TEXT NOT NULL,
            decision         TEXT NOT NULL
                             CHECK (decision IN ('APPROVED', 'REJECTED', 'MODIFIED')),
            decided_by       TEXT NOT NULL,
            action_type      TEXT NOT NULL,
            original_payload TEXT NOT NULL,
            modified_payload TEXT,
            correlation_id   TEXT NOT NULL,
            reason           TEXT,
            created_at       INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_action_decisions_org_created
            ON action_decisions (organization_id, created_at DESC, seq DESC);

        CREATE INDEX IF NOT EXISTS idx_action_decisions_proposal
            ON action_decisions (proposal_id, seq DESC);

        CREATE TRIGGER IF NOT EXISTS action_decisions_immutable
            BEFORE UPDATE ON action_decisions
        BEGIN
            SELECT RAISE(ABORT, 'action_decisions rows are immutable');
        END;

        CREATE TABLE IF NOT EXISTS action_executions (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            decision_id     TEXT NOT NULL REFERENCES action_decisions(id),
            proposal_id     TEXT NOT NULL,
            action_type     TEXT NOT NULL,
            organization_id TEXT NOT NULL,
            correlation_id  TEXT NOT NULL,
            status          TEXT NOT NULL CHECK (status IN ('SUCCESS', 'FAILED')),
            result          TEXT NOT NULL DEFAULT '{}',
            attempt         INTEGER NOT NULL,
            executed_by     TEXT NOT NULL,
            created_at      INTEGER NOT NULL
        );

        -- At most one SUCCESS row per decision, across every connection.
        CREATE UNIQUE INDEX IF NOT EXISTS uq_action_executions_success
            ON action_executions (decision_id)
            WHERE status = 'SUCCESS';

        CREATE INDEX IF NOT EXISTS idx_action_executions_decision
            ON action_executions (decision_id, seq ASC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'decision_pipeline');
        ",
    )
    .map_err(|e| PmoError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
