//! Project and task persistence used by the built-in action handlers.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use pmo_core::error::PmoError;
use pmo_core::types::{from_millis, to_millis, Project, Task, TaskStatus};

use crate::db::{sql_err, Database};
use crate::repository::{parse_column, parse_uuid};

/// Repository for projects.
pub struct ProjectRepository {
    db: Arc<Database>,
}

impl ProjectRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn save(&self, project: &Project) -> Result<(), PmoError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (id, organization_id, name, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    project.id,
                    project.organization_id,
                    project.name,
                    to_millis(project.created_at),
                ],
            )
            .map_err(sql_err("Failed to save project"))?;
            Ok(())
        })
    }

    pub fn find(&self, organization_id: &str, id: &str) -> Result<Option<Project>, PmoError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, organization_id, name, created_at
                 FROM projects WHERE id = ?1 AND organization_id = ?2",
                rusqlite::params![id, organization_id],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        name: row.get(2)?,
                        created_at: from_millis(row.get(3)?),
                    })
                },
            )
            .optional()
            .map_err(sql_err("Project lookup"))
        })
    }
}

/// Fields for a task created on behalf of a decision.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub organization_id: String,
    pub project_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub assignee_id: Option<String>,
    pub due_date: Option<String>,
    pub source_decision_id: Uuid,
    pub created_by: String,
}

/// Partial update; `None` leaves a column unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<String>,
    pub due_date: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.assignee_id.is_none()
            && self.due_date.is_none()
    }
}

const TASK_COLUMNS: &str = "id, organization_id, project_id, title, description, status,
     assignee_id, due_date, source_decision_id, created_by, created_at, updated_at";

/// Repository for tasks.
pub struct TaskRepository {
    db: Arc<Database>,
}

impl TaskRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create the task for a decision, or return the one already created.
    ///
    /// Keyed by `source_decision_id`, so concurrent callers for the same
    /// decision converge on a single row. The flag is true when this call
    /// inserted it.
    pub fn create_for_decision(&self, task: &NewTask) -> Result<(Task, bool), PmoError> {
        let now = to_millis(Utc::now());
        let id = Uuid::new_v4();
        self.db.with_conn(|conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO tasks
                        (id, organization_id, project_id, title, description, status,
                         assignee_id, due_date, source_decision_id, created_by, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                     ON CONFLICT(source_decision_id) DO NOTHING",
                    rusqlite::params![
                        id.to_string(),
                        task.organization_id,
                        task.project_id,
                        task.title,
                        task.description,
                        task.status.to_string(),
                        task.assignee_id,
                        task.due_date,
                        task.source_decision_id.to_string(),
                        task.created_by,
                        now,
                    ],
                )
                .map_err(sql_err("Failed to create task"))?;

            let sql = format!("SELECT {} FROM tasks WHERE source_decision_id = ?1", TASK_COLUMNS);
            let row = conn
                .query_row(
                    &sql,
                    rusqlite::params![task.source_decision_id.to_string()],
                    |row| Ok(row_to_task(row)),
                )
                .map_err(sql_err("Task reload"))??;

            Ok((row, inserted == 1))
        })
    }

    pub fn find(&self, organization_id: &str, id: Uuid) -> Result<Option<Task>, PmoError> {
        self.db.with_conn(|conn| find_with(conn, organization_id, id))
    }

    /// Apply a patch. Returns `None` when the task does not exist in the
    /// organization.
    pub fn update(
        &self,
        organization_id: &str,
        id: Uuid,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, PmoError> {
        let mut sets = vec!["updated_at = ?".to_string()];
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(to_millis(Utc::now()))];

        if let Some(ref title) = patch.title {
            sets.push("title = ?".to_string());
            params.push(Box::new(title.clone()));
        }
        if let Some(ref description) = patch.description {
            sets.push("description = ?".to_string());
            params.push(Box::new(description.clone()));
        }
        if let Some(status) = patch.status {
            sets.push("status = ?".to_string());
            params.push(Box::new(status.to_string()));
        }
        if let Some(ref assignee_id) = patch.assignee_id {
            sets.push("assignee_id = ?".to_string());
            params.push(Box::new(assignee_id.clone()));
        }
        if let Some(ref due_date) = patch.due_date {
            sets.push("due_date = ?".to_string());
            params.push(Box::new(due_date.clone()));
        }
        params.push(Box::new(id.to_string()));
        params.push(Box::new(organization_id.to_string()));

        let sql = format!(
            "UPDATE tasks SET {} WHERE id = ? AND organization_id = ?",
            sets.join(", ")
        );

        self.db.with_conn(|conn| {
            let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let changed = conn
                .execute(&sql, params_refs.as_slice())
                .map_err(sql_err("Failed to update task"))?;
            if changed == 0 {
                return Ok(None);
            }
            find_with(conn, organization_id, id)
        })
    }

    /// Tasks of an organization, optionally restricted to one project.
    pub fn list(
        &self,
        organization_id: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<Task>, PmoError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM tasks
                 WHERE organization_id = ?1 AND (?2 IS NULL OR project_id = ?2)
                 ORDER BY created_at ASC",
                TASK_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(sql_err("Task list prepare"))?;
            let rows = stmt
                .query_map(rusqlite::params![organization_id, project_id], |row| {
                    Ok(row_to_task(row))
                })
                .map_err(sql_err("Task list"))?;

            let mut tasks = Vec::new();
            for row in rows {
                tasks.push(row.map_err(|e| PmoError::Storage(e.to_string()))??);
            }
            Ok(tasks)
        })
    }
}

fn find_with(
    conn: &rusqlite::Connection,
    organization_id: &str,
    id: Uuid,
) -> Result<Option<Task>, PmoError> {
    let sql = format!(
        "SELECT {} FROM tasks WHERE id = ?1 AND organization_id = ?2",
        TASK_COLUMNS
    );
    conn.query_row(&sql, rusqlite::params![id.to_string(), organization_id], |row| {
        Ok(row_to_task(row))
    })
    .optional()
    .map_err(sql_err("Task lookup"))?
    .transpose()
}

fn row_to_task(row: &rusqlite::Row<'_>) -> Result<Task, PmoError> {
    let get = |e: rusqlite::Error| PmoError::Storage(e.to_string());
    let id: String = row.get(0).map_err(get)?;
    let source: Option<String> = row.get(8).map_err(get)?;
    let created_at: i64 = row.get(10).map_err(get)?;
    let updated_at: i64 = row.get(11).map_err(get)?;
    Ok(Task {
        id: parse_uuid(&id)?,
        organization_id: row.get(1).map_err(get)?,
        project_id: row.get(2).map_err(get)?,
        title: row.get(3).map_err(get)?,
        description: row.get(4).map_err(get)?,
        status: parse_column::<TaskStatus>(row.get(5).map_err(get)?)?,
        assignee_id: row.get(6).map_err(get)?,
        due_date: row.get(7).map_err(get)?,
        source_decision_id: source.as_deref().map(parse_uuid).transpose()?,
        created_by: row.get(9).map_err(get)?,
        created_at: from_millis(created_at),
        updated_at: from_millis(updated_at),
    })
}
