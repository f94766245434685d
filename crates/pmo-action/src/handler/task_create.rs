//! TASK_CREATE action handler.
//!
//! Creates one task per decision. The task row is keyed by the decision id,
//! so a replayed or racing execution returns the task created first.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use pmo_core::types::{ActionType, TaskStatus};
use pmo_storage::{Database, NewTask, ProjectRepository, TaskRepository};

use crate::error::ActionError;
use crate::handler::ActionHandler;
use crate::types::{ActionPayload, ActionResult, HandlerContext};

pub(crate) const MAX_TITLE_LEN: usize = 500;

/// Handler for task creation.
pub struct TaskCreateHandler {
    tasks: TaskRepository,
    projects: ProjectRepository,
}

impl TaskCreateHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            tasks: TaskRepository::new(Arc::clone(&db)),
            projects: ProjectRepository::new(db),
        }
    }
}

struct TaskFields {
    title: String,
    description: Option<String>,
    project_id: Option<String>,
    assignee_id: Option<String>,
    due_date: Option<String>,
    status: TaskStatus,
}

fn parse_fields(payload: &ActionPayload) -> Result<TaskFields, ActionError> {
    if !payload.data.is_object() {
        return Err(ActionError::InvalidPayload(
            "payload must be a JSON object".to_string(),
        ));
    }
    let field = |key: &str| {
        payload
            .opt_str(key)
            .map(|v| v.map(str::to_string))
            .map_err(ActionError::InvalidPayload)
    };

    let title = field("title")?
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ActionError::InvalidPayload("title must not be empty".to_string()))?;
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ActionError::InvalidPayload(format!(
            "title exceeds {} characters",
            MAX_TITLE_LEN
        )));
    }

    let due_date = field("due_date")?;
    if let Some(ref due) = due_date {
        validate_due_date(due)?;
    }

    let status = match field("status")? {
        Some(s) => s.parse::<TaskStatus>().map_err(ActionError::InvalidPayload)?,
        None => TaskStatus::Todo,
    };

    Ok(TaskFields {
        title,
        description: field("description")?,
        project_id: field("project_id")?,
        assignee_id: field("assignee_id")?,
        due_date,
        status,
    })
}

pub(crate) fn validate_due_date(due: &str) -> Result<(), ActionError> {
    NaiveDate::parse_from_str(due, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ActionError::InvalidPayload(format!("due_date '{}' is not YYYY-MM-DD", due)))
}

#[async_trait]
impl ActionHandler for TaskCreateHandler {
    fn action_type(&self) -> ActionType {
        ActionType::TaskCreate
    }

    fn validate(&self, payload: &ActionPayload) -> Result<(), ActionError> {
        parse_fields(payload).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &HandlerContext,
        payload: &ActionPayload,
    ) -> Result<ActionResult, ActionError> {
        let fields = parse_fields(payload)?;

        if let Some(ref project_id) = fields.project_id {
            if self.projects.find(&ctx.organization_id, project_id)?.is_none() {
                return Err(ActionError::HandlerFailed(format!(
                    "project '{}' not found",
                    project_id
                )));
            }
        }

        let (task, created) = self.tasks.create_for_decision(&NewTask {
            organization_id: ctx.organization_id.clone(),
            project_id: fields.project_id,
            title: fields.title,
            description: fields.description,
            status: fields.status,
            assignee_id: fields.assignee_id,
            due_date: fields.due_date,
            source_decision_id: ctx.decision_id,
            created_by: ctx.executed_by.clone(),
        })?;

        tracing::info!(
            task_id = %task.id,
            decision_id = %ctx.decision_id,
            correlation_id = %ctx.correlation_id,
            created,
            "Task created"
        );

        Ok(ActionResult {
            message: format!("Task created: {}", task.title),
            output: serde_json::json!({
                "task_id": task.id,
                "title": task.title,
                "project_id": task.project_id,
                "status": task.status,
            }),
        })
    }

    fn describe(&self, payload: &ActionPayload) -> String {
        let title = payload
            .data
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("<untitled>");
        format!("Create task: {}", title)
    }
}
