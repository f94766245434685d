//! TASK_UPDATE action handler.

use std::sync::Arc;

use async_trait::async_trait;
use pmo_core::types::{ActionType, TaskStatus};
use pmo_storage::{Database, TaskPatch, TaskRepository};
use uuid::Uuid;

use crate::error::ActionError;
use crate::handler::task_create::{validate_due_date, MAX_TITLE_LEN};
use crate::handler::ActionHandler;
use crate::types::{ActionPayload, ActionResult, HandlerContext};

/// Handler for partial task updates. Re-applying the same patch leaves the
/// task in the same state, which keeps replays harmless.
pub struct TaskUpdateHandler {
    tasks: TaskRepository,
}

impl TaskUpdateHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            tasks: TaskRepository::new(db),
        }
    }
}

fn parse_update(payload: &ActionPayload) -> Result<(Uuid, TaskPatch), ActionError> {
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

    let task_id = field("task_id")?
        .ok_or_else(|| ActionError::InvalidPayload("task_id is required".to_string()))?;
    let task_id = Uuid::parse_str(&task_id)
        .map_err(|_| ActionError::InvalidPayload(format!("task_id '{}' is not a UUID", task_id)))?;

    let title = field("title")?.map(|t| t.trim().to_string());
    if let Some(ref t) = title {
        if t.is_empty() || t.chars().count() > MAX_TITLE_LEN {
            return Err(ActionError::InvalidPayload(format!(
                "title must be 1-{} characters",
                MAX_TITLE_LEN
            )));
        }
    }

    let due_date = field("due_date")?;
    if let Some(ref due) = due_date {
        validate_due_date(due)?;
    }

    let status = field("status")?
        .map(|s| s.parse::<TaskStatus>())
        .transpose()
        .map_err(ActionError::InvalidPayload)?;

    let patch = TaskPatch {
        title,
        description: field("description")?,
        status,
        assignee_id: field("assignee_id")?,
        due_date,
    };
    if patch.is_empty() {
        return Err(ActionError::InvalidPayload(
            "no updatable fields supplied".to_string(),
        ));
    }

    Ok((task_id, patch))
}

fn changed_fields(patch: &TaskPatch) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if patch.title.is_some() {
        fields.push("title");
    }
    if patch.description.is_some() {
        fields.push("description");
    }
    if patch.status.is_some() {
        fields.push("status");
    }
    if patch.assignee_id.is_some() {
        fields.push("assignee_id");
    }
    if patch.due_date.is_some() {
        fields.push("due_date");
    }
    fields
}

#[async_trait]
impl ActionHandler for TaskUpdateHandler {
    fn action_type(&self) -> ActionType {
        ActionType::TaskUpdate
    }

    fn validate(&self, payload: &ActionPayload) -> Result<(), ActionError> {
        parse_update(payload).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &HandlerContext,
        payload: &ActionPayload,
    ) -> Result<ActionResult, ActionError> {
        let (task_id, patch) = parse_update(payload)?;

        let task = self
            .tasks
            .update(&ctx.organization_id, task_id, &patch)?
            .ok_or_else(|| ActionError::HandlerFailed(format!("task {} not found", task_id)))?;

        tracing::info!(
            task_id = %task.id,
            decision_id = %ctx.decision_id,
            correlation_id = %ctx.correlation_id,
            "Task updated"
        );

        Ok(ActionResult {
            message: format!("Task updated: {}", task.title),
            output: serde_json::json!({
                "task_id": task.id,
                "updated_fields": changed_fields(&patch),
                "status": task.status,
            }),
        })
    }

    fn describe(&self, payload: &ActionPayload) -> String {
        match parse_update(payload) {
            Ok((id, patch)) => format!("Update task {}: {}", id, changed_fields(&patch).join(", ")),
            Err(_) => "Update task".to_string(),
        }
    }
}
