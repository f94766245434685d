//! Execution dispatcher.
//!
//! Applies an approved decision through its registered handler and records
//! the outcome. Exactly-once is enforced by storage: the SUCCESS row is
//! guarded by a partial unique index, and the losing side of a race reads
//! the winner back instead of failing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pmo_core::access::{can, Actor, Permission};
use pmo_core::events::DomainEvent;
use pmo_core::types::{ActionDecision, ActionExecution, ExecutionStatus};
use pmo_storage::{
    Database, DecisionRepository, ExecutionInsert, ExecutionRepository, NewExecution,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{ActionError, DecisionError};
use crate::events::EventSink;
use crate::handler::ActionRegistry;
use crate::types::{ActionPayload, ActionResult, ExecutionOutcome, HandlerContext};

pub struct ExecutionDispatcher {
    decisions: DecisionRepository,
    executions: ExecutionRepository,
    registry: Arc<ActionRegistry>,
    handler_timeout: Duration,
    events: EventSink,
}

impl ExecutionDispatcher {
    pub fn new(
        db: Arc<Database>,
        registry: Arc<ActionRegistry>,
        handler_timeout: Duration,
        events: EventSink,
    ) -> Self {
        Self {
            decisions: DecisionRepository::new(Arc::clone(&db)),
            executions: ExecutionRepository::new(db),
            registry,
            handler_timeout,
            events,
        }
    }

    /// Execute a decision at most once.
    ///
    /// Order of checks: permission, existence, prior SUCCESS (replay),
    /// disposition, supersession. Only then is the handler invoked. Handler
    /// errors and timeouts are recorded as FAILED attempts; nothing is
    /// retried automatically.
    pub async fn execute_decision(
        &self,
        actor: &Actor,
        decision_id: Uuid,
    ) -> Result<ExecutionOutcome, DecisionError> {
        if !can(actor, Permission::ExecuteDecision) {
            return Err(DecisionError::Forbidden(Permission::ExecuteDecision));
        }

        let decision = self
            .decisions
            .find(&actor.organization_id, decision_id)?
            .ok_or(DecisionError::DecisionNotFound(decision_id))?;

        if let Some(existing) = self.executions.find_success(decision.id)? {
            return Ok(self.replayed(&decision, existing));
        }

        if !decision.decision.is_executable() {
            return Err(DecisionError::DecisionNotExecutable(decision.id));
        }

        if let Some(latest_id) = self
            .decisions
            .latest_for_proposal(&actor.organization_id, &decision.proposal_id)?
        {
            if latest_id != decision.id {
                return Err(DecisionError::DecisionSuperseded {
                    decision_id: decision.id,
                    latest_id,
                });
            }
        }

        let ctx = HandlerContext {
            organization_id: decision.organization_id.clone(),
            decision_id: decision.id,
            correlation_id: decision.correlation_id.clone(),
            executed_by: actor.audit_identity().to_string(),
        };

        match self.run_handler(&decision, &ctx).await {
            Ok(result) => self.record_success(&decision, &ctx, result),
            Err(e) => Err(self.record_failure(&decision, &ctx, e)?),
        }
    }

    async fn run_handler(
        &self,
        decision: &ActionDecision,
        ctx: &HandlerContext,
    ) -> Result<ActionResult, ActionError> {
        let handler = self
            .registry
            .get(decision.action_type)
            .ok_or(ActionError::UnregisteredHandler(decision.action_type))?;

        let payload = ActionPayload::new(decision.effective_payload().clone());

        match tokio::time::timeout(self.handler_timeout, handler.execute(ctx, &payload)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout(self.handler_timeout.as_secs())),
        }
    }

    fn record_success(
        &self,
        decision: &ActionDecision,
        ctx: &HandlerContext,
        result: ActionResult,
    ) -> Result<ExecutionOutcome, DecisionError> {
        let inserted = self.executions.insert(&new_execution(
            decision,
            ctx,
            ExecutionStatus::Success,
            result.output,
        ))?;

        match inserted {
            ExecutionInsert::Inserted(execution) => {
                info!(
                    decision_id = %decision.id,
                    execution_id = %execution.id,
                    correlation_id = %decision.correlation_id,
                    action_type = %decision.action_type,
                    attempt = execution.attempt,
                    "Decision executed"
                );
                self.events.emit(DomainEvent::ExecutionSucceeded {
                    organization_id: decision.organization_id.clone(),
                    decision_id: decision.id,
                    execution_id: execution.id,
                    action_type: decision.action_type,
                    correlation_id: decision.correlation_id.clone(),
                });
                Ok(outcome(execution, false))
            }
            // Lost a race against a concurrent execution of the same decision.
            ExecutionInsert::DuplicateSuccess(existing) => Ok(self.replayed(decision, existing)),
        }
    }

    fn record_failure(
        &self,
        decision: &ActionDecision,
        ctx: &HandlerContext,
        err: ActionError,
    ) -> Result<DecisionError, DecisionError> {
        let message = err.to_string();
        let inserted = self.executions.insert(&new_execution(
            decision,
            ctx,
            ExecutionStatus::Failed,
            serde_json::json!({ "error": message }),
        ))?;

        let execution = match inserted {
            ExecutionInsert::Inserted(execution) | ExecutionInsert::DuplicateSuccess(execution) => {
                execution
            }
        };

        error!(
            decision_id = %decision.id,
            execution_id = %execution.id,
            correlation_id = %decision.correlation_id,
            attempt = execution.attempt,
            error = %message,
            "Decision execution failed"
        );
        self.events.emit(DomainEvent::ExecutionFailed {
            organization_id: decision.organization_id.clone(),
            decision_id: decision.id,
            execution_id: execution.id,
            correlation_id: decision.correlation_id.clone(),
            error: message.clone(),
        });

        Ok(DecisionError::ExecutionHandlerFailure {
            execution_id: execution.id,
            message,
        })
    }

    fn replayed(&self, decision: &ActionDecision, existing: ActionExecution) -> ExecutionOutcome {
        info!(
            decision_id = %decision.id,
            execution_id = %existing.id,
            correlation_id = %decision.correlation_id,
            "Decision already executed, returning prior result"
        );
        self.events.emit(DomainEvent::ExecutionReplayed {
            organization_id: decision.organization_id.clone(),
            decision_id: decision.id,
            execution_id: existing.id,
            correlation_id: decision.correlation_id.clone(),
        });
        outcome(existing, true)
    }
}

fn new_execution(
    decision: &ActionDecision,
    ctx: &HandlerContext,
    status: ExecutionStatus,
    result: serde_json::Value,
) -> NewExecution {
    NewExecution {
        id: Uuid::new_v4(),
        decision_id: decision.id,
        proposal_id: decision.proposal_id.clone(),
        action_type: decision.action_type,
        organization_id: decision.organization_id.clone(),
        correlation_id: decision.correlation_id.clone(),
        status,
        result,
        executed_by: ctx.executed_by.clone(),
        created_at: Utc::now(),
    }
}

fn outcome(execution: ActionExecution, already_executed: bool) -> ExecutionOutcome {
    ExecutionOutcome {
        execution_id: execution.id,
        already_executed,
        status: execution.status,
        attempt: execution.attempt,
        result: execution.result,
    }
}
