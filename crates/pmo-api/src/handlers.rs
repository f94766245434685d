//! Route handler functions for all API endpoints.
//!
//! Each handler takes the authenticated `Actor` from the request extensions,
//! calls one pipeline service, and returns a JSON response.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use pmo_action::{DecisionFilters, DecisionRequest, NewProposal};
use pmo_core::access::Actor;
use pmo_core::types::{ActionDecision, ActionExecution, Proposal};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecisionRecordedResponse {
    pub message: String,
    pub audit_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    pub execution_id: Uuid,
    pub already_executed: bool,
    pub result: serde_json::Value,
}

fn parse_decision_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::BadRequest(format!("Invalid decision id: {}", raw)))
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// POST /proposals - register a proposal (AI worker / policy engine).
pub async fn create_proposal(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<NewProposal>, JsonRejection>,
) -> Result<(StatusCode, Json<Proposal>), ApiError> {
    let Json(new) = body?;
    let proposal = state.proposals.register_proposal(&actor, new)?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

/// GET /proposals/{id}
pub async fn get_proposal(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<Proposal>, ApiError> {
    Ok(Json(state.proposals.get_proposal(&actor, &id)?))
}

/// POST /decisions - record a decision on a proposal.
pub async fn record_decision(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DecisionRecordedResponse>), ApiError> {
    let Json(request) = body?;
    let recorded = state.recorder.record_decision(&actor, request)?;
    Ok((
        StatusCode::CREATED,
        Json(DecisionRecordedResponse {
            message: "Decision recorded".to_string(),
            audit_id: recorded.decision_id,
        }),
    ))
}

/// POST /decisions/{id}/execute - apply an approved decision exactly once.
pub async fn execute_decision(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let decision_id = parse_decision_id(&id)?;
    let outcome = state.dispatcher.execute_decision(&actor, decision_id).await?;
    Ok(Json(ExecuteResponse {
        success: true,
        execution_id: outcome.execution_id,
        already_executed: outcome.already_executed,
        result: outcome.result,
    }))
}

/// GET /decisions/audit - organization-scoped decision history.
pub async fn list_audit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(filters): Query<DecisionFilters>,
) -> Result<Json<Vec<ActionDecision>>, ApiError> {
    Ok(Json(state.audit.list_decisions(&actor, &filters)?))
}

/// GET /decisions/{id}
pub async fn get_decision(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<ActionDecision>, ApiError> {
    let decision_id = parse_decision_id(&id)?;
    Ok(Json(state.audit.get_decision(&actor, decision_id)?))
}

/// GET /decisions/{id}/executions
pub async fn list_executions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ActionExecution>>, ApiError> {
    let decision_id = parse_decision_id(&id)?;
    Ok(Json(state.audit.list_executions(&actor, decision_id)?))
}

/// GET /stream - SSE stream of pipeline events for the caller's organization.
pub async fn stream(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send> {
    let rx = state.event_tx.subscribe();
    let organization_id = actor.organization_id;
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.organization_id() == organization_id => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().event(event.name()).data(data)))
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "SSE subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use pmo_core::access::Role;
    use pmo_core::config::{ApiTokenConfig, PmoConfig};
    use pmo_storage::Database;
    use std::sync::Arc;
    use tower::ServiceExt;

    const TEST_TOKEN: &str = "admin-token-000001";

    fn make_state() -> AppState {
        let mut config = PmoConfig::default();
        config.auth.tokens.push(ApiTokenConfig {
            token: TEST_TOKEN.to_string(),
            user_id: "admin-1".to_string(),
            organization_id: "org-a".to_string(),
            role: Role::Admin,
        });
        AppState::new(config, Arc::new(Database::in_memory().unwrap()))
    }

    fn make_app() -> axum::Router {
        crate::create_router(make_state())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let resp = make_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let resp = make_app()
            .oneshot(
                Request::post("/decisions")
                    .header("authorization", format!("Bearer {}", TEST_TOKEN))
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_decision_id_is_bad_request() {
        let resp = make_app()
            .oneshot(
                Request::post("/decisions/not-a-uuid/execute")
                    .header("authorization", format!("Bearer {}", TEST_TOKEN))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_execute_response_is_camel_case() {
        let json = serde_json::to_value(ExecuteResponse {
            success: true,
            execution_id: Uuid::nil(),
            already_executed: false,
            result: serde_json::json!({}),
        })
        .unwrap();
        assert!(json.get("executionId").is_some());
        assert!(json.get("alreadyExecuted").is_some());
    }
}
