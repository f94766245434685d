//! Integration tests for the PMO decision API.
//!
//! Drives the full router (auth, rate limiting, handlers, storage) through
//! `oneshot` requests. Each test builds its own in-memory state.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use pmo_api::create_router;
use pmo_api::handlers::HealthResponse;
use pmo_api::state::AppState;
use pmo_core::access::Role;
use pmo_core::config::{ApiTokenConfig, PmoConfig};
use pmo_core::types::Project;
use pmo_storage::{Database, ProjectRepository, TaskRepository};

// =============================================================================
// Helpers
// =============================================================================

const MANAGER_TOKEN: &str = "manager-token-0001";
const VIEWER_TOKEN: &str = "viewer-token-00001";
const SYSTEM_TOKEN: &str = "system-token-00001";
const OTHER_ORG_TOKEN: &str = "org-b-manager-token";

fn token(token: &str, user_id: &str, organization_id: &str, role: Role) -> ApiTokenConfig {
    ApiTokenConfig {
        token: token.to_string(),
        user_id: user_id.to_string(),
        organization_id: organization_id.to_string(),
        role,
    }
}

/// Fresh state over an in-memory database with one project per org.
fn make_state() -> AppState {
    let mut config = PmoConfig::default();
    config.auth.tokens = vec![
        token(MANAGER_TOKEN, "manager-1", "org-a", Role::Manager),
        token(VIEWER_TOKEN, "viewer-1", "org-a", Role::Viewer),
        token(SYSTEM_TOKEN, "policy-worker", "org-a", Role::System),
        token(OTHER_ORG_TOKEN, "manager-b", "org-b", Role::Manager),
    ];
    let db = Arc::new(Database::in_memory().unwrap());
    let projects = ProjectRepository::new(Arc::clone(&db));
    for (id, org) in [("proj-a", "org-a"), ("proj-b", "org-b")] {
        projects
            .save(&Project {
                id: id.to_string(),
                organization_id: org.to_string(),
                name: format!("Project {}", id),
                created_at: Utc::now(),
            })
            .unwrap();
    }
    AppState::new(config, db)
}

fn get_as(token: &str, uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn post_empty_as(token: &str, uri: &str) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn post_json_as(token: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read full response body as JSON.
async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Register a TASK_CREATE proposal as the policy engine.
async fn seed_proposal(state: &AppState, id: &str, title: &str) {
    let resp = create_router(state.clone())
        .oneshot(post_json_as(
            SYSTEM_TOKEN,
            "/proposals",
            &json!({
                "id": id,
                "action_type": "TASK_CREATE",
                "payload": { "title": title, "project_id": "proj-a" },
                "correlation_id": format!("corr-{}", id),
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

/// Record a decision as the org-a manager, returning the audit id.
async fn decide(state: &AppState, proposal_id: &str, decision: &str) -> String {
    let resp = create_router(state.clone())
        .oneshot(post_json_as(
            MANAGER_TOKEN,
            "/decisions",
            &json!({
                "proposal_id": proposal_id,
                "decision": decision,
                "reason": "Necessary for growth",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let json = body_json(resp).await;
    json["audit_id"].as_str().unwrap().to_string()
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let resp = create_router(make_state())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health.status, "healthy");
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let resp = create_router(make_state())
        .oneshot(Request::get("/decisions/audit").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "unauthorized");
}

#[tokio::test]
async fn test_unknown_token_is_unauthorized() {
    let resp = create_router(make_state())
        .oneshot(get_as("not-a-configured-token", "/decisions/audit"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Proposals
// =============================================================================

#[tokio::test]
async fn test_proposal_roundtrip_and_duplicate() {
    let state = make_state();
    seed_proposal(&state, "ap-001", "Draft charter").await;

    let resp = create_router(state.clone())
        .oneshot(get_as(MANAGER_TOKEN, "/proposals/ap-001"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["action_type"], "TASK_CREATE");
    assert_eq!(json["correlation_id"], "corr-ap-001");
    assert_eq!(json["organization_id"], "org-a");

    let resp = create_router(state)
        .oneshot(post_json_as(
            SYSTEM_TOKEN,
            "/proposals",
            &json!({
                "id": "ap-001",
                "action_type": "TASK_CREATE",
                "payload": { "title": "Again" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_manager_cannot_register_proposals() {
    let resp = create_router(make_state())
        .oneshot(post_json_as(
            MANAGER_TOKEN,
            "/proposals",
            &json!({
                "id": "ap-009",
                "action_type": "TASK_CREATE",
                "payload": { "title": "Nope" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Decisions
// =============================================================================

#[tokio::test]
async fn test_record_decision_appears_in_audit() {
    let state = make_state();
    seed_proposal(&state, "ap-001", "Kickoff meeting").await;
    let audit_id = decide(&state, "ap-001", "APPROVED").await;

    let resp = create_router(state.clone())
        .oneshot(get_as(VIEWER_TOKEN, "/decisions/audit?proposal_id=ap-001"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], audit_id.as_str());
    assert_eq!(rows[0]["decision"], "APPROVED");
    assert_eq!(rows[0]["decided_by"], "manager-1");
    assert_eq!(rows[0]["reason"], "Necessary for growth");
    assert_eq!(rows[0]["original_payload"]["title"], "Kickoff meeting");

    let resp = create_router(state)
        .oneshot(get_as(MANAGER_TOKEN, &format!("/decisions/{}", audit_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["correlation_id"], "corr-ap-001");
}

#[tokio::test]
async fn test_invalid_decision_kind_is_bad_request() {
    let state = make_state();
    seed_proposal(&state, "ap-001", "Kickoff meeting").await;

    let resp = create_router(state)
        .oneshot(post_json_as(
            MANAGER_TOKEN,
            "/decisions",
            &json!({ "proposal_id": "ap-001", "decision": "INVALID_STATUS" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("Invalid decision"));
}

#[tokio::test]
async fn test_viewer_cannot_record_decision() {
    let state = make_state();
    seed_proposal(&state, "ap-001", "Kickoff meeting").await;

    let resp = create_router(state)
        .oneshot(post_json_as(
            VIEWER_TOKEN,
            "/decisions",
            &json!({ "proposal_id": "ap-001", "decision": "APPROVED" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["error"], "forbidden");
}

#[tokio::test]
async fn test_decision_on_unknown_proposal_is_not_found() {
    let resp = create_router(make_state())
        .oneshot(post_json_as(
            MANAGER_TOKEN,
            "/decisions",
            &json!({ "proposal_id": "ap-404", "decision": "APPROVED" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Execution
// =============================================================================

#[tokio::test]
async fn test_execute_creates_task_once() {
    let state = make_state();
    seed_proposal(&state, "ap-001", "Test Integration Task").await;
    let audit_id = decide(&state, "ap-001", "APPROVED").await;
    let uri = format!("/decisions/{}/execute", audit_id);

    let resp = create_router(state.clone())
        .oneshot(post_empty_as(MANAGER_TOKEN, &uri))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let first = body_json(resp).await;
    assert_eq!(first["success"], true);
    assert_eq!(first["alreadyExecuted"], false);
    assert_eq!(first["result"]["title"], "Test Integration Task");

    let resp = create_router(state.clone())
        .oneshot(post_empty_as(MANAGER_TOKEN, &uri))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let second = body_json(resp).await;
    assert_eq!(second["alreadyExecuted"], true);
    assert_eq!(second["executionId"], first["executionId"]);

    let tasks = TaskRepository::new(Arc::clone(&state.database))
        .list("org-a", None)
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Test Integration Task");
    assert_eq!(tasks[0].project_id.as_deref(), Some("proj-a"));

    let resp = create_router(state)
        .oneshot(get_as(
            VIEWER_TOKEN,
            &format!("/decisions/{}/executions", audit_id),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let executions = body_json(resp).await;
    assert_eq!(executions.as_array().unwrap().len(), 1);
    assert_eq!(executions[0]["status"], "SUCCESS");
}

#[tokio::test]
async fn test_execute_rejected_decision_is_bad_request() {
    let state = make_state();
    seed_proposal(&state, "ap-001", "Kickoff meeting").await;
    let audit_id = decide(&state, "ap-001", "REJECTED").await;

    let resp = create_router(state.clone())
        .oneshot(post_empty_as(
            MANAGER_TOKEN,
            &format!("/decisions/{}/execute", audit_id),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let tasks = TaskRepository::new(Arc::clone(&state.database))
        .list("org-a", None)
        .unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn test_superseded_decision_is_conflict() {
    let state = make_state();
    seed_proposal(&state, "ap-001", "Kickoff meeting").await;
    let first = decide(&state, "ap-001", "APPROVED").await;
    let _second = decide(&state, "ap-001", "REJECTED").await;

    let resp = create_router(state)
        .oneshot(post_empty_as(
            MANAGER_TOKEN,
            &format!("/decisions/{}/execute", first),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_modified_decision_applies_override() {
    let state = make_state();
    seed_proposal(&state, "ap-001", "Original title").await;

    let resp = create_router(state.clone())
        .oneshot(post_json_as(
            MANAGER_TOKEN,
            "/decisions",
            &json!({
                "proposal_id": "ap-001",
                "decision": "MODIFIED",
                "reason": "Sharper title",
                "original_payload": { "title": "Edited title", "project_id": "proj-a" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let audit_id = body_json(resp).await["audit_id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = create_router(state)
        .oneshot(post_empty_as(
            MANAGER_TOKEN,
            &format!("/decisions/{}/execute", audit_id),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["result"]["title"], "Edited title");
}

#[tokio::test]
async fn test_handler_failure_reports_execution_id() {
    let state = make_state();
    let resp = create_router(state.clone())
        .oneshot(post_json_as(
            SYSTEM_TOKEN,
            "/proposals",
            &json!({
                "id": "ap-002",
                "action_type": "TASK_CREATE",
                "payload": { "title": "Orphan", "project_id": "proj-missing" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let audit_id = decide(&state, "ap-002", "APPROVED").await;

    let resp = create_router(state)
        .oneshot(post_empty_as(
            MANAGER_TOKEN,
            &format!("/decisions/{}/execute", audit_id),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "execution_failed");
    assert!(json["details"]["executionId"].is_string());
}

#[tokio::test]
async fn test_unknown_decision_is_not_found() {
    let resp = create_router(make_state())
        .oneshot(post_empty_as(
            MANAGER_TOKEN,
            &format!("/decisions/{}/execute", uuid::Uuid::new_v4()),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Tenant isolation
// =============================================================================

#[tokio::test]
async fn test_other_organization_sees_nothing() {
    let state = make_state();
    seed_proposal(&state, "ap-001", "Kickoff meeting").await;
    let audit_id = decide(&state, "ap-001", "APPROVED").await;

    let resp = create_router(state.clone())
        .oneshot(get_as(OTHER_ORG_TOKEN, "/decisions/audit"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_json(resp).await.as_array().unwrap().is_empty());

    let resp = create_router(state.clone())
        .oneshot(get_as(OTHER_ORG_TOKEN, "/proposals/ap-001"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = create_router(state.clone())
        .oneshot(post_empty_as(
            OTHER_ORG_TOKEN,
            &format!("/decisions/{}/execute", audit_id),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let tasks = TaskRepository::new(Arc::clone(&state.database))
        .list("org-a", None)
        .unwrap();
    assert!(tasks.is_empty());
}

// =============================================================================
// Audit filters and stream
// =============================================================================

#[tokio::test]
async fn test_audit_rejects_bad_filters() {
    let state = make_state();
    for uri in [
        "/decisions/audit?limit=0",
        "/decisions/audit?since=yesterday",
        "/decisions/audit?since=2026-02-01T00:00:00Z&until=2026-01-01T00:00:00Z",
    ] {
        let resp = create_router(state.clone())
            .oneshot(get_as(MANAGER_TOKEN, uri))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[tokio::test]
async fn test_stream_requires_auth_and_serves_sse() {
    let state = make_state();
    let resp = create_router(state.clone())
        .oneshot(Request::get("/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = create_router(state)
        .oneshot(get_as(VIEWER_TOKEN, "/stream"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}
