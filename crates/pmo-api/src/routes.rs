//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, bearer
//! authentication, rate limiting, and the pipeline endpoints.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use pmo_core::config::PmoConfig;
use pmo_core::error::PmoError;

use crate::handlers;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

fn cors_origins(config: &PmoConfig) -> Vec<HeaderValue> {
    let configured: Vec<String> = if config.server.cors_origins.is_empty() {
        let port = config.server.port;
        vec![
            format!("http://127.0.0.1:{}", port),
            format!("http://localhost:{}", port),
        ]
    } else {
        config.server.cors_origins.clone()
    };

    configured
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(cors_origins(&state.config)))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    // Routes that do NOT require authentication.
    let public_routes = Router::new().route("/health", get(handlers::health));

    let limiter = RateLimiter::new(state.config.server.requests_per_second);

    let rate_limited_routes = Router::new()
        .route("/proposals", post(handlers::create_proposal))
        .route("/proposals/{id}", get(handlers::get_proposal))
        .route("/decisions", post(handlers::record_decision))
        .route("/decisions/audit", get(handlers::list_audit))
        .route("/decisions/{id}", get(handlers::get_decision))
        .route("/decisions/{id}/execute", post(handlers::execute_decision))
        .route("/decisions/{id}/executions", get(handlers::list_executions))
        .layer(axum::middleware::from_fn(
            crate::rate_limit::rate_limit_middleware,
        ))
        .layer(axum::Extension(limiter));

    // SSE stream exempt from rate limiting.
    let stream_routes = Router::new().route("/stream", get(handlers::stream));

    // Combine all protected routes behind auth.
    let protected_routes =
        rate_limited_routes
            .merge(stream_routes)
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                crate::auth::require_auth,
            ));

    let body_limit = state.config.server.max_body_bytes;

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured host and port.
pub async fn start_server(state: AppState) -> Result<(), PmoError> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PmoError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| PmoError::Api(format!("Server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
