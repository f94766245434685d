//! PMO API crate - axum HTTP server for the decision pipeline.
//!
//! Exposes proposal intake, decision recording, idempotent execution, the
//! audit trail, and a per-organization SSE stream of pipeline events.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
