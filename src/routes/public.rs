use crate::AppState;
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints reachable without a session. Only the liveness probe lives here; every
/// data route requires at least an authenticated caller.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for the load balancer. Touches neither auth nor the database.
        .route("/health", get(|| async { "ok" }))
}
