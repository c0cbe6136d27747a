use crate::{AppState, handlers, ingest::MAX_IMPORT_BYTES, uploads::MAX_UPLOAD_BYTES};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes for any signed-in caller, patient or doctor. The router returned here is
/// wrapped in `auth_middleware` by `create_router`, so an unauthenticated request is
/// rejected with 401 before any handler or query runs.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // The resolved identity and whether it carries the admin flag.
        .route("/me", get(handlers::get_me))
        // --- Clinical cases ---
        // POST /cases
        // Opens a case for the calling doctor and records a `created` audit entry.
        .route("/cases", post(handlers::create_case))
        // POST /cases/{id}/artifacts
        // Multipart artifact upload, stored inline as a data URI.
        .route(
            "/cases/{id}/artifacts",
            post(handlers::upload_case_artifact).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // POST /documents
        // Dashboard document picker: PDF or image attached to a case.
        .route(
            "/documents",
            post(handlers::upload_document).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // --- Patient data ---
        // POST /imaging
        // Multipart medical image for the caller.
        .route(
            "/imaging",
            post(handlers::upload_imaging).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // POST /health-metrics
        // One metric reading for the caller.
        .route("/health-metrics", post(handlers::save_health_metric))
        // GET /data/*
        // Paginated feeds backing the patient dashboard charts.
        .route("/data/metrics", get(handlers::data_metrics))
        .route("/data/predictions", get(handlers::data_predictions))
        .route("/data/patients", get(handlers::data_patients))
        // POST /data/csv-ingest
        // Bulk dataset upsert. The handler itself requires an admin.
        .route(
            "/data/csv-ingest",
            post(handlers::csv_ingest).layer(DefaultBodyLimit::max(MAX_IMPORT_BYTES)),
        )
}
