use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// Nested under `/admin`. Every handler except `set-admin` takes the `AdminUser`
/// extractor, which authenticates the caller and then requires `is_admin` on their
/// profile. Both checks complete before the handler issues any query.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        // Concurrent collection counts for the dashboard header.
        .route("/stats", get(handlers::get_admin_stats))
        // GET /admin/export-zip
        // Clinical collections as CSV files in one zip download.
        .route("/export-zip", get(handlers::export_zip))
        // POST /admin/set-admin
        // Bootstrap elevation. Authenticated only: the caller is not an admin yet.
        .route("/set-admin", post(handlers::set_admin))
        .route("/appointments", get(handlers::list_appointments))
        .route("/appointments/{id}", get(handlers::get_appointment_detail))
        .route("/metrics", get(handlers::list_metrics))
        .route("/predictions", get(handlers::list_predictions))
        .route("/predictions/{id}", get(handlers::get_prediction_detail))
        .route("/patients", get(handlers::list_patients))
        .route("/doctors", get(handlers::list_doctors))
        .route("/doctors/{id}/patients", get(handlers::get_doctor_patients))
        .route("/imaging", get(handlers::list_imaging))
        .route("/cases", get(handlers::list_cases))
        .route("/cases/{id}", get(handlers::get_case_detail))
        // GET /admin/reference-images?disease=...
        // Up to five reference images whose disease name contains the term.
        .route("/reference-images", get(handlers::list_reference_images))
}
