use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod cases;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod pagination;
pub mod query;
pub mod repository;
pub mod stats;
pub mod uploads;

// Routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::{IdentityState, JwtIdentityProvider, SupabaseIdentityProvider};
pub use config::AppConfig;
pub use error::ApiError;
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for every handler, served at `/api-docs/openapi.json` and browsable
/// at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_me, handlers::set_admin, handlers::create_case,
        handlers::upload_case_artifact, handlers::upload_document, handlers::upload_imaging,
        handlers::save_health_metric, handlers::data_metrics, handlers::data_predictions,
        handlers::data_patients, handlers::csv_ingest, handlers::get_admin_stats,
        handlers::export_zip, handlers::list_appointments,
        handlers::get_appointment_detail, handlers::list_metrics, handlers::list_predictions,
        handlers::get_prediction_detail, handlers::list_patients, handlers::list_doctors,
        handlers::get_doctor_patients, handlers::list_imaging, handlers::list_cases,
        handlers::get_case_detail, handlers::list_reference_images
    ),
    components(
        schemas(
            models::Profile, models::Appointment, models::Patient, models::Doctor,
            models::HealthMetric, models::Prediction, models::PredictionSummary,
            models::RiskPrediction, models::MedicalImage, models::ClinicalCase,
            models::CaseAuditEntry, models::CaseArtifact, models::ReferenceImage,
            models::CreateCaseRequest, models::SaveMetricRequest, models::DashboardStats,
            models::SetAdminResponse, models::MeResponse, models::AppointmentDetail,
            models::PredictionDetail, models::DoctorPatients, models::CaseDetail,
            models::DocumentUploadResponse, models::ImageUploadResponse,
            models::SavedMetricResponse, models::AppointmentList, models::MetricList,
            models::PredictionList, models::RiskPredictionList, models::PatientList,
            models::DoctorList, models::ImageList, models::CaseList,
            models::ReferenceImageList, models::ArtifactUploadForm, models::DocumentUploadForm,
            models::ImagingUploadForm, models::CsvIngestForm, models::IngestResponse,
            pagination::Pagination,
        )
    ),
    tags(
        (name = "health-dashboard", description = "Healthcare dashboard API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request needs, shared immutably across all requests: the persistence
/// handle, the session provider and the loaded configuration.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub identity: IdentityState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards `authenticated_routes`. Extracting `AuthUser` rejects with 401 on failure;
/// on success the identity is left in the request extensions, so the handler's own
/// `AuthUser` does not resolve the session a second time.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the three route tiers, the documentation endpoints and the
/// observability layers around them.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin gating happens in the `AdminUser` extractor of each handler.
        .nest("/admin", admin::admin_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// Span for one request, correlated by `x-request-id`. Query strings are left out of
/// the span since filters can carry patient identifiers.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        path = %request.uri().path(),
        req_id = %request_id,
    )
}
