use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::pagination::Pagination;

// --- Core Application Schemas (Mapped to Database) ---

/// Profile
///
/// One row per identity in `public.user_profiles`. Holds the single privilege flag
/// consulted by the admin gate.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Profile {
    // FK to the external auth.users table.
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub is_admin: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// NewProfile
///
/// Insert payload used by the bootstrap elevation when no profile exists yet.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub user_id: Uuid,
    pub full_name: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub appointment_type: Option<String>,
    #[ts(type = "string | null")]
    pub appointment_date: Option<DateTime<Utc>>,
    // 'scheduled' | 'completed' | 'cancelled'
    pub status: Option<String>,
    pub notes: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    #[ts(type = "string | null")]
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub blood_type: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    // Chest X-ray or other scan attached to the patient record.
    pub scan_image_url: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Doctor {
    pub id: Uuid,
    // The auth identity that acts as this doctor.
    pub user_id: Option<Uuid>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
    pub clinic_address: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct HealthMetric {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub metric_type: String,
    pub value: f64,
    pub unit: Option<String>,
    #[ts(type = "string")]
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHealthMetric {
    pub user_id: Uuid,
    pub metric_type: String,
    pub value: f64,
    pub unit: Option<String>,
}

/// Prediction
///
/// Full row from `public.predictions`, as shown on the admin detail page.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Prediction {
    pub id: Uuid,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub predicted_disease: Option<String>,
    pub confidence_score: Option<f64>,
    pub severity_level: Option<i32>,
    pub explanation: Option<String>,
    #[ts(type = "Record<string, unknown> | null")]
    #[schema(value_type = Option<Object>)]
    pub environmental_factors: Option<Value>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// PredictionListRow
///
/// Internal row for the admin prediction listing: a prediction joined with the
/// linked patient's scan image. Never serialized directly, see `PredictionSummary`.
#[derive(Debug, Clone, FromRow, Default)]
pub struct PredictionListRow {
    pub id: Uuid,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub predicted_disease: Option<String>,
    pub confidence_score: Option<f64>,
    pub severity_level: Option<i32>,
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scan_image_url: Option<String>,
}

/// PredictionSummary
///
/// UI-ready listing entry. Missing values are replaced with display defaults and the
/// numeric severity is mapped onto a named risk level.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct PredictionSummary {
    pub id: Uuid,
    pub predicted_disease: String,
    pub confidence_score: f64,
    pub risk_level: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub explanation: String,
    #[serde(rename = "hasXray")]
    pub has_xray: bool,
}

/// Maps a stored severity (1..=3) to its label. A missing severity counts as 1.
pub fn risk_level(severity: Option<i32>) -> &'static str {
    match severity.unwrap_or(1) {
        // 0 is falsy upstream and falls back to the lowest band.
        0 | 1 => "low",
        2 => "medium",
        3 => "high",
        _ => "unknown",
    }
}

impl From<PredictionListRow> for PredictionSummary {
    fn from(row: PredictionListRow) -> Self {
        let confidence = row.confidence_score.unwrap_or(0.0).clamp(0.0, 1.0);
        Self {
            id: row.id,
            predicted_disease: row
                .predicted_disease
                .unwrap_or_else(|| "Unknown Disease".to_string()),
            confidence_score: confidence,
            risk_level: risk_level(row.severity_level).to_string(),
            created_at: row.created_at,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            explanation: row.explanation.unwrap_or_default(),
            has_xray: row.scan_image_url.is_some_and(|url| !url.is_empty()),
        }
    }
}

/// RiskPrediction
///
/// Row from `public.health_risk_predictions`, the per-patient risk scores.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct RiskPrediction {
    pub id: Uuid,
    pub patient_id: Option<Uuid>,
    pub disease_name: Option<String>,
    pub risk_score: Option<f64>,
    pub confidence: Option<f64>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// MedicalImage
///
/// Row from `public.medical_imaging`. `image_url` holds an inline data URI.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct MedicalImage {
    pub id: Uuid,
    pub user_id: Uuid,
    // 'xray' | 'ct_scan' | 'mri' | 'ultrasound' | 'radiograph' | 'other'
    pub image_type: String,
    pub body_part: String,
    #[ts(type = "string")]
    pub image_date: NaiveDate,
    pub image_url: String,
    pub image_size_bytes: Option<i64>,
    pub mime_type: Option<String>,
    pub ordering_provider: Option<String>,
    pub indication: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMedicalImage {
    pub user_id: Uuid,
    pub image_type: String,
    pub body_part: String,
    pub image_date: NaiveDate,
    pub image_url: String,
    pub image_size_bytes: i64,
    pub mime_type: String,
    pub ordering_provider: Option<String>,
    pub indication: Option<String>,
}

/// ClinicalCase
///
/// Row from `public.clinical_cases`. `case_number` is the human-readable
/// `CASE-<millis>` identifier.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ClinicalCase {
    pub id: Uuid,
    pub case_number: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub case_title: String,
    pub case_description: Option<String>,
    pub status: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCase {
    pub case_number: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub case_title: String,
    pub case_description: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct CaseAuditEntry {
    pub id: Uuid,
    pub case_id: Uuid,
    // 'created' | 'artifact_added'
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub actor_role: Option<String>,
    #[ts(type = "Record<string, unknown> | null")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub case_id: Uuid,
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub actor_role: String,
    pub details: Value,
}

/// CaseArtifact
///
/// Row from `public.case_artifacts`. `file_url` holds an inline data URI.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct CaseArtifact {
    pub id: Uuid,
    pub case_id: Uuid,
    pub artifact_type: Option<String>,
    pub artifact_name: String,
    pub file_url: String,
    pub file_size_bytes: Option<i64>,
    pub mime_type: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub upload_notes: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifact {
    pub case_id: Uuid,
    pub artifact_type: Option<String>,
    pub artifact_name: String,
    pub file_url: String,
    pub file_size_bytes: i64,
    pub mime_type: String,
    pub uploaded_by: Option<Uuid>,
    pub upload_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ReferenceImage {
    pub id: Uuid,
    pub disease_name: String,
    pub image_name: Option<String>,
    pub image_url: String,
    pub notes: Option<String>,
}

// --- Request Payloads (Input Schemas) ---

/// CreateCaseRequest
///
/// Input payload for `POST /cases`. Fields are optional at the serde level so that a
/// missing title or patient produces a 400 with a readable message.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCaseRequest {
    pub case_title: Option<String>,
    pub case_description: Option<String>,
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SaveMetricRequest {
    pub metric_type: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
}

// Multipart bodies, described for the OpenAPI document only. Handlers read them
// through `uploads::UploadForm`.

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ArtifactUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub artifact_type: Option<String>,
    pub upload_notes: Option<String>,
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct DocumentUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub case_id: Uuid,
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImagingUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    // 'xray' | 'ct_scan' | 'mri' | 'ultrasound' | 'radiograph' | 'other'
    pub image_type: String,
    pub body_part: String,
    /// YYYY-MM-DD
    pub image_date: String,
    pub ordering_provider: Option<String>,
    pub indication: Option<String>,
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct CsvIngestForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    // 'health-metrics' | 'environmental-data' | 'patient-data'
    pub dataset_type: String,
}

// --- Bulk Import Rows ---
// Produced by the `ingest::parse_*` readers, consumed by the repository upserts.

/// MetricImport
///
/// One `health_metrics` row keyed by (patient_id, metric_type, recorded_at).
#[derive(Debug, Clone, PartialEq)]
pub struct MetricImport {
    pub patient_id: Uuid,
    pub metric_type: String,
    pub value: f64,
    pub unit: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// EnvironmentalImport
///
/// One `environmental_data` reading keyed by (user_id, recorded_at).
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentalImport {
    pub user_id: Uuid,
    pub aqi_index: i32,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub temperature_celsius: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// PatientImport
///
/// One `patients` row keyed by `user_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientImport {
    pub user_id: Uuid,
    pub gender: Option<String>,
    pub blood_type: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
}

// --- Query Filters ---

#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct AppointmentFilter {
    pub status: Option<String>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct MetricFilter {
    pub patient_id: Option<Uuid>,
    pub metric_type: Option<String>,
}

/// DataFilter
///
/// Query for the patient dashboard feeds under `/data/*`. The dashboard sends
/// `patientId`; `patient_id` is accepted too.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct DataFilter {
    #[serde(alias = "patientId")]
    pub patient_id: Option<Uuid>,
}

impl From<DataFilter> for MetricFilter {
    fn from(filter: DataFilter) -> Self {
        MetricFilter {
            patient_id: filter.patient_id,
            metric_type: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct PatientFilter {
    pub gender: Option<String>,
    pub blood_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct DoctorFilter {
    /// Case-insensitive substring match on the specialization.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct ImagingFilter {
    pub image_type: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct CaseFilter {
    pub status: Option<String>,
    /// Case-insensitive substring match on the case title.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct ReferenceImageFilter {
    pub disease: Option<String>,
}

// --- Dashboard & Detail Schemas (Output) ---

/// DashboardStats
///
/// Output of `GET /admin/stats`. `predictions` sums diagnostic and risk predictions.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct DashboardStats {
    pub metrics: i64,
    pub appointments: i64,
    pub predictions: i64,
    pub imaging: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SetAdminResponse {
    pub success: bool,
    pub message: String,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AppointmentDetail {
    pub appointment: Option<Appointment>,
    pub doctor: Option<Doctor>,
    pub patient: Option<Patient>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PredictionDetail {
    pub prediction: Option<Prediction>,
    pub patient: Option<Patient>,
    pub doctor: Option<Doctor>,
    #[serde(rename = "referenceImages")]
    pub reference_images: Vec<ReferenceImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DoctorPatients {
    pub doctor: Option<Doctor>,
    pub patients: Vec<Patient>,
    pub predictions: Vec<RiskPrediction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CaseDetail {
    #[serde(rename = "case")]
    pub clinical_case: Option<ClinicalCase>,
    pub artifacts: Vec<CaseArtifact>,
    pub audit_log: Vec<CaseAuditEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DocumentUploadResponse {
    pub success: bool,
    pub artifact: CaseArtifact,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ImageUploadResponse {
    pub success: bool,
    pub image: MedicalImage,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct IngestResponse {
    pub success: bool,
    // Rows written after duplicates within the file were collapsed.
    pub ingested: u64,
    pub dataset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SavedMetricResponse {
    pub success: bool,
    pub data: HealthMetric,
}

// --- Paginated List Envelopes ---
// Each envelope names its collection the way the dashboard frontend reads it.

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AppointmentList {
    pub appointments: Vec<Appointment>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MetricList {
    pub metrics: Vec<HealthMetric>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PredictionList {
    pub predictions: Vec<PredictionSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RiskPredictionList {
    pub predictions: Vec<RiskPrediction>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PatientList {
    pub patients: Vec<Patient>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DoctorList {
    pub doctors: Vec<Doctor>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ImageList {
    pub images: Vec<MedicalImage>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CaseList {
    pub cases: Vec<ClinicalCase>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ReferenceImageList {
    pub images: Vec<ReferenceImage>,
}
