use axum::{
    Json,
    extract::{Multipart, State},
    http::header,
    response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AdminUser, AuthUser},
    cases,
    error::{ApiError, LogInternal},
    export::{self, EXPORT_FILE_NAME},
    extract::{ApiJson, ApiPath, ApiQuery},
    ingest::{self, Dataset},
    models::{
        AppointmentDetail, AppointmentFilter, AppointmentList, ArtifactUploadForm, CaseArtifact,
        CaseDetail, CaseFilter, CaseList, ClinicalCase, CreateCaseRequest, CsvIngestForm,
        DashboardStats, DataFilter, DocumentUploadForm, DocumentUploadResponse, DoctorFilter,
        DoctorList, DoctorPatients, ImageList, ImageUploadResponse, ImagingFilter,
        ImagingUploadForm, IngestResponse, MeResponse, MetricFilter, MetricList, NewArtifact,
        NewHealthMetric, NewMedicalImage, NewProfile, PatientFilter, PatientList,
        PredictionDetail, PredictionList, ReferenceImageFilter, ReferenceImageList,
        RiskPredictionList, SaveMetricRequest, SavedMetricResponse, SetAdminResponse,
    },
    pagination::PageRequest,
    stats,
    uploads::UploadForm,
};

/// Reference images shown alongside a prediction or returned by the lookup endpoint.
pub const REFERENCE_IMAGE_LIMIT: i64 = 5;

const DOCUMENT_NOTES: &str = "Uploaded via dashboard";

// --- Authenticated: identity & bootstrap ---

/// get_me
///
/// [Authenticated Route] The resolved identity plus its admin flag. A caller without a
/// profile is simply not an admin.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current identity", body = MeResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_me(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MeResponse>, ApiError> {
    let profile = state
        .repo
        .get_profile(identity.id)
        .await
        .or_internal("Failed to load profile")?;

    Ok(Json(MeResponse {
        id: identity.id,
        email: identity.email,
        is_admin: profile.is_some_and(|p| p.is_admin),
    }))
}

/// set_admin
///
/// [Authenticated Route] One-time bootstrap elevation. Only a session identity whose
/// email exactly matches the configured bootstrap address may call it; its profile is
/// created as admin, or flipped to admin if it already exists. Local bypass
/// identities are always refused.
#[utoipa::path(
    post,
    path = "/admin/set-admin",
    responses(
        (status = 200, description = "Caller elevated", body = SetAdminResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not the bootstrap administrator")
    )
)]
pub async fn set_admin(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SetAdminResponse>, ApiError> {
    let bootstrap = state.config.bootstrap_admin_email.as_str();
    if identity.is_bypass() || identity.email.is_empty() || identity.email != bootstrap {
        tracing::warn!(
            user_id = %identity.id,
            source = ?identity.source,
            "set-admin refused for non-bootstrap identity"
        );
        return Err(ApiError::Forbidden("Only authorized users can be set as admin"));
    }

    let existing = state
        .repo
        .get_profile(identity.id)
        .await
        .or_internal("Failed to set admin")?;

    match existing {
        Some(_) => state
            .repo
            .set_admin_flag(identity.id, true)
            .await
            .or_internal("Failed to update profile")?,
        None => {
            // Sign-up name when the session carries one, else the email local part.
            let full_name = identity.full_name.clone().unwrap_or_else(|| {
                identity
                    .email
                    .split('@')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            });
            state
                .repo
                .create_profile(NewProfile {
                    user_id: identity.id,
                    full_name,
                    is_admin: true,
                })
                .await
                .or_internal("Failed to create profile")?;
        }
    }

    tracing::info!(user_id = %identity.id, "bootstrap administrator elevated");

    Ok(Json(SetAdminResponse {
        success: true,
        message: format!("{} has been set as admin", identity.email),
        user_id: identity.id,
    }))
}

// --- Authenticated: clinical workflow ---

/// create_case
///
/// [Authenticated Route] Opens a clinical case on behalf of the calling doctor.
/// Callers without a doctor record get a 400.
#[utoipa::path(
    post,
    path = "/cases",
    request_body = CreateCaseRequest,
    responses(
        (status = 200, description = "Case opened", body = ClinicalCase),
        (status = 400, description = "Missing fields or no doctor profile"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_case(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateCaseRequest>,
) -> Result<Json<ClinicalCase>, ApiError> {
    let title = payload
        .case_title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let (Some(title), Some(patient_id)) = (title, payload.patient_id) else {
        return Err(ApiError::BadRequest(
            "case_title and patient_id are required".into(),
        ));
    };

    let doctor = state
        .repo
        .find_doctor_by_user(identity.id)
        .await
        .or_internal("Failed to create case")?
        .ok_or_else(|| ApiError::BadRequest("Doctor profile not found".into()))?;

    let case = cases::open_case(
        state.repo.as_ref(),
        &doctor,
        patient_id,
        title,
        payload.case_description,
    )
    .await
    .or_internal("Failed to create case")?;

    Ok(Json(case))
}

/// upload_case_artifact
///
/// [Authenticated Route] Multipart upload of a file attached to a case. Fields:
/// `file` (required), `artifact_type`, `upload_notes`.
#[utoipa::path(
    post,
    path = "/cases/{id}/artifacts",
    params(("id" = Uuid, Path, description = "Case ID")),
    request_body(content = ArtifactUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Artifact stored", body = CaseArtifact),
        (status = 400, description = "No file provided"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn upload_case_artifact(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    ApiPath(case_id): ApiPath<Uuid>,
    multipart: Multipart,
) -> Result<Json<CaseArtifact>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.require_file()?;

    let doctor = state
        .repo
        .find_doctor_by_user(identity.id)
        .await
        .or_internal("Failed to upload artifact")?;
    let doctor_id = doctor.map(|d| d.id);

    let artifact = NewArtifact {
        case_id,
        artifact_type: form.text("artifact_type").or_else(|| form.text("artifactType")),
        artifact_name: file.name.clone(),
        file_url: file.data_uri(),
        file_size_bytes: file.size(),
        mime_type: file.mime.clone(),
        uploaded_by: doctor_id,
        upload_notes: form.text("upload_notes").or_else(|| form.text("uploadNotes")),
    };

    let created = cases::attach_artifact(state.repo.as_ref(), artifact, doctor_id)
        .await
        .or_internal("Failed to upload artifact")?;

    Ok(Json(created))
}

/// upload_document
///
/// [Authenticated Route] Attaches a PDF or image to a case from the dashboard
/// document picker. Fields: `file`, `case_id`.
#[utoipa::path(
    post,
    path = "/documents",
    request_body(content = DocumentUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Document stored", body = DocumentUploadResponse),
        (status = 400, description = "Missing file or case id"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn upload_document(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DocumentUploadResponse>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let case_id = form.text("case_id").or_else(|| form.text("caseId"));
    let (Some(file), Some(case_id)) = (form.file.take(), case_id) else {
        return Err(ApiError::BadRequest("Missing file or caseId".into()));
    };
    let case_id = Uuid::parse_str(&case_id)
        .map_err(|_| ApiError::BadRequest("Invalid caseId".into()))?;

    let artifact = state
        .repo
        .create_artifact(NewArtifact {
            case_id,
            artifact_type: Some(if file.is_pdf() { "pdf" } else { "image" }.to_string()),
            artifact_name: file.name.clone(),
            file_url: file.data_uri(),
            file_size_bytes: file.size(),
            mime_type: file.mime.clone(),
            uploaded_by: Some(identity.id),
            upload_notes: Some(DOCUMENT_NOTES.to_string()),
        })
        .await
        .or_internal("Upload failed")?;

    Ok(Json(DocumentUploadResponse {
        success: true,
        artifact,
    }))
}

/// upload_imaging
///
/// [Authenticated Route] Stores a medical image for the caller. Fields: `file`,
/// `image_type`, `body_part`, `image_date` (YYYY-MM-DD) are required;
/// `ordering_provider` and `indication` are optional.
#[utoipa::path(
    post,
    path = "/imaging",
    request_body(content = ImagingUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored", body = ImageUploadResponse),
        (status = 400, description = "Missing required fields"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn upload_imaging(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImageUploadResponse>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let image_type = form.text("image_type").or_else(|| form.text("imageType"));
    let body_part = form.text("body_part").or_else(|| form.text("bodyPart"));
    let image_date = form.text("image_date").or_else(|| form.text("imageDate"));

    let (Some(file), Some(image_type), Some(body_part), Some(image_date)) =
        (form.file.take(), image_type, body_part, image_date)
    else {
        return Err(ApiError::BadRequest("Missing required fields".into()));
    };
    let image_date = NaiveDate::parse_from_str(&image_date, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("Invalid imageDate".into()))?;

    let image = state
        .repo
        .insert_medical_image(NewMedicalImage {
            user_id: identity.id,
            image_type,
            body_part,
            image_date,
            image_url: file.data_uri(),
            image_size_bytes: file.size(),
            mime_type: file.mime.clone(),
            ordering_provider: form
                .text("ordering_provider")
                .or_else(|| form.text("orderingProvider")),
            indication: form.text("indication"),
        })
        .await
        .or_internal("Failed to upload image")?;

    Ok(Json(ImageUploadResponse {
        success: true,
        image,
    }))
}

/// save_health_metric
///
/// [Authenticated Route] Records one metric reading for the caller, timestamped now.
#[utoipa::path(
    post,
    path = "/health-metrics",
    request_body = SaveMetricRequest,
    responses(
        (status = 200, description = "Metric saved", body = SavedMetricResponse),
        (status = 400, description = "Missing metric_type or value"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn save_health_metric(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SaveMetricRequest>,
) -> Result<Json<SavedMetricResponse>, ApiError> {
    let metric_type = payload
        .metric_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let (Some(metric_type), Some(value)) = (metric_type, payload.value) else {
        return Err(ApiError::BadRequest(
            "metric_type and value are required".into(),
        ));
    };

    let data = state
        .repo
        .insert_health_metric(NewHealthMetric {
            user_id: identity.id,
            metric_type,
            value,
            unit: payload.unit,
        })
        .await
        .or_internal("Failed to save metric")?;

    Ok(Json(SavedMetricResponse {
        success: true,
        data,
    }))
}

// --- Authenticated: dashboard data feeds ---

#[utoipa::path(
    get,
    path = "/data/metrics",
    params(PageRequest, DataFilter),
    responses((status = 200, description = "Health metrics", body = MetricList))
)]
pub async fn data_metrics(
    _user: AuthUser,
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
    ApiQuery(filter): ApiQuery<DataFilter>,
) -> Result<Json<MetricList>, ApiError> {
    let (metrics, pagination) = state
        .repo
        .list_health_metrics(MetricFilter::from(filter), page)
        .await
        .or_internal("Failed to fetch metrics")?
        .into_parts();
    Ok(Json(MetricList {
        metrics,
        pagination,
    }))
}

#[utoipa::path(
    get,
    path = "/data/predictions",
    params(PageRequest, DataFilter),
    responses((status = 200, description = "Risk predictions", body = RiskPredictionList))
)]
pub async fn data_predictions(
    _user: AuthUser,
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
    ApiQuery(filter): ApiQuery<DataFilter>,
) -> Result<Json<RiskPredictionList>, ApiError> {
    let (predictions, pagination) = state
        .repo
        .list_risk_predictions(filter, page)
        .await
        .or_internal("Failed to fetch predictions")?
        .into_parts();
    Ok(Json(RiskPredictionList {
        predictions,
        pagination,
    }))
}

#[utoipa::path(
    get,
    path = "/data/patients",
    params(PageRequest),
    responses((status = 200, description = "Patients", body = PatientList))
)]
pub async fn data_patients(
    _user: AuthUser,
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> Result<Json<PatientList>, ApiError> {
    let (patients, pagination) = state
        .repo
        .list_patients(PatientFilter::default(), page)
        .await
        .or_internal("Failed to fetch patients")?
        .into_parts();
    Ok(Json(PatientList {
        patients,
        pagination,
    }))
}

/// csv_ingest
///
/// [Admin Route] Bulk upsert from an uploaded CSV. Fields: `file` and `datasetType`
/// (`health-metrics`, `environmental-data` or `patient-data`). The file is validated
/// in full before anything is written.
#[utoipa::path(
    post,
    path = "/data/csv-ingest",
    request_body(content = CsvIngestForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Rows written", body = IngestResponse),
        (status = 400, description = "Missing fields, unknown dataset or invalid row"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required"),
        (status = 500, description = "Ingestion failed")
    )
)]
pub async fn csv_ingest(
    AdminUser(identity): AdminUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let dataset = form.text("datasetType").or_else(|| form.text("dataset_type"));
    let (Some(file), Some(dataset)) = (form.file.take(), dataset) else {
        return Err(ApiError::BadRequest("File and datasetType required".into()));
    };
    let dataset: Dataset = dataset.parse()?;

    let ingested = ingest::ingest(state.repo.as_ref(), dataset, &file.bytes, Utc::now()).await?;

    tracing::info!(
        user_id = %identity.id,
        dataset = dataset.name(),
        ingested,
        "csv ingest completed"
    );

    Ok(Json(IngestResponse {
        success: true,
        ingested,
        dataset: dataset.name().to_string(),
    }))
}

// --- Admin ---

/// get_admin_stats
///
/// [Admin Route] Dashboard counters. One failing count fails the whole response;
/// partial numbers are never returned.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Dashboard counters", body = DashboardStats),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required"),
        (status = 500, description = "Failed to fetch stats")
    )
)]
pub async fn get_admin_stats(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, ApiError> {
    let stats = stats::dashboard_stats(state.repo.as_ref(), state.config.stats_timeout)
        .await
        .or_internal("Failed to fetch stats")?;
    Ok(Json(stats))
}

/// export_zip
///
/// [Admin Route] Patients, appointments, health metrics, predictions and imaging as
/// one CSV per collection inside `healthcare-export.zip`.
#[utoipa::path(
    get,
    path = "/admin/export-zip",
    responses(
        (status = 200, description = "Zip archive of CSV files", content_type = "application/zip", body = Vec<u8>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required"),
        (status = 500, description = "Failed to export data")
    )
)]
pub async fn export_zip(
    AdminUser(identity): AdminUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let archive = export::export_archive(state.repo.as_ref(), state.config.export_timeout)
        .await
        .or_internal("Failed to export data")?;

    tracing::info!(user_id = %identity.id, bytes = archive.len(), "data export downloaded");

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILE_NAME}\""),
            ),
        ],
        archive,
    ))
}

/// list_appointments
///
/// [Admin Route] Appointments, newest first, optionally filtered by status, doctor
/// or patient.
#[utoipa::path(
    get,
    path = "/admin/appointments",
    params(PageRequest, AppointmentFilter),
    responses((status = 200, description = "Appointments", body = AppointmentList))
)]
pub async fn list_appointments(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
    ApiQuery(filter): ApiQuery<AppointmentFilter>,
) -> Result<Json<AppointmentList>, ApiError> {
    let (appointments, pagination) = state
        .repo
        .list_appointments(filter, page)
        .await
        .or_internal("Failed to fetch appointments")?
        .into_parts();
    Ok(Json(AppointmentList {
        appointments,
        pagination,
    }))
}

/// get_appointment_detail
///
/// [Admin Route] An appointment with its doctor and patient. Missing records are
/// `null` rather than a 404.
#[utoipa::path(
    get,
    path = "/admin/appointments/{id}",
    params(("id" = Uuid, Path, description = "Appointment ID")),
    responses((status = 200, description = "Appointment detail", body = AppointmentDetail))
)]
pub async fn get_appointment_detail(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<AppointmentDetail>, ApiError> {
    const MESSAGE: &str = "Failed to fetch appointment";

    let appointment = state.repo.get_appointment(id).await.or_internal(MESSAGE)?;
    let mut detail = AppointmentDetail::default();

    if let Some(appointment) = appointment {
        if let Some(doctor_id) = appointment.doctor_id {
            detail.doctor = state.repo.get_doctor(doctor_id).await.or_internal(MESSAGE)?;
        }
        if let Some(patient_id) = appointment.patient_id {
            detail.patient = state.repo.get_patient(patient_id).await.or_internal(MESSAGE)?;
        }
        detail.appointment = Some(appointment);
    }

    Ok(Json(detail))
}

#[utoipa::path(
    get,
    path = "/admin/metrics",
    params(PageRequest, MetricFilter),
    responses((status = 200, description = "Health metrics", body = MetricList))
)]
pub async fn list_metrics(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
    ApiQuery(filter): ApiQuery<MetricFilter>,
) -> Result<Json<MetricList>, ApiError> {
    let (metrics, pagination) = state
        .repo
        .list_health_metrics(filter, page)
        .await
        .or_internal("Failed to fetch metrics")?
        .into_parts();
    Ok(Json(MetricList {
        metrics,
        pagination,
    }))
}

/// list_predictions
///
/// [Admin Route] Diagnostic predictions shaped for the dashboard table.
#[utoipa::path(
    get,
    path = "/admin/predictions",
    params(PageRequest),
    responses((status = 200, description = "Prediction summaries", body = PredictionList))
)]
pub async fn list_predictions(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> Result<Json<PredictionList>, ApiError> {
    let (predictions, pagination) = state
        .repo
        .list_predictions(page)
        .await
        .or_internal("Failed to fetch predictions")?
        .into_parts();
    Ok(Json(PredictionList {
        predictions,
        pagination,
    }))
}

/// get_prediction_detail
///
/// [Admin Route] A prediction with its patient, doctor and up to five reference
/// images for the predicted disease.
#[utoipa::path(
    get,
    path = "/admin/predictions/{id}",
    params(("id" = Uuid, Path, description = "Prediction ID")),
    responses((status = 200, description = "Prediction detail", body = PredictionDetail))
)]
pub async fn get_prediction_detail(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PredictionDetail>, ApiError> {
    const MESSAGE: &str = "Failed to fetch prediction";

    let Some(prediction) = state.repo.get_prediction(id).await.or_internal(MESSAGE)? else {
        return Ok(Json(PredictionDetail::default()));
    };

    let mut detail = PredictionDetail::default();
    if let Some(patient_id) = prediction.patient_id {
        detail.patient = state.repo.get_patient(patient_id).await.or_internal(MESSAGE)?;
    }
    if let Some(doctor_id) = prediction.doctor_id {
        detail.doctor = state.repo.get_doctor(doctor_id).await.or_internal(MESSAGE)?;
    }
    if let Some(disease) = prediction.predicted_disease.clone() {
        detail.reference_images = state
            .repo
            .find_reference_images(Some(disease), REFERENCE_IMAGE_LIMIT)
            .await
            .or_internal(MESSAGE)?;
    }
    detail.prediction = Some(prediction);

    Ok(Json(detail))
}

#[utoipa::path(
    get,
    path = "/admin/patients",
    params(PageRequest, PatientFilter),
    responses((status = 200, description = "Patients", body = PatientList))
)]
pub async fn list_patients(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
    ApiQuery(filter): ApiQuery<PatientFilter>,
) -> Result<Json<PatientList>, ApiError> {
    let (patients, pagination) = state
        .repo
        .list_patients(filter, page)
        .await
        .or_internal("Failed to fetch patients")?
        .into_parts();
    Ok(Json(PatientList {
        patients,
        pagination,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/doctors",
    params(PageRequest, DoctorFilter),
    responses((status = 200, description = "Doctors", body = DoctorList))
)]
pub async fn list_doctors(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
    ApiQuery(filter): ApiQuery<DoctorFilter>,
) -> Result<Json<DoctorList>, ApiError> {
    let (doctors, pagination) = state
        .repo
        .list_doctors(filter, page)
        .await
        .or_internal("Failed to fetch doctors")?
        .into_parts();
    Ok(Json(DoctorList {
        doctors,
        pagination,
    }))
}

/// get_doctor_patients
///
/// [Admin Route] A doctor, the distinct patients they have appointments with, and
/// the risk predictions of those patients.
#[utoipa::path(
    get,
    path = "/admin/doctors/{id}/patients",
    params(("id" = Uuid, Path, description = "Doctor ID")),
    responses((status = 200, description = "Doctor with patients", body = DoctorPatients))
)]
pub async fn get_doctor_patients(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<DoctorPatients>, ApiError> {
    const MESSAGE: &str = "Failed to fetch data";

    let doctor = state.repo.get_doctor(id).await.or_internal(MESSAGE)?;
    let patients = state.repo.patients_for_doctor(id).await.or_internal(MESSAGE)?;
    let patient_ids: Vec<Uuid> = patients.iter().map(|p| p.id).collect();
    let predictions = state
        .repo
        .risk_predictions_for_patients(&patient_ids)
        .await
        .or_internal(MESSAGE)?;

    Ok(Json(DoctorPatients {
        doctor,
        patients,
        predictions,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/imaging",
    params(PageRequest, ImagingFilter),
    responses((status = 200, description = "Medical images", body = ImageList))
)]
pub async fn list_imaging(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
    ApiQuery(filter): ApiQuery<ImagingFilter>,
) -> Result<Json<ImageList>, ApiError> {
    let (images, pagination) = state
        .repo
        .list_medical_images(filter, page)
        .await
        .or_internal("Failed to fetch images")?
        .into_parts();
    Ok(Json(ImageList { images, pagination }))
}

#[utoipa::path(
    get,
    path = "/admin/cases",
    params(PageRequest, CaseFilter),
    responses((status = 200, description = "Clinical cases", body = CaseList))
)]
pub async fn list_cases(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
    ApiQuery(filter): ApiQuery<CaseFilter>,
) -> Result<Json<CaseList>, ApiError> {
    let (cases, pagination) = state
        .repo
        .list_cases(filter, page)
        .await
        .or_internal("Failed to fetch cases")?
        .into_parts();
    Ok(Json(CaseList { cases, pagination }))
}

/// get_case_detail
///
/// [Admin Route] A case with its artifacts and audit trail, both newest first.
#[utoipa::path(
    get,
    path = "/admin/cases/{id}",
    params(("id" = Uuid, Path, description = "Case ID")),
    responses((status = 200, description = "Case detail", body = CaseDetail))
)]
pub async fn get_case_detail(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<CaseDetail>, ApiError> {
    const MESSAGE: &str = "Failed to fetch case";

    let Some(clinical_case) = state.repo.get_case(id).await.or_internal(MESSAGE)? else {
        return Ok(Json(CaseDetail::default()));
    };
    let artifacts = state.repo.list_case_artifacts(id).await.or_internal(MESSAGE)?;
    let audit_log = state.repo.list_case_audit(id).await.or_internal(MESSAGE)?;

    Ok(Json(CaseDetail {
        clinical_case: Some(clinical_case),
        artifacts,
        audit_log,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/reference-images",
    params(ReferenceImageFilter),
    responses((status = 200, description = "Reference images", body = ReferenceImageList))
)]
pub async fn list_reference_images(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ReferenceImageFilter>,
) -> Result<Json<ReferenceImageList>, ApiError> {
    let images = state
        .repo
        .find_reference_images(filter.disease, REFERENCE_IMAGE_LIMIT)
        .await
        .or_internal("Failed to fetch reference images")?;
    Ok(Json(ReferenceImageList { images }))
}
