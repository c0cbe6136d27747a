use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::RepoError,
    models::{
        Appointment, AppointmentFilter, CaseArtifact, CaseAuditEntry, CaseFilter, ClinicalCase,
        DataFilter, Doctor, DoctorFilter, EnvironmentalImport, HealthMetric, ImagingFilter,
        MedicalImage, MetricFilter, MetricImport, NewArtifact, NewAuditEntry, NewCase,
        NewHealthMetric, NewMedicalImage, NewProfile, Patient, PatientFilter, PatientImport,
        Prediction, PredictionListRow, PredictionSummary, Profile, ReferenceImage, RiskPrediction,
    },
    pagination::{PageRequest, PageResult},
    query::{Collection, Direction, PaginatedQuery},
};

/// Repository Trait
///
/// Every read and write the HTTP layer performs. Handlers only see this trait, so tests
/// swap in an in-memory implementation behind the same `Arc<dyn Repository>`.
///
/// All methods return `RepoError` on failure. A missing single record is `Ok(None)`,
/// never an error.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Profiles ---
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, RepoError>;
    async fn create_profile(&self, profile: NewProfile) -> Result<Profile, RepoError>;
    async fn set_admin_flag(&self, user_id: Uuid, is_admin: bool) -> Result<(), RepoError>;

    // --- Counts ---
    async fn count(&self, collection: Collection) -> Result<i64, RepoError>;

    // --- Paginated listings ---
    async fn list_appointments(
        &self,
        filter: AppointmentFilter,
        page: PageRequest,
    ) -> Result<PageResult<Appointment>, RepoError>;
    async fn list_health_metrics(
        &self,
        filter: MetricFilter,
        page: PageRequest,
    ) -> Result<PageResult<HealthMetric>, RepoError>;
    async fn list_predictions(
        &self,
        page: PageRequest,
    ) -> Result<PageResult<PredictionSummary>, RepoError>;
    async fn list_risk_predictions(
        &self,
        filter: DataFilter,
        page: PageRequest,
    ) -> Result<PageResult<RiskPrediction>, RepoError>;
    async fn list_patients(
        &self,
        filter: PatientFilter,
        page: PageRequest,
    ) -> Result<PageResult<Patient>, RepoError>;
    async fn list_doctors(
        &self,
        filter: DoctorFilter,
        page: PageRequest,
    ) -> Result<PageResult<Doctor>, RepoError>;
    async fn list_medical_images(
        &self,
        filter: ImagingFilter,
        page: PageRequest,
    ) -> Result<PageResult<MedicalImage>, RepoError>;
    async fn list_cases(
        &self,
        filter: CaseFilter,
        page: PageRequest,
    ) -> Result<PageResult<ClinicalCase>, RepoError>;

    // Reference images whose disease name contains `disease` (all when `None`).
    async fn find_reference_images(
        &self,
        disease: Option<String>,
        limit: i64,
    ) -> Result<Vec<ReferenceImage>, RepoError>;

    // --- Single records ---
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, RepoError>;
    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, RepoError>;
    async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, RepoError>;
    async fn find_doctor_by_user(&self, user_id: Uuid) -> Result<Option<Doctor>, RepoError>;
    async fn get_prediction(&self, id: Uuid) -> Result<Option<Prediction>, RepoError>;
    async fn get_case(&self, id: Uuid) -> Result<Option<ClinicalCase>, RepoError>;
    async fn list_case_artifacts(&self, case_id: Uuid) -> Result<Vec<CaseArtifact>, RepoError>;
    async fn list_case_audit(&self, case_id: Uuid) -> Result<Vec<CaseAuditEntry>, RepoError>;

    // Distinct patients that have at least one appointment with the doctor.
    async fn patients_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Patient>, RepoError>;
    async fn risk_predictions_for_patients(
        &self,
        patient_ids: &[Uuid],
    ) -> Result<Vec<RiskPrediction>, RepoError>;

    // --- Writes ---
    async fn create_case(&self, case: NewCase) -> Result<ClinicalCase, RepoError>;
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), RepoError>;
    async fn create_artifact(&self, artifact: NewArtifact) -> Result<CaseArtifact, RepoError>;
    async fn insert_health_metric(
        &self,
        metric: NewHealthMetric,
    ) -> Result<HealthMetric, RepoError>;
    async fn insert_medical_image(
        &self,
        image: NewMedicalImage,
    ) -> Result<MedicalImage, RepoError>;

    // --- Bulk export / import ---
    // Every row of the collection as a JSON object keyed by column name.
    async fn export_rows(&self, collection: Collection) -> Result<Vec<Value>, RepoError>;
    // Upserts return the number of rows written. Each call is one transaction.
    async fn upsert_health_metrics(&self, rows: Vec<MetricImport>) -> Result<u64, RepoError>;
    async fn upsert_environmental(&self, rows: Vec<EnvironmentalImport>)
    -> Result<u64, RepoError>;
    async fn upsert_patients(&self, rows: Vec<PatientImport>) -> Result<u64, RepoError>;
}

/// RepositoryState
///
/// The shared persistence handle stored in the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by the pre-existing Supabase Postgres schema. Holds only the
/// connection pool; there is no other in-process state.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Rows per multi-row INSERT. Keeps the bind count far below the Postgres limit.
const UPSERT_CHUNK: usize = 500;

const PREDICTION_LIST_SOURCE: &str = "predictions p LEFT JOIN patients pt ON pt.id = p.patient_id";
const PREDICTION_LIST_COLUMNS: &str = "p.id, p.patient_id, p.doctor_id, p.predicted_disease, \
     p.confidence_score, p.severity_level, p.explanation, p.created_at, pt.scan_image_url";

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, RepoError> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT user_id, full_name, is_admin, created_at FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn create_profile(&self, profile: NewProfile) -> Result<Profile, RepoError> {
        let created = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO user_profiles (user_id, full_name, is_admin)
            VALUES ($1, $2, $3)
            RETURNING user_id, full_name, is_admin, created_at
            "#,
        )
        .bind(profile.user_id)
        .bind(profile.full_name)
        .bind(profile.is_admin)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn set_admin_flag(&self, user_id: Uuid, is_admin: bool) -> Result<(), RepoError> {
        sqlx::query("UPDATE user_profiles SET is_admin = $1 WHERE user_id = $2")
            .bind(is_admin)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// count
    ///
    /// Head-only count of a whole collection. The table name comes from the
    /// `Collection` enum, never from input.
    async fn count(&self, collection: Collection) -> Result<i64, RepoError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", collection.table()));
        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn list_appointments(
        &self,
        filter: AppointmentFilter,
        page: PageRequest,
    ) -> Result<PageResult<Appointment>, RepoError> {
        PaginatedQuery::new(Collection::Appointments, page)
            .eq("status", filter.status)
            .eq("doctor_id", filter.doctor_id)
            .eq("patient_id", filter.patient_id)
            .order_by("appointment_date", Direction::Desc)
            .run(&self.pool)
            .await
    }

    async fn list_health_metrics(
        &self,
        filter: MetricFilter,
        page: PageRequest,
    ) -> Result<PageResult<HealthMetric>, RepoError> {
        PaginatedQuery::new(Collection::HealthMetrics, page)
            .eq("patient_id", filter.patient_id)
            .eq("metric_type", filter.metric_type)
            .order_by("recorded_at", Direction::Desc)
            .run(&self.pool)
            .await
    }

    /// list_predictions
    ///
    /// Joins the linked patient so each summary can report whether a scan image
    /// exists, then maps the raw rows onto display defaults.
    async fn list_predictions(
        &self,
        page: PageRequest,
    ) -> Result<PageResult<PredictionSummary>, RepoError> {
        let rows = PaginatedQuery::from_source(PREDICTION_LIST_SOURCE, PREDICTION_LIST_COLUMNS, page)
            .order_by("p.created_at", Direction::Desc)
            .run::<PredictionListRow>(&self.pool)
            .await?;
        Ok(rows.map(PredictionSummary::from))
    }

    async fn list_risk_predictions(
        &self,
        filter: DataFilter,
        page: PageRequest,
    ) -> Result<PageResult<RiskPrediction>, RepoError> {
        PaginatedQuery::new(Collection::RiskPredictions, page)
            .eq("patient_id", filter.patient_id)
            .order_by("created_at", Direction::Desc)
            .run(&self.pool)
            .await
    }

    async fn list_patients(
        &self,
        filter: PatientFilter,
        page: PageRequest,
    ) -> Result<PageResult<Patient>, RepoError> {
        PaginatedQuery::new(Collection::Patients, page)
            .eq("gender", filter.gender)
            .eq("blood_type", filter.blood_type)
            .order_by("created_at", Direction::Desc)
            .run(&self.pool)
            .await
    }

    async fn list_doctors(
        &self,
        filter: DoctorFilter,
        page: PageRequest,
    ) -> Result<PageResult<Doctor>, RepoError> {
        PaginatedQuery::new(Collection::Doctors, page)
            .contains("specialization", filter.search)
            .order_by("created_at", Direction::Desc)
            .run(&self.pool)
            .await
    }

    async fn list_medical_images(
        &self,
        filter: ImagingFilter,
        page: PageRequest,
    ) -> Result<PageResult<MedicalImage>, RepoError> {
        PaginatedQuery::new(Collection::MedicalImaging, page)
            .eq("image_type", filter.image_type)
            .eq("user_id", filter.user_id)
            .order_by("created_at", Direction::Desc)
            .run(&self.pool)
            .await
    }

    async fn list_cases(
        &self,
        filter: CaseFilter,
        page: PageRequest,
    ) -> Result<PageResult<ClinicalCase>, RepoError> {
        PaginatedQuery::new(Collection::ClinicalCases, page)
            .eq("status", filter.status)
            .contains("case_title", filter.search)
            .order_by("created_at", Direction::Desc)
            .run(&self.pool)
            .await
    }

    async fn find_reference_images(
        &self,
        disease: Option<String>,
        limit: i64,
    ) -> Result<Vec<ReferenceImage>, RepoError> {
        PaginatedQuery::new(Collection::ReferenceImages, PageRequest::new(1, limit))
            .contains("disease_name", disease)
            .order_by("disease_name", Direction::Asc)
            .fetch::<ReferenceImage>(&self.pool)
            .await
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, RepoError> {
        let row = sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, RepoError> {
        let row = sqlx::query_as::<_, Patient>("SELECT * FROM patients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, RepoError> {
        let row = sqlx::query_as::<_, Doctor>("SELECT * FROM doctors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_doctor_by_user(&self, user_id: Uuid) -> Result<Option<Doctor>, RepoError> {
        let row = sqlx::query_as::<_, Doctor>("SELECT * FROM doctors WHERE user_id = $1 LIMIT 1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_prediction(&self, id: Uuid) -> Result<Option<Prediction>, RepoError> {
        let row = sqlx::query_as::<_, Prediction>("SELECT * FROM predictions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_case(&self, id: Uuid) -> Result<Option<ClinicalCase>, RepoError> {
        let row = sqlx::query_as::<_, ClinicalCase>("SELECT * FROM clinical_cases WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_case_artifacts(&self, case_id: Uuid) -> Result<Vec<CaseArtifact>, RepoError> {
        let rows = sqlx::query_as::<_, CaseArtifact>(
            "SELECT * FROM case_artifacts WHERE case_id = $1 ORDER BY created_at DESC",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_case_audit(&self, case_id: Uuid) -> Result<Vec<CaseAuditEntry>, RepoError> {
        let rows = sqlx::query_as::<_, CaseAuditEntry>(
            "SELECT * FROM case_audit_log WHERE case_id = $1 ORDER BY created_at DESC",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn patients_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Patient>, RepoError> {
        let rows = sqlx::query_as::<_, Patient>(
            r#"
            SELECT p.* FROM patients p
            WHERE p.id IN (
                SELECT DISTINCT a.patient_id FROM appointments a
                WHERE a.doctor_id = $1 AND a.patient_id IS NOT NULL
            )
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn risk_predictions_for_patients(
        &self,
        patient_ids: &[Uuid],
    ) -> Result<Vec<RiskPrediction>, RepoError> {
        if patient_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, RiskPrediction>(
            "SELECT * FROM health_risk_predictions WHERE patient_id = ANY($1) ORDER BY created_at DESC",
        )
        .bind(patient_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_case(&self, case: NewCase) -> Result<ClinicalCase, RepoError> {
        let created = sqlx::query_as::<_, ClinicalCase>(
            r#"
            INSERT INTO clinical_cases
                (case_number, patient_id, doctor_id, case_title, case_description, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(case.case_number)
        .bind(case.patient_id)
        .bind(case.doctor_id)
        .bind(case.case_title)
        .bind(case.case_description)
        .bind(case.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO case_audit_log (case_id, action, actor_id, actor_role, details)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.case_id)
        .bind(entry.action)
        .bind(entry.actor_id)
        .bind(entry.actor_role)
        .bind(entry.details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_artifact(&self, artifact: NewArtifact) -> Result<CaseArtifact, RepoError> {
        let created = sqlx::query_as::<_, CaseArtifact>(
            r#"
            INSERT INTO case_artifacts
                (case_id, artifact_type, artifact_name, file_url, file_size_bytes,
                 mime_type, uploaded_by, upload_notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(artifact.case_id)
        .bind(artifact.artifact_type)
        .bind(artifact.artifact_name)
        .bind(artifact.file_url)
        .bind(artifact.file_size_bytes)
        .bind(artifact.mime_type)
        .bind(artifact.uploaded_by)
        .bind(artifact.upload_notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn insert_health_metric(
        &self,
        metric: NewHealthMetric,
    ) -> Result<HealthMetric, RepoError> {
        let created = sqlx::query_as::<_, HealthMetric>(
            r#"
            INSERT INTO health_metrics (user_id, metric_type, value, unit, recorded_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(metric.user_id)
        .bind(metric.metric_type)
        .bind(metric.value)
        .bind(metric.unit)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn insert_medical_image(
        &self,
        image: NewMedicalImage,
    ) -> Result<MedicalImage, RepoError> {
        let created = sqlx::query_as::<_, MedicalImage>(
            r#"
            INSERT INTO medical_imaging
                (user_id, image_type, body_part, image_date, image_url,
                 image_size_bytes, mime_type, ordering_provider, indication)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(image.user_id)
        .bind(image.image_type)
        .bind(image.body_part)
        .bind(image.image_date)
        .bind(image.image_url)
        .bind(image.image_size_bytes)
        .bind(image.mime_type)
        .bind(image.ordering_provider)
        .bind(image.indication)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// export_rows
    ///
    /// `to_jsonb` keeps every column, including ones the models do not map, so an
    /// export reflects the table as stored.
    async fn export_rows(&self, collection: Collection) -> Result<Vec<Value>, RepoError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT to_jsonb(t) FROM {} t", collection.table()));
        let rows: Vec<Value> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn upsert_health_metrics(&self, rows: Vec<MetricImport>) -> Result<u64, RepoError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for chunk in rows.chunks(UPSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO health_metrics (patient_id, metric_type, value, unit, recorded_at) ",
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.patient_id)
                    .push_bind(row.metric_type.clone())
                    .push_bind(row.value)
                    .push_bind(row.unit.clone())
                    .push_bind(row.recorded_at);
            });
            builder.push(
                " ON CONFLICT (patient_id, metric_type, recorded_at) \
                 DO UPDATE SET value = EXCLUDED.value, unit = EXCLUDED.unit",
            );
            written += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn upsert_environmental(
        &self,
        rows: Vec<EnvironmentalImport>,
    ) -> Result<u64, RepoError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for chunk in rows.chunks(UPSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO environmental_data (user_id, aqi_index, pm25, pm10, \
                 temperature_celsius, humidity_percent, recorded_at) ",
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.user_id)
                    .push_bind(row.aqi_index)
                    .push_bind(row.pm25)
                    .push_bind(row.pm10)
                    .push_bind(row.temperature_celsius)
                    .push_bind(row.humidity_percent)
                    .push_bind(row.recorded_at);
            });
            builder.push(
                " ON CONFLICT (user_id, recorded_at) DO UPDATE SET \
                 aqi_index = EXCLUDED.aqi_index, pm25 = EXCLUDED.pm25, pm10 = EXCLUDED.pm10, \
                 temperature_celsius = EXCLUDED.temperature_celsius, \
                 humidity_percent = EXCLUDED.humidity_percent",
            );
            written += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn upsert_patients(&self, rows: Vec<PatientImport>) -> Result<u64, RepoError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for chunk in rows.chunks(UPSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO patients (user_id, gender, blood_type, date_of_birth, \
                 medical_history, allergies) ",
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.user_id)
                    .push_bind(row.gender.clone())
                    .push_bind(row.blood_type.clone())
                    .push_bind(row.date_of_birth)
                    .push_bind(row.medical_history.clone())
                    .push_bind(row.allergies.clone());
            });
            builder.push(
                " ON CONFLICT (user_id) DO UPDATE SET gender = EXCLUDED.gender, \
                 blood_type = EXCLUDED.blood_type, date_of_birth = EXCLUDED.date_of_birth, \
                 medical_history = EXCLUDED.medical_history, allergies = EXCLUDED.allergies",
            );
            written += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }
}
