#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use health_dashboard::{
    AppState,
    auth::{Claims, IdentityState, JwtIdentityProvider, SUPABASE_AUDIENCE, UserMetadata},
    config::{AppConfig, Env},
    error::RepoError,
    models::{
        Appointment, AppointmentFilter, CaseArtifact, CaseAuditEntry, CaseFilter, ClinicalCase,
        DataFilter, Doctor, DoctorFilter, EnvironmentalImport, HealthMetric, ImagingFilter,
        MedicalImage, MetricFilter, MetricImport, NewArtifact, NewAuditEntry, NewCase,
        NewHealthMetric, NewMedicalImage, NewProfile, Patient, PatientFilter, PatientImport,
        Prediction, PredictionSummary, Profile, ReferenceImage, RiskPrediction,
    },
    pagination::{PageRequest, PageResult},
    query::Collection,
    repository::Repository,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

pub const ADMIN_ID: Uuid = Uuid::from_u128(0xA1);
pub const USER_ID: Uuid = Uuid::from_u128(0xB2);
pub const DOCTOR_USER_ID: Uuid = Uuid::from_u128(0xC3);
pub const DOCTOR_ID: Uuid = Uuid::from_u128(0xD1);
pub const PATIENT_ID: Uuid = Uuid::from_u128(0x123);

pub const ADMIN_EMAIL: &str = "admin@localhost";

fn query_failed() -> RepoError {
    RepoError::QueryFailed(sqlx::Error::PoolTimedOut)
}

fn contains_ci(haystack: Option<&str>, term: &Option<String>) -> bool {
    match term.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(term) => haystack.is_some_and(|h| h.to_lowercase().contains(&term.to_lowercase())),
    }
}

fn eq_text(value: Option<&str>, wanted: &Option<String>) -> bool {
    match wanted.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(wanted) => value == Some(wanted),
    }
}

/// Slices `rows` the way `PaginatedQuery` would: offset/limit over the full set.
pub fn paginate<T: Clone>(rows: &[T], page: PageRequest) -> PageResult<T> {
    let items = rows
        .iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect();
    PageResult::new(items, rows.len() as i64, page)
}

// --- MOCK REPOSITORY IMPLEMENTATION ---

/// In-memory stand-in for Postgres. Writes are recorded so tests can assert on them;
/// `fail_*` switches force specific calls to return `RepoError`.
pub struct MockRepo {
    pub profiles: Mutex<HashMap<Uuid, Profile>>,
    pub doctors: Vec<Doctor>,
    pub patients: Vec<Patient>,
    pub appointments: Vec<Appointment>,
    pub metrics: Vec<HealthMetric>,
    pub predictions: Vec<PredictionSummary>,
    pub full_predictions: Vec<Prediction>,
    pub risk_predictions: Vec<RiskPrediction>,
    pub reference_images: Vec<ReferenceImage>,
    pub images: Vec<MedicalImage>,
    pub exports: HashMap<Collection, Vec<Value>>,
    pub counts: HashMap<Collection, i64>,

    pub cases: Mutex<Vec<ClinicalCase>>,
    pub audit: Mutex<Vec<NewAuditEntry>>,
    pub artifacts: Mutex<Vec<NewArtifact>>,
    pub saved_metrics: Mutex<Vec<NewHealthMetric>>,
    pub saved_images: Mutex<Vec<NewMedicalImage>>,
    pub imported_metrics: Mutex<Vec<MetricImport>>,
    pub imported_environmental: Mutex<Vec<EnvironmentalImport>>,
    pub imported_patients: Mutex<Vec<PatientImport>>,

    // Every trait call increments this, so tests can prove nothing was queried.
    pub calls: AtomicUsize,
    pub fail_count: Option<Collection>,
    pub fail_audit: bool,
    pub fail_all: bool,
    pub fail_export: bool,
    pub count_delay: Option<Duration>,
}

impl Default for MockRepo {
    fn default() -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            doctors: vec![],
            patients: vec![],
            appointments: vec![],
            metrics: vec![],
            predictions: vec![],
            full_predictions: vec![],
            risk_predictions: vec![],
            reference_images: vec![],
            images: vec![],
            exports: HashMap::new(),
            counts: HashMap::new(),
            cases: Mutex::new(vec![]),
            audit: Mutex::new(vec![]),
            artifacts: Mutex::new(vec![]),
            saved_metrics: Mutex::new(vec![]),
            saved_images: Mutex::new(vec![]),
            imported_metrics: Mutex::new(vec![]),
            imported_environmental: Mutex::new(vec![]),
            imported_patients: Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
            fail_count: None,
            fail_audit: false,
            fail_all: false,
            fail_export: false,
            count_delay: None,
        }
    }
}

impl MockRepo {
    pub fn with_profile(self, user_id: Uuid, is_admin: bool) -> Self {
        self.profiles.lock().unwrap().insert(
            user_id,
            Profile {
                user_id,
                full_name: Some("Existing".to_string()),
                is_admin,
                created_at: Utc::now(),
            },
        );
        self
    }

    pub fn with_admin(self) -> Self {
        self.with_profile(ADMIN_ID, true)
    }

    pub fn with_doctor(mut self) -> Self {
        self.doctors.push(Doctor {
            id: DOCTOR_ID,
            user_id: Some(DOCTOR_USER_ID),
            specialization: Some("Pulmonology".to_string()),
            created_at: Utc::now(),
            ..Doctor::default()
        });
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) -> Result<(), RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(query_failed());
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MockRepo {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, RepoError> {
        self.touch()?;
        Ok(self.profiles.lock().unwrap().get(&user_id).cloned())
    }

    async fn create_profile(&self, profile: NewProfile) -> Result<Profile, RepoError> {
        self.touch()?;
        let created = Profile {
            user_id: profile.user_id,
            full_name: Some(profile.full_name),
            is_admin: profile.is_admin,
            created_at: Utc::now(),
        };
        self.profiles
            .lock()
            .unwrap()
            .insert(created.user_id, created.clone());
        Ok(created)
    }

    async fn set_admin_flag(&self, user_id: Uuid, is_admin: bool) -> Result<(), RepoError> {
        self.touch()?;
        if let Some(profile) = self.profiles.lock().unwrap().get_mut(&user_id) {
            profile.is_admin = is_admin;
        }
        Ok(())
    }

    async fn count(&self, collection: Collection) -> Result<i64, RepoError> {
        self.touch()?;
        if let Some(delay) = self.count_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_count == Some(collection) {
            return Err(query_failed());
        }
        Ok(self.counts.get(&collection).copied().unwrap_or(0))
    }

    async fn list_appointments(
        &self,
        filter: AppointmentFilter,
        page: PageRequest,
    ) -> Result<PageResult<Appointment>, RepoError> {
        self.touch()?;
        let rows: Vec<Appointment> = self
            .appointments
            .iter()
            .filter(|a| eq_text(a.status.as_deref(), &filter.status))
            .filter(|a| filter.doctor_id.is_none() || a.doctor_id == filter.doctor_id)
            .filter(|a| filter.patient_id.is_none() || a.patient_id == filter.patient_id)
            .cloned()
            .collect();
        Ok(paginate(&rows, page))
    }

    async fn list_health_metrics(
        &self,
        filter: MetricFilter,
        page: PageRequest,
    ) -> Result<PageResult<HealthMetric>, RepoError> {
        self.touch()?;
        let rows: Vec<HealthMetric> = self
            .metrics
            .iter()
            .filter(|m| filter.patient_id.is_none() || m.patient_id == filter.patient_id)
            .cloned()
            .collect();
        Ok(paginate(&rows, page))
    }

    async fn list_predictions(
        &self,
        page: PageRequest,
    ) -> Result<PageResult<PredictionSummary>, RepoError> {
        self.touch()?;
        Ok(paginate(&self.predictions, page))
    }

    async fn list_risk_predictions(
        &self,
        filter: DataFilter,
        page: PageRequest,
    ) -> Result<PageResult<RiskPrediction>, RepoError> {
        self.touch()?;
        let rows: Vec<RiskPrediction> = self
            .risk_predictions
            .iter()
            .filter(|r| filter.patient_id.is_none() || r.patient_id == filter.patient_id)
            .cloned()
            .collect();
        Ok(paginate(&rows, page))
    }

    async fn list_patients(
        &self,
        _filter: PatientFilter,
        page: PageRequest,
    ) -> Result<PageResult<Patient>, RepoError> {
        self.touch()?;
        Ok(paginate(&self.patients, page))
    }

    async fn list_doctors(
        &self,
        filter: DoctorFilter,
        page: PageRequest,
    ) -> Result<PageResult<Doctor>, RepoError> {
        self.touch()?;
        let rows: Vec<Doctor> = self
            .doctors
            .iter()
            .filter(|d| contains_ci(d.specialization.as_deref(), &filter.search))
            .cloned()
            .collect();
        Ok(paginate(&rows, page))
    }

    async fn list_medical_images(
        &self,
        filter: ImagingFilter,
        page: PageRequest,
    ) -> Result<PageResult<MedicalImage>, RepoError> {
        self.touch()?;
        let rows: Vec<MedicalImage> = self
            .images
            .iter()
            .filter(|i| eq_text(Some(&i.image_type), &filter.image_type))
            .filter(|i| filter.user_id.is_none_or(|id| i.user_id == id))
            .cloned()
            .collect();
        Ok(paginate(&rows, page))
    }

    async fn list_cases(
        &self,
        filter: CaseFilter,
        page: PageRequest,
    ) -> Result<PageResult<ClinicalCase>, RepoError> {
        self.touch()?;
        let cases: Vec<ClinicalCase> = self
            .cases
            .lock()
            .unwrap()
            .iter()
            .filter(|c| eq_text(Some(&c.status), &filter.status))
            .filter(|c| contains_ci(Some(&c.case_title), &filter.search))
            .cloned()
            .collect();
        Ok(paginate(&cases, page))
    }

    async fn find_reference_images(
        &self,
        disease: Option<String>,
        limit: i64,
    ) -> Result<Vec<ReferenceImage>, RepoError> {
        self.touch()?;
        Ok(self
            .reference_images
            .iter()
            .filter(|r| contains_ci(Some(&r.disease_name), &disease))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, RepoError> {
        self.touch()?;
        Ok(self.appointments.iter().find(|a| a.id == id).cloned())
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, RepoError> {
        self.touch()?;
        Ok(self.patients.iter().find(|p| p.id == id).cloned())
    }

    async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, RepoError> {
        self.touch()?;
        Ok(self.doctors.iter().find(|d| d.id == id).cloned())
    }

    async fn find_doctor_by_user(&self, user_id: Uuid) -> Result<Option<Doctor>, RepoError> {
        self.touch()?;
        Ok(self
            .doctors
            .iter()
            .find(|d| d.user_id == Some(user_id))
            .cloned())
    }

    async fn get_prediction(&self, id: Uuid) -> Result<Option<Prediction>, RepoError> {
        self.touch()?;
        Ok(self.full_predictions.iter().find(|p| p.id == id).cloned())
    }

    async fn get_case(&self, id: Uuid) -> Result<Option<ClinicalCase>, RepoError> {
        self.touch()?;
        Ok(self.cases.lock().unwrap().iter().find(|c| c.id == id).cloned())
    }

    async fn list_case_artifacts(&self, case_id: Uuid) -> Result<Vec<CaseArtifact>, RepoError> {
        self.touch()?;
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.case_id == case_id)
            .cloned()
            .map(stored_artifact)
            .collect())
    }

    async fn list_case_audit(&self, case_id: Uuid) -> Result<Vec<CaseAuditEntry>, RepoError> {
        self.touch()?;
        Ok(self
            .audit
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.case_id == case_id)
            .map(|e| CaseAuditEntry {
                id: Uuid::new_v4(),
                case_id: e.case_id,
                action: e.action.clone(),
                actor_id: e.actor_id,
                actor_role: Some(e.actor_role.clone()),
                details: Some(e.details.clone()),
                created_at: Utc::now(),
            })
            .collect())
    }

    async fn patients_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Patient>, RepoError> {
        self.touch()?;
        let mut seen = Vec::new();
        for appointment in self
            .appointments
            .iter()
            .filter(|a| a.doctor_id == Some(doctor_id))
        {
            if let Some(patient) = self
                .patients
                .iter()
                .find(|p| Some(p.id) == appointment.patient_id)
            {
                if !seen.iter().any(|p: &Patient| p.id == patient.id) {
                    seen.push(patient.clone());
                }
            }
        }
        Ok(seen)
    }

    async fn risk_predictions_for_patients(
        &self,
        patient_ids: &[Uuid],
    ) -> Result<Vec<RiskPrediction>, RepoError> {
        self.touch()?;
        Ok(self
            .risk_predictions
            .iter()
            .filter(|r| r.patient_id.is_some_and(|id| patient_ids.contains(&id)))
            .cloned()
            .collect())
    }

    async fn create_case(&self, case: NewCase) -> Result<ClinicalCase, RepoError> {
        self.touch()?;
        let created = ClinicalCase {
            id: Uuid::new_v4(),
            case_number: case.case_number,
            patient_id: case.patient_id,
            doctor_id: case.doctor_id,
            case_title: case.case_title,
            case_description: case.case_description,
            status: case.status,
            created_at: Utc::now(),
        };
        self.cases.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), RepoError> {
        self.touch()?;
        if self.fail_audit {
            return Err(query_failed());
        }
        self.audit.lock().unwrap().push(entry);
        Ok(())
    }

    async fn create_artifact(&self, artifact: NewArtifact) -> Result<CaseArtifact, RepoError> {
        self.touch()?;
        self.artifacts.lock().unwrap().push(artifact.clone());
        Ok(stored_artifact(artifact))
    }

    async fn insert_health_metric(
        &self,
        metric: NewHealthMetric,
    ) -> Result<HealthMetric, RepoError> {
        self.touch()?;
        self.saved_metrics.lock().unwrap().push(metric.clone());
        Ok(HealthMetric {
            id: Uuid::new_v4(),
            user_id: Some(metric.user_id),
            patient_id: None,
            metric_type: metric.metric_type,
            value: metric.value,
            unit: metric.unit,
            recorded_at: Utc::now(),
        })
    }

    async fn insert_medical_image(
        &self,
        image: NewMedicalImage,
    ) -> Result<MedicalImage, RepoError> {
        self.touch()?;
        self.saved_images.lock().unwrap().push(image.clone());
        Ok(MedicalImage {
            id: Uuid::new_v4(),
            user_id: image.user_id,
            image_type: image.image_type,
            body_part: image.body_part,
            image_date: image.image_date,
            image_url: image.image_url,
            image_size_bytes: Some(image.image_size_bytes),
            mime_type: Some(image.mime_type),
            ordering_provider: image.ordering_provider,
            indication: image.indication,
            created_at: Utc::now(),
        })
    }

    async fn export_rows(&self, collection: Collection) -> Result<Vec<Value>, RepoError> {
        self.touch()?;
        if self.fail_export {
            return Err(query_failed());
        }
        Ok(self.exports.get(&collection).cloned().unwrap_or_default())
    }

    async fn upsert_health_metrics(&self, rows: Vec<MetricImport>) -> Result<u64, RepoError> {
        self.touch()?;
        let written = rows.len() as u64;
        self.imported_metrics.lock().unwrap().extend(rows);
        Ok(written)
    }

    async fn upsert_environmental(
        &self,
        rows: Vec<EnvironmentalImport>,
    ) -> Result<u64, RepoError> {
        self.touch()?;
        let written = rows.len() as u64;
        self.imported_environmental.lock().unwrap().extend(rows);
        Ok(written)
    }

    async fn upsert_patients(&self, rows: Vec<PatientImport>) -> Result<u64, RepoError> {
        self.touch()?;
        let written = rows.len() as u64;
        self.imported_patients.lock().unwrap().extend(rows);
        Ok(written)
    }
}

fn stored_artifact(artifact: NewArtifact) -> CaseArtifact {
    CaseArtifact {
        id: Uuid::new_v4(),
        case_id: artifact.case_id,
        artifact_type: artifact.artifact_type,
        artifact_name: artifact.artifact_name,
        file_url: artifact.file_url,
        file_size_bytes: Some(artifact.file_size_bytes),
        mime_type: Some(artifact.mime_type),
        uploaded_by: artifact.uploaded_by,
        upload_notes: artifact.upload_notes,
        created_at: Utc::now(),
    }
}

// --- TEST UTILITIES ---

pub fn test_config(env: Env) -> AppConfig {
    AppConfig {
        env,
        ..AppConfig::default()
    }
}

/// AppState over a shared mock so the test keeps a handle for assertions.
pub fn create_test_state(repo: Arc<MockRepo>, env: Env) -> AppState {
    let config = test_config(env);
    let identity: IdentityState = Arc::new(JwtIdentityProvider::new(&config.jwt_secret));
    AppState {
        repo,
        identity,
        config,
    }
}

/// Signs a Supabase-shaped access token with the test secret.
pub fn sign_token(sub: Uuid, email: &str, ttl_secs: i64) -> String {
    sign_claims(sub, email, None, ttl_secs)
}

/// Like `sign_token`, carrying a `user_metadata.full_name`.
pub fn sign_token_named(sub: Uuid, email: &str, full_name: &str) -> String {
    let metadata = UserMetadata {
        full_name: Some(full_name.to_string()),
    };
    sign_claims(sub, email, Some(metadata), 3600)
}

fn sign_claims(sub: Uuid, email: &str, user_metadata: Option<UserMetadata>, ttl_secs: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let claims = Claims {
        sub,
        email: Some(email.to_string()),
        aud: Some(SUPABASE_AUDIENCE.to_string()),
        user_metadata,
        exp: (now + ttl_secs) as usize,
        iat: now as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(AppConfig::default().jwt_secret.as_bytes()),
    )
    .unwrap()
}
