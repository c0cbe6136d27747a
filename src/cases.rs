//! Clinical case workflow: opening a case and keeping its audit trail.
//!
//! A case row and its audit row are two separate writes. The audit write is
//! best-effort: if it fails the case still exists and is returned, and the failure
//! only shows up in the logs.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::RepoError,
    models::{CaseArtifact, ClinicalCase, Doctor, NewArtifact, NewAuditEntry, NewCase},
    repository::Repository,
};

pub const STATUS_OPEN: &str = "open";
pub const ACTOR_DOCTOR: &str = "doctor";

/// `CASE-<unix millis>`. Unique only to millisecond resolution.
pub fn case_number(at: DateTime<Utc>) -> String {
    format!("CASE-{}", at.timestamp_millis())
}

/// Audit actions recorded against a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Created,
    ArtifactAdded,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::ArtifactAdded => "artifact_added",
        }
    }
}

async fn record_audit(repo: &dyn Repository, entry: NewAuditEntry) {
    let case_id = entry.case_id;
    let action = entry.action.clone();
    if let Err(e) = repo.append_audit(entry).await {
        tracing::warn!(error = %e, %case_id, %action, "case audit write failed");
    }
}

/// open_case
///
/// Inserts a new `open` case owned by `doctor`, then records a `created` audit entry.
pub async fn open_case(
    repo: &dyn Repository,
    doctor: &Doctor,
    patient_id: Uuid,
    title: String,
    description: Option<String>,
) -> Result<ClinicalCase, RepoError> {
    let case = repo
        .create_case(NewCase {
            case_number: case_number(Utc::now()),
            patient_id,
            doctor_id: doctor.id,
            case_title: title.clone(),
            case_description: description,
            status: STATUS_OPEN.to_string(),
        })
        .await?;

    tracing::info!(case_id = %case.id, case_number = %case.case_number, "case opened");

    record_audit(
        repo,
        NewAuditEntry {
            case_id: case.id,
            action: AuditAction::Created.as_str().to_string(),
            actor_id: Some(doctor.id),
            actor_role: ACTOR_DOCTOR.to_string(),
            details: json!({ "case_title": title, "patient_id": patient_id }),
        },
    )
    .await;

    Ok(case)
}

/// attach_artifact
///
/// Stores an artifact against a case and records an `artifact_added` audit entry.
/// The actor is the uploading doctor when one is known.
pub async fn attach_artifact(
    repo: &dyn Repository,
    artifact: NewArtifact,
    actor: Option<Uuid>,
) -> Result<CaseArtifact, RepoError> {
    let created = repo.create_artifact(artifact).await?;

    record_audit(
        repo,
        NewAuditEntry {
            case_id: created.case_id,
            action: AuditAction::ArtifactAdded.as_str().to_string(),
            actor_id: actor,
            actor_role: ACTOR_DOCTOR.to_string(),
            details: json!({
                "artifact_type": created.artifact_type,
                "file_name": created.artifact_name,
            }),
        },
    )
    .await;

    Ok(created)
}
