//! Bulk CSV import behind `POST /data/csv-ingest`.
//!
//! Each dataset type maps onto one table and one conflict key. Rows are parsed and
//! validated in full before anything is written, so a bad row rejects the whole file.
//! Rows repeating a conflict key inside the same file collapse to the last one.

use std::{
    collections::{HashMap, hash_map::Entry},
    hash::Hash,
    str::FromStr,
};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::{ApiError, RepoError},
    models::{EnvironmentalImport, MetricImport, PatientImport},
    repository::Repository,
};

/// Request body cap for the import route, including multipart overhead.
pub const MAX_IMPORT_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    HealthMetrics,
    EnvironmentalData,
    PatientData,
}

impl Dataset {
    pub fn name(self) -> &'static str {
        match self {
            Dataset::HealthMetrics => "health-metrics",
            Dataset::EnvironmentalData => "environmental-data",
            Dataset::PatientData => "patient-data",
        }
    }
}

impl FromStr for Dataset {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "health-metrics" => Ok(Dataset::HealthMetrics),
            "environmental-data" => Ok(Dataset::EnvironmentalData),
            "patient-data" => Ok(Dataset::PatientData),
            other => Err(IngestError::UnknownDataset(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unknown datasetType: {0}")]
    UnknownDataset(String),
    #[error("Unreadable CSV: {0}")]
    Malformed(String),
    #[error("Invalid row on line {line}: {message}")]
    InvalidRow { line: u64, message: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::Repo(e) => {
                tracing::error!(error = %e, "Ingestion failed");
                ApiError::Internal("Ingestion failed")
            }
            input => ApiError::BadRequest(input.to_string()),
        }
    }
}

// --- Raw CSV rows ---
// Every column is optional here; required ones are checked per dataset below.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetricRow {
    patient_id: Option<Uuid>,
    metric_type: Option<String>,
    value: Option<f64>,
    unit: Option<String>,
    recorded_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvironmentalRow {
    user_id: Option<Uuid>,
    aqi_index: Option<i32>,
    pm25: Option<f64>,
    pm10: Option<f64>,
    temperature_celsius: Option<f64>,
    humidity_percent: Option<f64>,
    recorded_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PatientRow {
    user_id: Option<Uuid>,
    gender: Option<String>,
    blood_type: Option<String>,
    date_of_birth: Option<NaiveDate>,
    medical_history: Option<String>,
    allergies: Option<String>,
}

/// Deserializes every non-blank record against the header row, paired with its
/// 1-based line number.
fn read_rows<R: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<(u64, R)>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| IngestError::Malformed(e.to_string()))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| IngestError::Malformed(e.to_string()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row = record
            .deserialize::<R>(Some(&headers))
            .map_err(|e| IngestError::InvalidRow {
                line,
                message: e.to_string(),
            })?;
        rows.push((line, row));
    }
    Ok(rows)
}

fn required<T>(value: Option<T>, line: u64, column: &str) -> Result<T, IngestError> {
    value.ok_or_else(|| IngestError::InvalidRow {
        line,
        message: format!("missing {column}"),
    })
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (read as UTC) or a bare date at midnight UTC.
/// A missing timestamp is `now`.
fn recorded_at(
    raw: Option<String>,
    line: u64,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, IngestError> {
    let Some(raw) = raw else {
        return Ok(now);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(parsed.and_utc());
    }
    if let Some(midnight) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    Err(IngestError::InvalidRow {
        line,
        message: format!("unrecognised recorded_at '{raw}'"),
    })
}

/// Keeps the first position of each key and the last value written under it.
fn dedupe<T, K: Eq + Hash>(rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut unique: Vec<T> = Vec::with_capacity(rows.len());
    for row in rows {
        match positions.entry(key(&row)) {
            Entry::Occupied(slot) => unique[*slot.get()] = row,
            Entry::Vacant(slot) => {
                slot.insert(unique.len());
                unique.push(row);
            }
        }
    }
    unique
}

pub fn parse_metrics(bytes: &[u8], now: DateTime<Utc>) -> Result<Vec<MetricImport>, IngestError> {
    let rows = read_rows::<MetricRow>(bytes)?
        .into_iter()
        .map(|(line, row)| -> Result<_, IngestError> {
            let value = required(row.value, line, "value")?;
            if !value.is_finite() {
                return Err(IngestError::InvalidRow {
                    line,
                    message: "value must be a finite number".to_string(),
                });
            }
            Ok(MetricImport {
                patient_id: required(row.patient_id, line, "patient_id")?,
                metric_type: required(row.metric_type, line, "metric_type")?,
                value,
                unit: row.unit,
                recorded_at: recorded_at(row.recorded_at, line, now)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(dedupe(rows, |m| {
        (m.patient_id, m.metric_type.clone(), m.recorded_at)
    }))
}

pub fn parse_environmental(
    bytes: &[u8],
    now: DateTime<Utc>,
) -> Result<Vec<EnvironmentalImport>, IngestError> {
    let rows = read_rows::<EnvironmentalRow>(bytes)?
        .into_iter()
        .map(|(line, row)| -> Result<_, IngestError> {
            Ok(EnvironmentalImport {
                user_id: required(row.user_id, line, "user_id")?,
                aqi_index: required(row.aqi_index, line, "aqi_index")?,
                pm25: row.pm25,
                pm10: row.pm10,
                temperature_celsius: row.temperature_celsius,
                humidity_percent: row.humidity_percent,
                recorded_at: recorded_at(row.recorded_at, line, now)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(dedupe(rows, |e| (e.user_id, e.recorded_at)))
}

pub fn parse_patients(bytes: &[u8]) -> Result<Vec<PatientImport>, IngestError> {
    let rows = read_rows::<PatientRow>(bytes)?
        .into_iter()
        .map(|(line, row)| -> Result<_, IngestError> {
            Ok(PatientImport {
                user_id: required(row.user_id, line, "user_id")?,
                gender: row.gender,
                blood_type: row.blood_type,
                date_of_birth: row.date_of_birth,
                medical_history: row.medical_history,
                allergies: row.allergies,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(dedupe(rows, |p| p.user_id))
}

/// ingest
///
/// Parses `bytes` as `dataset` and upserts the rows. Returns the number of rows
/// written. A file with only a header writes nothing.
pub async fn ingest(
    repo: &dyn Repository,
    dataset: Dataset,
    bytes: &[u8],
    now: DateTime<Utc>,
) -> Result<u64, IngestError> {
    let written = match dataset {
        Dataset::HealthMetrics => {
            let rows = parse_metrics(bytes, now)?;
            if rows.is_empty() {
                return Ok(0);
            }
            repo.upsert_health_metrics(rows).await?
        }
        Dataset::EnvironmentalData => {
            let rows = parse_environmental(bytes, now)?;
            if rows.is_empty() {
                return Ok(0);
            }
            repo.upsert_environmental(rows).await?
        }
        Dataset::PatientData => {
            let rows = parse_patients(bytes)?;
            if rows.is_empty() {
                return Ok(0);
            }
            repo.upsert_patients(rows).await?
        }
    };

    tracing::info!(dataset = dataset.name(), written, "csv dataset ingested");
    Ok(written)
}
