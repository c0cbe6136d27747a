//! Admin data export. The clinical collections are read concurrently and written as
//! one CSV file each inside a single zip archive, built in memory.

use std::{
    io::{Cursor, Write},
    time::Duration,
};

use serde_json::Value;
use thiserror::Error;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::{error::RepoError, query::Collection, repository::Repository, stats::within};

pub const EXPORT_FILE_NAME: &str = "healthcare-export.zip";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("zip encoding failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// export_archive
///
/// Reads the five exported collections with `tokio::try_join!` under one `timeout`.
/// Any failed read fails the export; a partial archive is never produced.
pub async fn export_archive(
    repo: &dyn Repository,
    timeout: Duration,
) -> Result<Vec<u8>, ExportError> {
    let reads = async {
        tokio::try_join!(
            repo.export_rows(Collection::Patients),
            repo.export_rows(Collection::Appointments),
            repo.export_rows(Collection::HealthMetrics),
            repo.export_rows(Collection::Predictions),
            repo.export_rows(Collection::MedicalImaging),
        )
    };
    let (patients, appointments, metrics, predictions, imaging) = within(timeout, reads).await?;

    let files = [
        ("patients.csv", patients),
        ("appointments.csv", appointments),
        ("health_metrics.csv", metrics),
        ("predictions.csv", predictions),
        ("medical_imaging.csv", imaging),
    ];

    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, rows) in &files {
        archive.start_file(*name, options)?;
        archive.write_all(&to_csv(rows)?)?;
    }
    let bytes = archive.finish()?.into_inner();

    tracing::info!(
        bytes = bytes.len(),
        rows = files.iter().map(|(_, rows)| rows.len()).sum::<usize>(),
        "export archive built"
    );
    Ok(bytes)
}

/// Renders JSON objects as CSV. The header is the union of keys in first-seen order;
/// a missing or null value is an empty cell and nested values are written as JSON.
pub fn to_csv(rows: &[Value]) -> Result<Vec<u8>, csv::Error> {
    let mut headers: Vec<&str> = Vec::new();
    for row in rows {
        if let Value::Object(fields) = row {
            for key in fields.keys() {
                if !headers.contains(&key.as_str()) {
                    headers.push(key);
                }
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    if headers.is_empty() {
        return finish(writer);
    }

    writer.write_record(&headers)?;
    for row in rows {
        let cells = headers.iter().map(|key| cell(row.get(*key)));
        writer.write_record(cells)?;
    }
    finish(writer)
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, csv::Error> {
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}
