//! Multipart ingestion. Uploaded files are never written to object storage: the
//! bytes are base64-encoded into a `data:` URI and stored in the row itself, which
//! inflates them by roughly a third. Row size is the practical upper bound.

use std::collections::HashMap;

use axum::extract::Multipart;
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::ApiError;

/// Request body cap for upload routes, including multipart overhead.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const FALLBACK_MIME: &str = "application/octet-stream";

/// `data:<mime>;base64,<payload>`
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// A single file part.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn size(&self) -> i64 {
        self.bytes.len() as i64
    }

    pub fn data_uri(&self) -> String {
        encode_data_uri(&self.mime, &self.bytes)
    }

    pub fn is_pdf(&self) -> bool {
        self.mime.contains("pdf")
    }
}

/// UploadForm
///
/// A fully buffered multipart form: the `file` part plus every text field.
/// Unreadable bodies are a 400.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "unreadable multipart body");
                    return Err(ApiError::BadRequest("Invalid multipart body".into()));
                }
            };

            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime = field
                    .content_type()
                    .filter(|m| !m.is_empty())
                    .unwrap_or(FALLBACK_MIME)
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    tracing::warn!(error = %e, "failed to read upload bytes");
                    ApiError::BadRequest("Failed to read file data".into())
                })?;
                form.file = Some(UploadedFile {
                    name: file_name,
                    mime,
                    bytes: bytes.to_vec(),
                });
            } else {
                let value = field.text().await.map_err(|e| {
                    tracing::warn!(error = %e, field = %name, "failed to read form field");
                    ApiError::BadRequest(format!("Invalid form field: {}", name))
                })?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// A text field, trimmed. Empty values count as absent.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn require_file(&mut self) -> Result<UploadedFile, ApiError> {
        self.file
            .take()
            .ok_or_else(|| ApiError::BadRequest("No file provided".into()))
    }

    #[cfg(test)]
    fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }
}
