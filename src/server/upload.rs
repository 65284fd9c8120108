//! Multipart intake: streams file parts to the upload dir and collects the
//! plain form fields.

use super::error::ApiError;
use crate::{config::Config, pipeline::Upload, scratch::Scratch};
use axum::extract::Multipart;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct ConversionForm {
    pub files: Vec<Upload>,
    pub from_format: Option<String>,
    pub to_format: Option<String>,
    pub options: Option<String>,
}

/// Reads the whole form. File parts named `file_field` are written to disk
/// (at most `max_files` of them); every path is tracked in `scratch` before
/// the first byte lands, so a rejected request leaves nothing behind.
pub async fn read_form(
    cfg: &Config,
    mut multipart: Multipart,
    file_field: &str,
    max_files: usize,
    scratch: &mut Scratch,
) -> Result<ConversionForm, ApiError> {
    let mut form = ConversionForm::default();
    let upload_dir = Path::new(&cfg.paths.upload_dir);
    let max_bytes = cfg.limits.max_file_bytes;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read multipart field: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == file_field {
            let original_name = field.file_name().unwrap_or_default().to_string();
            // Browsers send an empty, nameless part when nothing was picked.
            if original_name.is_empty() {
                continue;
            }
            if form.files.len() >= max_files {
                return Err(ApiError::BadRequest(format!(
                    "too many files: at most {max_files} per request"
                )));
            }

            let path = upload_dir.join(Uuid::new_v4().simple().to_string());
            scratch.track_file(&path);
            let mut file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| ApiError::Internal(format!("create upload {}: {e}", path.display())))?;

            let mut written: u64 = 0;
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read file chunk: {e}")))?
            {
                written += chunk.len() as u64;
                if written > max_bytes {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "{original_name} exceeds the {max_bytes} byte per-file limit"
                    )));
                }
                file.write_all(&chunk)
                    .await
                    .map_err(|e| ApiError::Internal(format!("write upload: {e}")))?;
            }
            file.flush()
                .await
                .map_err(|e| ApiError::Internal(format!("flush upload: {e}")))?;

            debug!(
                original_name = %original_name,
                size_bytes = written,
                path = %path.display(),
                "stored upload"
            );
            form.files.push(Upload {
                original_name,
                path,
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read field {name}: {e}")))?;
        match name.as_str() {
            "fromFormat" => form.from_format = Some(value),
            "toFormat" => form.to_format = Some(value),
            "options" => form.options = Some(value),
            other => debug!("ignoring form field {other}"),
        }
    }

    Ok(form)
}
