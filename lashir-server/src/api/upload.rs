//! Upload endpoint
//!
//! Accepts one audio file in multipart field `audio`, stages it on disk for
//! the detector, runs the batch pipeline and answers with the score URL. The
//! staged file is removed whatever the outcome.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::workflow::KeyView;
use crate::AppState;

/// Multipart field carrying the audio
const AUDIO_FIELD: &str = "audio";

/// Successful upload response
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Where the rendered score can be fetched
    pub pdf_url: String,
    /// The single key the whole recording was mapped under
    pub key: KeyView,
    /// Syllables in order, space separated
    pub solfa: String,
    /// Pitch names in order, space separated
    pub pitches: String,
}

/// Uploaded file on disk
///
/// Removed with [`StagedUpload::remove`]; dropping it unremoved (a handler
/// cancelled mid-pipeline) falls back to a blocking delete.
struct StagedUpload {
    path: PathBuf,
    removed: bool,
}

impl StagedUpload {
    async fn write(dir: &Path, extension: &str, bytes: &[u8]) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("lashir-upload-{}.{}", Uuid::new_v4(), extension));
        tokio::fs::write(&path, bytes).await?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) {
        self.removed = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload");
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload");
        }
    }
}

/// Fixed client message for a multipart read failure; the detail is logged
fn multipart_error(e: MultipartError) -> ApiError {
    let status = e.status();
    debug!(%status, error = %e.body_text(), "Multipart read failed");
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::TooLarge
    } else {
        ApiError::InvalidUpload
    }
}

/// Extension from the client's file name, if it is a plain one
fn file_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}

fn is_audio(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("audio/"))
        .unwrap_or(false)
}

/// POST /upload
pub async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let _permit = state
        .upload_permits
        .clone()
        .try_acquire_owned()
        .map_err(|_| ApiError::Busy)?;

    let mut multipart = multipart.map_err(|e| {
        debug!(error = %e, "Upload is not multipart");
        ApiError::MissingAudio
    })?;

    let mut staged = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }

        if !is_audio(field.content_type()) {
            debug!(content_type = ?field.content_type(), "Rejecting non-audio upload");
            return Err(ApiError::NotAudio);
        }

        let extension = file_extension(field.file_name());
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let upload = StagedUpload::write(&state.upload_dir, &extension, &bytes)
            .await
            .map_err(|e| {
                warn!(error = %e, dir = %state.upload_dir.display(), "Upload staging failed");
                ApiError::FileSave
            })?;
        debug!(path = %upload.path().display(), bytes = bytes.len(), "Upload staged");
        staged = Some(upload);
        break;
    }

    let staged = staged.ok_or(ApiError::MissingAudio)?;

    let result = state.pipeline.run(staged.path()).await;
    staged.remove().await;

    let outcome = result.map_err(|e| {
        warn!(error = %e, "Upload processing failed");
        ApiError::from(e)
    })?;

    info!(key = %outcome.key, notes = outcome.notes.len(), "Upload processed");

    Ok(Json(UploadResponse {
        pdf_url: outcome.artifact.to_string(),
        key: KeyView::from(&outcome.key),
        solfa: outcome.solfa_line(),
        pitches: outcome
            .observations
            .iter()
            .map(|o| o.name())
            .collect::<Vec<_>>()
            .join(" "),
    }))
}

/// Build upload routes with the configured body limit
pub fn upload_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
