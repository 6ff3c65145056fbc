//! HTTP error responses
//!
//! Every failure leaves the server as `{"error": "<message>"}` with a fixed,
//! client-safe message. Internal detail is logged where the error is raised.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::workflow::BatchError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Multipart body had no `audio` field (400)
    #[error("No audio file uploaded")]
    MissingAudio,

    /// Upload declared a non-audio content type (400)
    #[error("Uploaded file must be audio")]
    NotAudio,

    /// Multipart body could not be read (400)
    #[error("Invalid upload")]
    InvalidUpload,

    /// Upload exceeded `[limits] max_upload_bytes` (413)
    #[error("Uploaded file too large")]
    TooLarge,

    /// Upload could not be staged on disk (500)
    #[error("File save failed")]
    FileSave,

    /// Detector failed or returned unusable output (502)
    #[error("Pitch detection failed")]
    Detection,

    /// Detector returned nothing classifiable (422)
    #[error("No pitches detected")]
    NoPitches,

    /// Renderer failed (502)
    #[error("Notation generation failed")]
    Notation,

    /// Concurrency limit reached (503)
    #[error("Server busy")]
    Busy,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingAudio | ApiError::NotAudio | ApiError::InvalidUpload => {
                StatusCode::BAD_REQUEST
            }
            ApiError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::FileSave => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Detection | ApiError::Notation => StatusCode::BAD_GATEWAY,
            ApiError::NoPitches => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Busy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Detector(_) => ApiError::Detection,
            BatchError::NoPitches => ApiError::NoPitches,
            BatchError::Renderer(_) => ApiError::Notation,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
