use crate::image_processor::ProcessingError;
use crate::storage_client::StorageError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Failures of the upload endpoint, each mapped to a status and a client message
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File is required")]
    MissingFile,

    #[error("Invalid multipart body: {0}")]
    Multipart(String),

    #[error("Only JPG/PNG images are allowed")]
    UnsupportedType,

    #[error("Failed to decode image")]
    Decode(#[source] ProcessingError),

    #[error("Failed to compress image")]
    Compress(String),

    #[error("Failed to upload image to storage")]
    Upload(#[source] StorageError),
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl UploadError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::MissingFile
            | UploadError::Multipart(_)
            | UploadError::UnsupportedType
            | UploadError::Decode(_) => StatusCode::BAD_REQUEST,
            UploadError::Compress(_) | UploadError::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProcessingError> for UploadError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::Decode(_) => UploadError::Decode(err),
            ProcessingError::Encode(message) => UploadError::Compress(message),
        }
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        UploadError::Upload(err)
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            UploadError::Decode(source) => error!(error = %source, "Image decode failed"),
            UploadError::Compress(message) => error!(error = %message, "Image encode failed"),
            UploadError::Upload(source) => error!(error = %source, "Storage upload failed"),
            _ => {}
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(UploadError::MissingFile.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(UploadError::UnsupportedType.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            UploadError::from(ProcessingError::Decode("bad".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UploadError::from(ProcessingError::Encode("bad".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            UploadError::from(StorageError::Request("timeout".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_messages_hide_details() {
        let err = UploadError::from(StorageError::Status {
            status: 403,
            body: "secret detail".into(),
        });
        assert_eq!(err.to_string(), "Failed to upload image to storage");
    }
}
