use std::io;

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use thiserror::Error;

use crate::common::response::ApiError;

/// Failures while accepting and staging an upload. These are reported as a
/// plain HTTP error before any progress stream is opened.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No video file found in multipart request")]
    NoFile,

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("Only one file may be uploaded per request")]
    MultipleFiles,

    #[error("Failed to read upload: {message}")]
    Multipart { status: StatusCode, message: String },

    #[error("Failed to stage upload: {0}")]
    Staging(#[from] io::Error),
}

impl From<MultipartError> for IngestError {
    fn from(err: MultipartError) -> Self {
        IngestError::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::NoFile | IngestError::EmptyFile | IngestError::MultipleFiles => {
                StatusCode::BAD_REQUEST
            }
            IngestError::Multipart { status, .. } => *status,
            IngestError::Staging(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(err.to_string(), status)
    }
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Encoder I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{program} exited with {status}: {message}")]
    Failed {
        program: String,
        status: String,
        message: String,
    },

    #[error("Encoder finished without producing an output file")]
    MissingOutput,

    #[error("Client disconnected before encoding finished")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to read transcoded file: {0}")]
    Io(#[from] io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to create retrieval URL: {0}")]
    Url(String),
}
