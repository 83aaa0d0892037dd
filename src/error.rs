use actix_web::http::{header::ContentType, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::render::RenderError;
use crate::storage::StorageError;
use crate::template::{MergeError, TemplateError};

/// Every failure a request can end with, mapped onto an HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidPayload(String),
    #[error("Template not found: {0}")]
    TemplateNotFound(String),
    #[error("Template is missing fields: {}", .0.join(", "))]
    MissingTemplateFields(Vec<String>),
    #[error("{0}")]
    Render(RenderError),
    #[error("Invalid file name.")]
    InvalidRetrievalName(String),
    #[error("Only PDF files are allowed.")]
    InvalidExtension(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_json() -> Self {
        Self::InvalidPayload("Invalid JSON payload.".to_string())
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(name) => Self::TemplateNotFound(name),
            other => {
                log::error!("Template lookup failed: {}", other);
                Self::Internal("Failed to look up template.".to_string())
            }
        }
    }
}

impl From<MergeError> for ApiError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::InvalidPayloadShape => Self::InvalidPayload(err.to_string()),
            MergeError::MissingFields(fields) => Self::MissingTemplateFields(fields),
            other => Self::Render(RenderError::Merge(other)),
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Merge(merge) => merge.into(),
            RenderError::Template(template) => template.into(),
            other => Self::Render(other),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidName(name) => Self::InvalidRetrievalName(name),
            StorageError::InvalidExtension(name) => Self::InvalidExtension(name),
            StorageError::NotFound(name) => Self::FileNotFound(name),
            StorageError::Io(e) => {
                log::error!("Output directory I/O failed: {}", e);
                Self::Internal("Failed to access output directory.".to_string())
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPayload(_)
            | Self::MissingTemplateFields(_)
            | Self::InvalidRetrievalName(_)
            | Self::InvalidExtension(_) => StatusCode::BAD_REQUEST,
            Self::TemplateNotFound(_) | Self::FileNotFound(_) => StatusCode::NOT_FOUND,
            Self::Render(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed ({}): {}", status, self);
        } else {
            log::warn!("Request rejected ({}): {:?}", status, self);
        }

        HttpResponse::build(status)
            .insert_header(ContentType::plaintext())
            .body(self.to_string())
    }
}
