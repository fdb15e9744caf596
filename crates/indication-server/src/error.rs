use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use indication_core::{ConfigError, MappingError, SourceError, StoreError};
use indication_llm::LlmError;
use serde_json::json;
use thiserror::Error;

/// Bootstrap failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("logger initialization failed: {0}")]
    Logger(String),
    #[error("store initialization failed: {0}")]
    Store(#[from] StoreError),
    #[error("DailyMed client initialization failed: {0}")]
    Source(#[from] SourceError),
    #[error("completion client initialization failed: {0}")]
    Llm(#[from] LlmError),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Error body returned by the HTTP routes.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<MappingError> for ApiError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::NotFound(message) => Self::not_found(message),
            MappingError::Upstream(message) => Self::internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
