use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use filter_agent::ExtractionError;
use search_pipeline::PipelineError;
use thiserror::Error;

use crate::core::http::response_envelope::Envelope;

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot ---
    #[error("failed to bind listener on {address}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error")]
    Server(#[source] std::io::Error),

    // --- Request ---
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request timed out")]
    Timeout,

    /// Mapped from lower layers with a specific status and code.
    #[error("{message}")]
    Http {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Http { status, .. } => *status,
            AppError::Bind { .. } | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::Bind { .. } => "BIND_ERROR",
            AppError::Server(_) => "SERVER_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Timeout => "TIMEOUT",
            AppError::Http { code, .. } => *code,
        }
    }

    fn retryable(&self) -> bool {
        let status = self.status_code();
        status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::GATEWAY_TIMEOUT
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        Envelope::failure(self.error_code(), self.to_string(), self.retryable()).respond(status)
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let (status, code) = match &err {
            PipelineError::EmptyQuery => (StatusCode::BAD_REQUEST, "EMPTY_QUERY"),
            PipelineError::UpstreamUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE"),
            PipelineError::Cancelled => (StatusCode::GATEWAY_TIMEOUT, "CANCELLED"),
            PipelineError::EmbeddingMismatch(_) => (StatusCode::INTERNAL_SERVER_ERROR, "EMBEDDING_MISMATCH"),
            PipelineError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "SEARCH_FAILED"),
        };
        AppError::Http {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<ExtractionError> for AppError {
    fn from(err: ExtractionError) -> Self {
        let (status, code) = match &err {
            ExtractionError::EmptyQuery => (StatusCode::BAD_REQUEST, "EMPTY_QUERY"),
            ExtractionError::Unavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "EXTRACTION_UNAVAILABLE"),
            ExtractionError::Cancelled => (StatusCode::GATEWAY_TIMEOUT, "CANCELLED"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "EXTRACTION_FAILED"),
        };
        AppError::Http {
            status,
            code,
            message: err.to_string(),
        }
    }
}
