use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{component}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E7xxx: Pipeline/ETL errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    ServiceUnavailable,
    BadRequest,

    // Pipeline (E7xxx)
    ConnectionFailed,
    QueryFailed,
    WriteFailed,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::ServiceUnavailable => "E0007",
            Self::BadRequest => "E0008",

            // Pipeline
            Self::ConnectionFailed => "E7001",
            Self::QueryFailed => "E7002",
            Self::WriteFailed => "E7003",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError | Self::QueryFailed | Self::WriteFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ServiceUnavailable | Self::ConnectionFailed => StatusCode::SERVICE_UNAVAILABLE,
            Self::ValidationError | Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The store was unreachable or rejected the credentials.
    #[error("database connection error: {0}")]
    Connection(#[from] diesel::result::ConnectionError),

    /// A read query failed (malformed query, schema mismatch).
    #[error("query error: {0}")]
    Query(#[source] diesel::result::Error),

    /// An upsert or other write failed (e.g. constraint violation).
    #[error("write error: {0}")]
    Write(#[source] diesel::result::Error),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The error code this variant maps to, used for diagnostics and the
    /// HTTP error envelope.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Known { code, .. } => *code,
            Self::Connection(_) => ErrorCode::ConnectionFailed,
            Self::Query(_) => ErrorCode::QueryFailed,
            Self::Write(_) => ErrorCode::WriteFailed,
            Self::Internal(_) | Self::Database(_) => ErrorCode::InternalError,
            Self::Validation(_) => ErrorCode::ValidationError,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known {
                code,
                message,
                details,
            } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Connection(err) => {
                tracing::error!(error = %err, "database connection error");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ApiErrorResponse::new("E7001", "database unavailable"),
                )
            }
            AppError::Query(err) | AppError::Write(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new(self.error_code().code(), "database error"),
                )
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
