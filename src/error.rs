use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GarrisonError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not assigned: {0}")]
    NotAssigned(String),

    #[error("Location mismatch: {0}")]
    LocationMismatch(String),

    #[error("QR code expired: {0}")]
    ExpiredQr(String),

    #[error("Invalid QR code: {0}")]
    InvalidQr(String),

    #[error("Shift mismatch: {0}")]
    ShiftMismatch(String),

    #[error("Overlapping shifts: {0}")]
    OverlappingShifts(String),

    #[error("Already marked: {0}")]
    AlreadyMarked(String),

    #[error("Too soon: {0}")]
    TooSoon(String),

    #[error("Duplicate active advance: {0}")]
    DuplicateActiveAdvance(String),

    #[error("Duplicate skip month: {0}")]
    DuplicateSkipMonth(String),

    #[error("Duplicate deduction: {0}")]
    DuplicateDeduction(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type GarrisonResult<T> = Result<T, GarrisonError>;

impl IntoResponse for GarrisonError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            GarrisonError::Database(ref e) => {
                tracing::error!("Database Error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred.".to_string(),
                )
            }
            GarrisonError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            GarrisonError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            GarrisonError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            GarrisonError::NotAssigned(msg) => (StatusCode::FORBIDDEN, msg),
            GarrisonError::LocationMismatch(msg) => (StatusCode::FORBIDDEN, msg),
            GarrisonError::ExpiredQr(msg) => (StatusCode::FORBIDDEN, msg),
            GarrisonError::InvalidQr(msg) => (StatusCode::FORBIDDEN, msg),
            GarrisonError::ShiftMismatch(msg) => (StatusCode::FORBIDDEN, msg),
            GarrisonError::OverlappingShifts(msg) => (StatusCode::CONFLICT, msg),
            GarrisonError::AlreadyMarked(msg) => (StatusCode::CONFLICT, msg),
            GarrisonError::TooSoon(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            GarrisonError::DuplicateActiveAdvance(msg) => (StatusCode::CONFLICT, msg),
            GarrisonError::DuplicateSkipMonth(msg) => (StatusCode::CONFLICT, msg),
            GarrisonError::DuplicateDeduction(msg) => (StatusCode::CONFLICT, msg),
            GarrisonError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            GarrisonError::Internal(msg) => {
                tracing::error!("Internal Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
            GarrisonError::Io(e) => {
                tracing::error!("IO Error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A file system error occurred.".to_string(),
                )
            }
            _ => {
                tracing::error!("Unhandled Error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
