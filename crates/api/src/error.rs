use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use clubjoin_core::error::CoreError;
use clubjoin_pipeline::EnrollmentError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`EnrollmentError`] for
/// workflow aborts. Implements [`IntoResponse`] to produce the
/// `{success: false, message, error, code}` body.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The enrollment workflow aborted.
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "An internal error occurred";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => classify_core_error(core),

            // --- Workflow aborts ---
            AppError::Enrollment(err) => {
                tracing::error!(error = %err, "Enrollment aborted");
                match err {
                    EnrollmentError::Allocation(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "ALLOCATION_FAILED",
                        "A member number could not be allocated".to_string(),
                    ),
                    EnrollmentError::MembershipWrite { step, .. } => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "MEMBERSHIP_WRITE_FAILED",
                        format!("The {step} record could not be saved"),
                    ),
                    EnrollmentError::Procedure(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "PROCEDURE_FAILED",
                        INTERNAL_MESSAGE.to_string(),
                    ),
                    EnrollmentError::Core(core) => classify_core_error(core),
                }
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    INTERNAL_MESSAGE.to_string(),
                )
            }
        };

        let message = if status.is_server_error() {
            "Enrollment failed"
        } else {
            "Enrollment request rejected"
        };

        let body = json!({
            "success": false,
            "message": message,
            "error": error,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, key } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} '{key}' not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                INTERNAL_MESSAGE.to_string(),
            )
        }
    }
}
