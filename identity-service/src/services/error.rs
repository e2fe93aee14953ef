use service_core::axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::{AppError, ErrorBody};
use thiserror::Error;

/// Domain failures of the identity core. Every variant is recoverable by the
/// caller; store and internal failures are logged and reported generically.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Verification code has expired")]
    Expired,

    #[error("Too many failed attempts. Please request a new code")]
    TooManyAttempts,

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Account is not active")]
    Inactive,

    #[error("{0}")]
    Conflict(String),

    #[error("No password is set for this account")]
    NoPasswordSet,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(AppError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Unique-key violations from a store are a domain conflict, not a storage fault.
impl From<AppError> for ServiceError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Conflict(e) => ServiceError::Conflict(e.to_string()),
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Expired => "expired",
            ServiceError::TooManyAttempts => "too_many_attempts",
            ServiceError::InvalidCode => "invalid_code",
            ServiceError::InvalidCredentials => "invalid_credentials",
            ServiceError::InvalidToken => "invalid_token",
            ServiceError::AccessDenied(_) => "access_denied",
            ServiceError::Inactive => "inactive",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::NoPasswordSet => "no_password_set",
            ServiceError::Validation(_) => "validation_error",
            ServiceError::Store(e) => e.kind(),
            ServiceError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Expired
            | ServiceError::InvalidCode
            | ServiceError::NoPasswordSet => StatusCode::BAD_REQUEST,
            ServiceError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::InvalidCredentials | ServiceError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            ServiceError::AccessDenied(_) | ServiceError::Inactive => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Store(e) => e.status(),
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            ServiceError::Store(e) => e.into_response(),
            ServiceError::Internal(e) => {
                tracing::error!(error = ?e, "Identity operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        error: "internal_error".to_string(),
                        message: "Internal server error".to_string(),
                    }),
                )
                    .into_response()
            }
            other => (
                other.status(),
                Json(ErrorBody {
                    error: other.kind().to_string(),
                    message: other.to_string(),
                }),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_becomes_domain_conflict() {
        let err = ServiceError::from(AppError::Conflict(anyhow::anyhow!("duplicate")));
        assert!(matches!(&err, ServiceError::Conflict(msg) if msg == "duplicate"));
        assert_eq!(err.kind(), "conflict");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn database_failures_are_generic() {
        let err = ServiceError::from(AppError::DatabaseError(anyhow::anyhow!("relation missing")));
        assert_eq!(err.kind(), "internal_error");
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn otp_failures_are_distinct() {
        let kinds: Vec<_> = [
            ServiceError::Expired,
            ServiceError::TooManyAttempts,
            ServiceError::InvalidCode,
            ServiceError::NotFound("Verification code"),
        ]
        .iter()
        .map(|e| e.kind())
        .collect();
        assert_eq!(kinds, vec!["expired", "too_many_attempts", "invalid_code", "not_found"]);
    }
}
