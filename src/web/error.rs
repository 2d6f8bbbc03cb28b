//! HTTP error mapping for the relational REST routes.
//!
//! Every failure leaves as `{ "error": "<message>" }`. Server-side faults are
//! logged with their cause and answered with a generic message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::{AuthError, DatabaseError, TimerError, TransitionError, WorkflowError};
use crate::web::types::ErrorResponse;

const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Internal(cause) => {
                tracing::error!(%cause, "request failed");
                INTERNAL_MESSAGE.to_string()
            }
            Self::BadRequest(message)
            | Self::Unauthorized(message)
            | Self::NotFound(message)
            | Self::Conflict(message)
            | Self::PayloadTooLarge(message)
            | Self::Unprocessable(message) => message,
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidToken => {
                Self::Unauthorized(err.to_string())
            }
            AuthError::EmailTaken => Self::Conflict(err.to_string()),
            AuthError::Validation(message) => Self::BadRequest(message),
            AuthError::Hashing(_) | AuthError::Database(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<TimerError> for ApiError {
    fn from(err: TimerError) -> Self {
        match err {
            TimerError::NotFound => Self::NotFound(err.to_string()),
            TimerError::NotRunning | TimerError::NotPaused => Self::Conflict(err.to_string()),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::UnknownParent(_) => Self::BadRequest("Invalid parentCategoryId".into()),
            WorkflowError::Cycle
            | WorkflowError::PhaseOutsideCategory { .. }
            | WorkflowError::SamePhase(_)
            | WorkflowError::NoRule { .. }
            | WorkflowError::NotInitialPhase
            | WorkflowError::DueDateOutOfRange(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::CaseNotFound => Self::NotFound("Case not found".into()),
            TransitionError::PhaseNotFound => Self::BadRequest("Invalid toPhaseId".into()),
            TransitionError::Workflow(inner) => inner.into(),
            TransitionError::Database(DatabaseError::Constraint(_)) => {
                Self::Conflict("Case phase changed concurrently; retry the transition".into())
            }
            TransitionError::Database(inner) => inner.into(),
        }
    }
}
