//! REST handlers, grouped by resource.

pub mod accounts;
pub mod case_records;
pub mod cases;
pub mod courts;
pub mod documents;
pub mod firms;
pub mod hearings;
pub mod notices;
pub mod notifications;
pub mod parties;
pub mod timesheet;
pub mod workflow;

use axum::Json;
use serde::Serialize;

use crate::error::DatabaseError;
use crate::web::error::ApiError;

/// Unwrap a lookup or answer 404 with `message`.
pub(crate) fn found<T>(value: Option<T>, message: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::not_found(message))
}

/// Map a UNIQUE violation to a 400 with `message`.
pub(crate) fn unique_violation(message: &'static str) -> impl FnOnce(DatabaseError) -> ApiError {
    move |err| {
        if err.is_unique_violation() {
            ApiError::bad_request(message)
        } else {
            err.into()
        }
    }
}

/// Map a FOREIGN KEY violation to a 409 with `message`.
pub(crate) fn still_referenced(message: &'static str) -> impl FnOnce(DatabaseError) -> ApiError {
    move |err| {
        if err.is_foreign_key_violation() {
            ApiError::conflict(message)
        } else {
            err.into()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}
