//! Registration, login and the current user.

use std::sync::Arc;

use axum::Extension;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;

use crate::accounts::{RegisterInput, Session};
use crate::db::{UserRecord, UserRole};
use crate::web::auth::AuthUser;
use crate::web::error::ApiError;
use crate::web::server::AppState;
use crate::web::types::{DataResponse, JsonBody};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

fn credentials(
    email: Option<String>,
    password: Option<String>,
) -> Result<(String, String), ApiError> {
    match (email, password) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
            Ok((email, password))
        }
        _ => Err(ApiError::bad_request("Email and password are required")),
    }
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<DataResponse<UserRecord>>), ApiError> {
    let (email, password) = credentials(body.email, body.password)?;
    let user = state
        .accounts
        .register(RegisterInput {
            email,
            password,
            name: body.name,
            role: body.role.unwrap_or(UserRole::Staff),
        })
        .await?;
    Ok((StatusCode::CREATED, DataResponse::new(user)))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<Json<DataResponse<Session>>, ApiError> {
    let (email, password) = credentials(body.email, body.password)?;
    let session = state.accounts.login(&email, &password).await?;
    tracing::info!(user_id = %session.user.id, "user logged in");
    Ok(DataResponse::new(session))
}

pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default();
    state.accounts.logout(token.trim()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me_handler(
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Json<DataResponse<UserRecord>> {
    DataResponse::new(user)
}
