//! The signed-in user's relational inbox.

use std::sync::Arc;

use axum::Extension;
use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::db::NoticeRecord;
use crate::web::auth::AuthUser;
use crate::web::error::ApiError;
use crate::web::handlers::found;
use crate::web::server::AppState;
use crate::web::types::{DataResponse, QueryParams, parse_id};

const NOTICE_NOT_FOUND: &str = "Notice not found";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

pub async fn notices_list_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    QueryParams(query): QueryParams<NoticeQuery>,
) -> Result<Json<DataResponse<Vec<NoticeRecord>>>, ApiError> {
    let notices = state.db.list_notices(user.0.id, query.unread_only).await?;
    Ok(DataResponse::new(notices))
}

pub async fn notices_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<NoticeRecord>>, ApiError> {
    let id = parse_id(&id, NOTICE_NOT_FOUND)?;
    let notice = state.db.mark_notice_read(user.0.id, id).await?;
    Ok(DataResponse::new(found(notice, NOTICE_NOT_FOUND)?))
}

pub async fn notices_read_all_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DataResponse<CountResponse>>, ApiError> {
    let updated = state.db.mark_all_notices_read(user.0.id).await?;
    Ok(DataResponse::new(CountResponse { updated }))
}

pub async fn notices_delete_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DataResponse<DeletedResponse>>, ApiError> {
    let deleted = state.db.delete_read_notices(user.0.id).await?;
    tracing::debug!(user_id = %user.0.id, deleted, "deleted read notices");
    Ok(DataResponse::new(DeletedResponse { deleted }))
}
