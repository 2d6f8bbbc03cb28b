//! Timesheet entries, stats and work timers.

use std::sync::Arc;

use axum::Extension;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::db::{
    CreateTimesheetEntryParams, TimesheetEntryRecord, TimesheetFilter,
    UpdateTimesheetEntryParams,
};
use crate::legal::timesheet::{
    CaseTimesheetStats, TimerInfo, UserTimesheetStats, case_stats, user_stats,
};
use crate::notifications::model::double_option;
use crate::web::auth::AuthUser;
use crate::web::error::ApiError;
use crate::web::handlers::cases::CASE_NOT_FOUND;
use crate::web::handlers::{found, still_referenced};
use crate::web::server::AppState;
use crate::web::types::{DataResponse, JsonBody, PageQuery, QueryParams, parse_id};

const ENTRY_NOT_FOUND: &str = "Timesheet entry not found";
const TIMER_NOT_FOUND: &str = "Timer not found";
const TIMER_TARGET_GONE: &str =
    "The timer's case or task no longer exists; stop it with save=false to discard it";

/// Parse an optional JSON body; an empty body yields the default.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))
}

/// The task must exist and belong to `case_id`.
async fn check_task(state: &AppState, task_id: Option<Uuid>, case_id: Uuid) -> Result<(), ApiError> {
    if let Some(task_id) = task_id {
        match state.db.get_task(task_id).await? {
            Some(task) if task.case_id == case_id => {}
            _ => return Err(ApiError::bad_request("Invalid taskId")),
        }
    }
    Ok(())
}

// --- Entries ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryListQuery {
    pub case_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    pub case_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Worked milliseconds; defaults to `endTime - startTime`.
    pub duration: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub task_id: Option<Option<Uuid>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

async fn own_entry(
    state: &AppState,
    user: &AuthUser,
    raw: &str,
) -> Result<TimesheetEntryRecord, ApiError> {
    let id = parse_id(raw, ENTRY_NOT_FOUND)?;
    let entry = state
        .db
        .get_timesheet_entry(id)
        .await?
        .filter(|entry| entry.user_id == user.0.id);
    found(entry, ENTRY_NOT_FOUND)
}

pub async fn entries_list_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    QueryParams(page): QueryParams<PageQuery>,
    QueryParams(query): QueryParams<EntryListQuery>,
) -> Result<Json<DataResponse<Vec<TimesheetEntryRecord>>>, ApiError> {
    let page = page.into_request()?;
    let filter = TimesheetFilter {
        user_id: Some(user.0.id),
        case_id: query.case_id,
        task_id: query.task_id,
        from: query.from,
        to: query.to,
    };
    let paged = state.db.list_timesheet_entries(&filter, page).await?;
    Ok(DataResponse::paged(paged, page))
}

pub async fn entries_create_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    JsonBody(body): JsonBody<CreateEntryRequest>,
) -> Result<(StatusCode, Json<DataResponse<TimesheetEntryRecord>>), ApiError> {
    let (Some(case_id), Some(start_time), Some(end_time)) =
        (body.case_id, body.start_time, body.end_time)
    else {
        return Err(ApiError::bad_request(
            "caseId, startTime and endTime are required",
        ));
    };
    if end_time <= start_time {
        return Err(ApiError::bad_request("endTime must be after startTime"));
    }
    let span = (end_time - start_time).num_milliseconds();
    let duration = body.duration.unwrap_or(span);
    if !(0..=span).contains(&duration) {
        return Err(ApiError::bad_request(
            "duration must be between 0 and endTime - startTime",
        ));
    }
    if state.db.get_case(case_id).await?.is_none() {
        return Err(ApiError::bad_request("Invalid caseId"));
    }
    check_task(&state, body.task_id, case_id).await?;

    let entry = state
        .db
        .create_timesheet_entry(&CreateTimesheetEntryParams {
            case_id,
            user_id: user.0.id,
            task_id: body.task_id,
            start_time,
            end_time,
            duration,
            description: body.description,
        })
        .await?;
    Ok((StatusCode::CREATED, DataResponse::new(entry)))
}

pub async fn entries_get_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<TimesheetEntryRecord>>, ApiError> {
    Ok(DataResponse::new(own_entry(&state, &user, &id).await?))
}

pub async fn entries_update_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateEntryRequest>,
) -> Result<Json<DataResponse<TimesheetEntryRecord>>, ApiError> {
    let existing = own_entry(&state, &user, &id).await?;
    let start = body.start_time.unwrap_or(existing.start_time);
    let end = body.end_time.unwrap_or(existing.end_time);
    if end <= start {
        return Err(ApiError::bad_request("endTime must be after startTime"));
    }
    if let Some(task_id) = body.task_id {
        check_task(&state, task_id, existing.case_id).await?;
    }
    let updated = state
        .db
        .update_timesheet_entry(
            existing.id,
            &UpdateTimesheetEntryParams {
                task_id: body.task_id,
                start_time: body.start_time,
                end_time: body.end_time,
                description: body.description,
            },
        )
        .await?;
    Ok(DataResponse::new(found(updated, ENTRY_NOT_FOUND)?))
}

pub async fn entries_delete_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let entry = own_entry(&state, &user, &id).await?;
    found(
        state.db.delete_timesheet_entry(entry.id).await?.then_some(()),
        ENTRY_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Stats ---

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub async fn user_stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    QueryParams(query): QueryParams<StatsQuery>,
) -> Result<Json<DataResponse<UserTimesheetStats>>, ApiError> {
    let entries = state
        .db
        .timesheet_entries_in_range(&TimesheetFilter {
            user_id: Some(user.0.id),
            from: query.from,
            to: query.to,
            ..Default::default()
        })
        .await?;
    Ok(DataResponse::new(user_stats(&entries, Utc::now())))
}

pub async fn case_stats_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<StatsQuery>,
) -> Result<Json<DataResponse<CaseTimesheetStats>>, ApiError> {
    let case_id = parse_id(&id, CASE_NOT_FOUND)?;
    found(state.db.get_case(case_id).await?, CASE_NOT_FOUND)?;
    let entries = state
        .db
        .timesheet_entries_in_range(&TimesheetFilter {
            case_id: Some(case_id),
            from: query.from,
            to: query.to,
            ..Default::default()
        })
        .await?;
    Ok(DataResponse::new(case_stats(&entries)))
}

// --- Timers ---

#[derive(Debug, Default, Deserialize)]
pub struct StartTimerRequest {
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StopTimerRequest {
    /// Save the worked time as a timesheet entry.
    pub save: bool,
    pub description: Option<String>,
}

impl Default for StopTimerRequest {
    fn default() -> Self {
        Self {
            save: true,
            description: None,
        }
    }
}

pub async fn task_timer_start_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<DataResponse<TimerInfo>>), ApiError> {
    let task_id = parse_id(&id, "Task not found")?;
    let task = found(state.db.get_task(task_id).await?, "Task not found")?;
    let request: StartTimerRequest = optional_json(&body)?;
    let timer = state
        .timers
        .start(user.0.id, Some(task.case_id), Some(task.id), request.description)
        .await;
    tracing::info!(user_id = %user.0.id, timer_id = %timer.id, task_id = %task.id, "timer started");
    Ok((StatusCode::CREATED, DataResponse::new(timer)))
}

pub async fn timers_list_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<DataResponse<Vec<TimerInfo>>> {
    DataResponse::new(state.timers.active_for_user(user.0.id).await)
}

pub async fn timers_get_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<TimerInfo>>, ApiError> {
    let timer_id = parse_id(&id, TIMER_NOT_FOUND)?;
    Ok(DataResponse::new(
        state.timers.get(user.0.id, timer_id).await?,
    ))
}

pub async fn timers_pause_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<TimerInfo>>, ApiError> {
    let timer_id = parse_id(&id, TIMER_NOT_FOUND)?;
    Ok(DataResponse::new(
        state.timers.pause(user.0.id, timer_id).await?,
    ))
}

pub async fn timers_resume_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<TimerInfo>>, ApiError> {
    let timer_id = parse_id(&id, TIMER_NOT_FOUND)?;
    Ok(DataResponse::new(
        state.timers.resume(user.0.id, timer_id).await?,
    ))
}

/// Stop a timer. Saved timers answer 201 with the new timesheet entry;
/// discarded ones answer 200 with the final timer state.
pub async fn timers_stop_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let timer_id = parse_id(&id, TIMER_NOT_FOUND)?;
    let request: StopTimerRequest = optional_json(&body)?;
    if !request.save {
        let stopped = state.timers.stop(user.0.id, timer_id).await?;
        tracing::info!(timer_id = %stopped.timer.id, "timer discarded");
        return Ok(DataResponse::new(stopped).into_response());
    }

    // The timer stays registered until its entry is stored.
    let stopped = state.timers.stop_preview(user.0.id, timer_id).await?;
    let timer = &stopped.timer;
    let case_id = timer
        .case_id
        .ok_or_else(|| ApiError::bad_request("Timer has no case; it cannot be saved"))?;

    let entry = state
        .db
        .create_timesheet_entry(&CreateTimesheetEntryParams {
            case_id,
            user_id: user.0.id,
            task_id: timer.task_id,
            start_time: timer.start_time,
            end_time: timer.end_time(),
            duration: stopped.elapsed_ms,
            description: Some(
                request
                    .description
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| timer.description.clone()),
            ),
        })
        .await
        .map_err(still_referenced(TIMER_TARGET_GONE))?;
    if state.timers.discard(user.0.id, timer_id).await.is_err() {
        tracing::debug!(timer_id = %timer.id, "timer already stopped elsewhere");
    }
    tracing::info!(
        timer_id = %timer.id,
        entry_id = %entry.id,
        duration_ms = entry.duration,
        "timer saved as timesheet entry"
    );
    Ok((StatusCode::CREATED, DataResponse::new(entry)).into_response())
}
