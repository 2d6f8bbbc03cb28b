//! Records owned by a case: tasks, events, memos and the expense/deposit
//! ledger.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{
    CaseEventRecord, CaseLedgerTotals, CaseMemoRecord, CreateCaseEventParams,
    CreateLedgerEntryParams, CreateTaskParams, LedgerEntryRecord, LedgerKind, TaskRecord,
    TaskStatus, UpdateTaskParams,
};
use crate::notifications::model::double_option;
use crate::web::error::ApiError;
use crate::web::handlers::cases::CASE_NOT_FOUND;
use crate::web::handlers::found;
use crate::web::server::AppState;
use crate::web::types::{DataResponse, JsonBody, QueryParams, non_empty, parse_id};

const TASK_NOT_FOUND: &str = "Task not found";
const EVENT_NOT_FOUND: &str = "Event not found";
const MEMO_NOT_FOUND: &str = "Memo not found";

/// Parse the case id and make sure the case exists.
async fn existing_case(state: &AppState, raw: &str) -> Result<Uuid, ApiError> {
    let case_id = parse_id(raw, CASE_NOT_FOUND)?;
    found(state.db.get_case(case_id).await?, CASE_NOT_FOUND)?;
    Ok(case_id)
}

async fn check_assignee(state: &AppState, user_id: Option<Uuid>) -> Result<(), ApiError> {
    if let Some(user_id) = user_id
        && state.db.get_user(user_id).await?.is_none()
    {
        return Err(ApiError::bad_request("Invalid assignedTo"));
    }
    Ok(())
}

// --- Tasks ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<Uuid>>,
}

pub async fn case_tasks_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<TaskRecord>>>, ApiError> {
    let case_id = existing_case(&state, &id).await?;
    Ok(DataResponse::new(state.db.list_tasks_for_case(case_id).await?))
}

pub async fn case_tasks_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CreateTaskRequest>,
) -> Result<(StatusCode, Json<DataResponse<TaskRecord>>), ApiError> {
    let case_id = existing_case(&state, &id).await?;
    let title = non_empty(body.title.as_deref())
        .ok_or_else(|| ApiError::bad_request("Title is required"))?
        .to_string();
    check_assignee(&state, body.assigned_to).await?;
    let task = state
        .db
        .create_task(&CreateTaskParams {
            case_id,
            title,
            description: body.description,
            status: body.status.unwrap_or(TaskStatus::Pending),
            due_date: body.due_date,
            assigned_to: body.assigned_to,
        })
        .await?;
    Ok((StatusCode::CREATED, DataResponse::new(task)))
}

pub async fn tasks_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<TaskRecord>>, ApiError> {
    let id = parse_id(&id, TASK_NOT_FOUND)?;
    Ok(DataResponse::new(found(
        state.db.get_task(id).await?,
        TASK_NOT_FOUND,
    )?))
}

pub async fn tasks_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateTaskRequest>,
) -> Result<Json<DataResponse<TaskRecord>>, ApiError> {
    let id = parse_id(&id, TASK_NOT_FOUND)?;
    if body.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("Title cannot be empty"));
    }
    if let Some(assignee) = body.assigned_to {
        check_assignee(&state, assignee).await?;
    }
    let updated = state
        .db
        .update_task(
            id,
            &UpdateTaskParams {
                title: body.title.map(|t| t.trim().to_string()),
                description: body.description,
                status: body.status,
                due_date: body.due_date,
                assigned_to: body.assigned_to,
            },
        )
        .await?;
    Ok(DataResponse::new(found(updated, TASK_NOT_FOUND)?))
}

pub async fn tasks_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, TASK_NOT_FOUND)?;
    found(state.db.delete_task(id).await?.then_some(()), TASK_NOT_FOUND)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Events ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub event_type: Option<String>,
    pub date_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

pub async fn case_events_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<EventListQuery>,
) -> Result<Json<DataResponse<Vec<CaseEventRecord>>>, ApiError> {
    let case_id = existing_case(&state, &id).await?;
    let events = state
        .db
        .list_case_events(case_id, non_empty(query.event_type.as_deref()))
        .await?;
    Ok(DataResponse::new(events))
}

pub async fn case_events_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CreateEventRequest>,
) -> Result<(StatusCode, Json<DataResponse<CaseEventRecord>>), ApiError> {
    let case_id = existing_case(&state, &id).await?;
    let (Some(event_type), Some(date_time)) =
        (non_empty(body.event_type.as_deref()), body.date_time)
    else {
        return Err(ApiError::bad_request("eventType and dateTime are required"));
    };
    let event = state
        .db
        .create_case_event(&CreateCaseEventParams {
            case_id,
            event_type: event_type.to_string(),
            date_time,
            location: body.location,
            title: body.title,
            description: body.description,
            created_by: body.created_by,
        })
        .await
        .map_err(|err| {
            if err.is_foreign_key_violation() {
                ApiError::bad_request("Invalid createdBy")
            } else {
                err.into()
            }
        })?;
    Ok((StatusCode::CREATED, DataResponse::new(event)))
}

pub async fn case_events_delete_handler(
    State(state): State<Arc<AppState>>,
    Path((id, event_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let case_id = parse_id(&id, EVENT_NOT_FOUND)?;
    let event_id = parse_id(&event_id, EVENT_NOT_FOUND)?;
    found(
        state
            .db
            .delete_case_event(case_id, event_id)
            .await?
            .then_some(()),
        EVENT_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Memos ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemoRequest {
    pub content: Option<String>,
    pub author_id: Option<Uuid>,
}

pub async fn case_memos_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<CaseMemoRecord>>>, ApiError> {
    let case_id = existing_case(&state, &id).await?;
    Ok(DataResponse::new(state.db.list_memos(case_id).await?))
}

pub async fn case_memos_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CreateMemoRequest>,
) -> Result<(StatusCode, Json<DataResponse<CaseMemoRecord>>), ApiError> {
    let case_id = existing_case(&state, &id).await?;
    let content = non_empty(body.content.as_deref())
        .ok_or_else(|| ApiError::bad_request("Content is required"))?;
    if let Some(author) = body.author_id
        && state.db.get_user(author).await?.is_none()
    {
        return Err(ApiError::bad_request("Invalid authorId"));
    }
    let memo = state.db.create_memo(case_id, body.author_id, content).await?;
    Ok((StatusCode::CREATED, DataResponse::new(memo)))
}

pub async fn case_memos_delete_handler(
    State(state): State<Arc<AppState>>,
    Path((id, memo_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let case_id = parse_id(&id, MEMO_NOT_FOUND)?;
    let memo_id = parse_id(&memo_id, MEMO_NOT_FOUND)?;
    found(
        state.db.delete_memo(case_id, memo_id).await?.then_some(()),
        MEMO_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Ledger ---

#[derive(Debug, Deserialize)]
pub struct CreateLedgerEntryRequest {
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
}

fn ledger_not_found(kind: LedgerKind) -> &'static str {
    match kind {
        LedgerKind::Expense => "Expense not found",
        LedgerKind::Deposit => "Deposit not found",
    }
}

async fn list_ledger(
    state: &AppState,
    id: &str,
    kind: LedgerKind,
) -> Result<Json<DataResponse<Vec<LedgerEntryRecord>>>, ApiError> {
    let case_id = existing_case(state, id).await?;
    Ok(DataResponse::new(
        state.db.list_ledger_entries(case_id, kind).await?,
    ))
}

async fn create_ledger(
    state: &AppState,
    id: &str,
    kind: LedgerKind,
    body: CreateLedgerEntryRequest,
) -> Result<(StatusCode, Json<DataResponse<LedgerEntryRecord>>), ApiError> {
    let case_id = existing_case(state, id).await?;
    let (Some(date), Some(amount), Some(description)) =
        (body.date, body.amount, non_empty(body.description.as_deref()))
    else {
        return Err(ApiError::bad_request(
            "date, amount and description are required",
        ));
    };
    if amount.is_sign_negative() {
        return Err(ApiError::bad_request("Amount cannot be negative"));
    }
    let entry = state
        .db
        .create_ledger_entry(&CreateLedgerEntryParams {
            case_id,
            kind,
            date,
            amount,
            description: description.to_string(),
        })
        .await?;
    Ok((StatusCode::CREATED, DataResponse::new(entry)))
}

async fn delete_ledger(
    state: &AppState,
    id: &str,
    entry_id: &str,
    kind: LedgerKind,
) -> Result<StatusCode, ApiError> {
    let case_id = parse_id(id, ledger_not_found(kind))?;
    let entry_id = parse_id(entry_id, ledger_not_found(kind))?;
    found(
        state
            .db
            .delete_ledger_entry(case_id, kind, entry_id)
            .await?
            .then_some(()),
        ledger_not_found(kind),
    )?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn case_expenses_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<LedgerEntryRecord>>>, ApiError> {
    list_ledger(&state, &id, LedgerKind::Expense).await
}

pub async fn case_expenses_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CreateLedgerEntryRequest>,
) -> Result<(StatusCode, Json<DataResponse<LedgerEntryRecord>>), ApiError> {
    create_ledger(&state, &id, LedgerKind::Expense, body).await
}

pub async fn case_expenses_delete_handler(
    State(state): State<Arc<AppState>>,
    Path((id, entry_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    delete_ledger(&state, &id, &entry_id, LedgerKind::Expense).await
}

pub async fn case_deposits_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<LedgerEntryRecord>>>, ApiError> {
    list_ledger(&state, &id, LedgerKind::Deposit).await
}

pub async fn case_deposits_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CreateLedgerEntryRequest>,
) -> Result<(StatusCode, Json<DataResponse<LedgerEntryRecord>>), ApiError> {
    create_ledger(&state, &id, LedgerKind::Deposit, body).await
}

pub async fn case_deposits_delete_handler(
    State(state): State<Arc<AppState>>,
    Path((id, entry_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    delete_ledger(&state, &id, &entry_id, LedgerKind::Deposit).await
}

#[derive(Debug, Serialize)]
pub struct LedgerView {
    #[serde(flatten)]
    pub totals: CaseLedgerTotals,
    pub expenses: Vec<LedgerEntryRecord>,
    pub deposits: Vec<LedgerEntryRecord>,
}

pub async fn case_ledger_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<LedgerView>>, ApiError> {
    let case_id = existing_case(&state, &id).await?;
    Ok(DataResponse::new(LedgerView {
        totals: state.db.ledger_totals(case_id).await?,
        expenses: state
            .db
            .list_ledger_entries(case_id, LedgerKind::Expense)
            .await?,
        deposits: state
            .db
            .list_ledger_entries(case_id, LedgerKind::Deposit)
            .await?,
    }))
}
