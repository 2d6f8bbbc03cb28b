//! Hearing reports filed against case events, and the documents submitted
//! at each hearing.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use crate::db::{
    CaseEventRecord, CreateHearingReportParams, CreateSubmittedDocumentParams,
    HearingReportRecord, SubmittedDocumentFilter, SubmittedDocumentRecord,
    UpdateHearingReportParams, UpdateSubmittedDocumentParams,
};
use crate::notifications::model::double_option;
use crate::web::error::ApiError;
use crate::web::handlers::cases::CASE_NOT_FOUND;
use crate::web::handlers::{found, unique_violation};
use crate::web::server::AppState;
use crate::web::types::{DataResponse, JsonBody, QueryParams, non_empty, parse_id};

const EVENT_NOT_FOUND: &str = "Event not found";
const REPORT_NOT_FOUND: &str = "Hearing report not found";
const REPORT_EXISTS: &str = "Hearing report already exists for this event";
const DOCUMENT_NOT_FOUND: &str = "Submitted document not found";

#[derive(Debug, Deserialize)]
pub struct CreateHearingReportRequest {
    pub attendees: Option<serde_json::Value>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateHearingReportRequest {
    pub attendees: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedDocumentRequest {
    pub document_name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmittedDocumentQuery {
    pub status: Option<String>,
    pub search: Option<String>,
}

/// The event, provided it belongs to the case in the path.
async fn case_event(
    state: &AppState,
    raw_case: &str,
    raw_event: &str,
) -> Result<CaseEventRecord, ApiError> {
    let case_id = parse_id(raw_case, CASE_NOT_FOUND)?;
    let event_id = parse_id(raw_event, EVENT_NOT_FOUND)?;
    found(state.db.get_case(case_id).await?, CASE_NOT_FOUND)?;
    match state.db.get_case_event(event_id).await? {
        Some(event) if event.case_id == case_id => Ok(event),
        _ => Err(ApiError::not_found(EVENT_NOT_FOUND)),
    }
}

async fn existing_report(state: &AppState, raw: &str) -> Result<HearingReportRecord, ApiError> {
    let id = parse_id(raw, REPORT_NOT_FOUND)?;
    found(state.db.get_hearing_report(id).await?, REPORT_NOT_FOUND)
}

/// Empty strings are rejected rather than stored.
fn optional_text(value: Option<String>, field: &str) -> Result<Option<String>, ApiError> {
    match value {
        Some(raw) => non_empty(Some(&raw))
            .map(|v| Some(v.to_string()))
            .ok_or_else(|| ApiError::bad_request(format!("{field} cannot be empty"))),
        None => Ok(None),
    }
}

pub async fn event_hearing_report_get_handler(
    State(state): State<Arc<AppState>>,
    Path((id, event_id)): Path<(String, String)>,
) -> Result<Json<DataResponse<HearingReportRecord>>, ApiError> {
    let event = case_event(&state, &id, &event_id).await?;
    Ok(DataResponse::new(found(
        state.db.get_hearing_report_for_event(event.id).await?,
        REPORT_NOT_FOUND,
    )?))
}

pub async fn event_hearing_report_create_handler(
    State(state): State<Arc<AppState>>,
    Path((id, event_id)): Path<(String, String)>,
    JsonBody(body): JsonBody<CreateHearingReportRequest>,
) -> Result<(StatusCode, Json<DataResponse<HearingReportRecord>>), ApiError> {
    let event = case_event(&state, &id, &event_id).await?;
    if state.db.get_hearing_report_for_event(event.id).await?.is_some() {
        return Err(ApiError::bad_request(REPORT_EXISTS));
    }
    let report = state
        .db
        .create_hearing_report(&CreateHearingReportParams {
            case_event_id: event.id,
            attendees: body.attendees.unwrap_or_else(|| serde_json::json!([])),
            notes: body.notes,
        })
        .await
        .map_err(unique_violation(REPORT_EXISTS))?;
    tracing::info!(case_id = %event.case_id, report_id = %report.id, "hearing report filed");
    Ok((StatusCode::CREATED, DataResponse::new(report)))
}

pub async fn case_hearing_reports_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<HearingReportRecord>>>, ApiError> {
    let case_id = parse_id(&id, CASE_NOT_FOUND)?;
    found(state.db.get_case(case_id).await?, CASE_NOT_FOUND)?;
    Ok(DataResponse::new(
        state.db.list_hearing_reports(case_id).await?,
    ))
}

pub async fn hearing_reports_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<HearingReportRecord>>, ApiError> {
    Ok(DataResponse::new(existing_report(&state, &id).await?))
}

pub async fn hearing_reports_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateHearingReportRequest>,
) -> Result<Json<DataResponse<HearingReportRecord>>, ApiError> {
    let id = parse_id(&id, REPORT_NOT_FOUND)?;
    let updated = state
        .db
        .update_hearing_report(
            id,
            &UpdateHearingReportParams {
                attendees: body.attendees,
                notes: body.notes,
            },
        )
        .await?;
    Ok(DataResponse::new(found(updated, REPORT_NOT_FOUND)?))
}

pub async fn hearing_reports_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, REPORT_NOT_FOUND)?;
    found(
        state.db.delete_hearing_report(id).await?.then_some(()),
        REPORT_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn report_documents_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<SubmittedDocumentRecord>>>, ApiError> {
    let report = existing_report(&state, &id).await?;
    Ok(DataResponse::new(
        state.db.list_report_documents(report.id).await?,
    ))
}

pub async fn report_documents_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<SubmittedDocumentRequest>,
) -> Result<(StatusCode, Json<DataResponse<SubmittedDocumentRecord>>), ApiError> {
    let report = existing_report(&state, &id).await?;
    let name = non_empty(body.document_name.as_deref())
        .ok_or_else(|| ApiError::bad_request("documentName is required"))?
        .to_string();
    let document = state
        .db
        .create_submitted_document(&CreateSubmittedDocumentParams {
            hearing_report_id: report.id,
            document_name: name,
            status: body.status,
        })
        .await?;
    Ok((StatusCode::CREATED, DataResponse::new(document)))
}

pub async fn case_submitted_documents_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<SubmittedDocumentQuery>,
) -> Result<Json<DataResponse<Vec<SubmittedDocumentRecord>>>, ApiError> {
    let case_id = parse_id(&id, CASE_NOT_FOUND)?;
    found(state.db.get_case(case_id).await?, CASE_NOT_FOUND)?;
    let documents = state
        .db
        .list_case_documents(
            case_id,
            &SubmittedDocumentFilter {
                status: query.status,
                search: query.search,
            },
        )
        .await?;
    Ok(DataResponse::new(documents))
}

pub async fn submitted_documents_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<SubmittedDocumentRecord>>, ApiError> {
    let id = parse_id(&id, DOCUMENT_NOT_FOUND)?;
    Ok(DataResponse::new(found(
        state.db.get_submitted_document(id).await?,
        DOCUMENT_NOT_FOUND,
    )?))
}

pub async fn submitted_documents_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<SubmittedDocumentRequest>,
) -> Result<Json<DataResponse<SubmittedDocumentRecord>>, ApiError> {
    let id = parse_id(&id, DOCUMENT_NOT_FOUND)?;
    let updated = state
        .db
        .update_submitted_document(
            id,
            &UpdateSubmittedDocumentParams {
                document_name: optional_text(body.document_name, "documentName")?,
                status: optional_text(body.status, "status")?,
            },
        )
        .await?;
    Ok(DataResponse::new(found(updated, DOCUMENT_NOT_FOUND)?))
}

pub async fn submitted_documents_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, DOCUMENT_NOT_FOUND)?;
    found(
        state.db.delete_submitted_document(id).await?.then_some(()),
        DOCUMENT_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}
