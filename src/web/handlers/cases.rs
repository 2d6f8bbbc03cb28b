//! Cases, their party links and user assignments.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{
    CaseAssignmentRecord, CaseFilter, CasePartyRecord, CaseRecord, CreateCaseParams,
    PartyWithProfiles, UpdateCaseParams,
};
use crate::notifications::model::double_option;
use crate::web::error::ApiError;
use crate::web::handlers::{found, unique_violation};
use crate::web::server::AppState;
use crate::web::types::{DataResponse, JsonBody, PageQuery, QueryParams, non_empty, parse_id};

pub(crate) const CASE_NOT_FOUND: &str = "Case not found";
const CASE_NUMBER_TAKEN: &str = "Case number already exists";
const CASE_PARTY_NOT_FOUND: &str = "Case party not found";
const DUPLICATE_CASE_PARTY: &str = "Party already exists in this case with this role";
const INVALID_CASE_OR_PARTY: &str = "Invalid caseId or partyId";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseListQuery {
    pub category_id: Option<Uuid>,
    pub status: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCaseRequest {
    pub name: Option<String>,
    pub category_id: Option<Uuid>,
    pub case_number: Option<String>,
    pub status: Option<String>,
    pub trial_level: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub first_consultation_date: Option<DateTime<Utc>>,
    pub engagement_date: Option<DateTime<Utc>>,
    pub case_closed_date: Option<DateTime<Utc>>,
    pub judgment_date: Option<DateTime<Utc>>,
    pub has_engagement_letter: Option<bool>,
    pub remarks: Option<String>,
    pub custom_properties: Option<serde_json::Value>,
    pub current_phase_id: Option<Uuid>,
    pub court_division_id: Option<Uuid>,
}

/// Partial update. An explicit `null` clears a nullable field.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCaseRequest {
    pub name: Option<String>,
    pub category_id: Option<Uuid>,
    #[serde(default, deserialize_with = "double_option")]
    pub case_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub status: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub trial_level: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub hourly_rate: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub first_consultation_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub engagement_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub case_closed_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub judgment_date: Option<Option<DateTime<Utc>>>,
    pub has_engagement_letter: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub remarks: Option<Option<String>>,
    pub custom_properties: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "double_option")]
    pub current_phase_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub court_division_id: Option<Option<Uuid>>,
}

async fn check_category(state: &AppState, category_id: Uuid) -> Result<(), ApiError> {
    match state.db.get_category(category_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::bad_request("Invalid categoryId")),
    }
}

/// The phase must exist and belong to the case's category.
async fn check_phase(state: &AppState, phase_id: Uuid, category_id: Uuid) -> Result<(), ApiError> {
    match state.db.get_phase(phase_id).await? {
        Some(phase) if phase.category_id == category_id => Ok(()),
        _ => Err(ApiError::bad_request("Invalid currentPhaseId")),
    }
}

async fn check_division(state: &AppState, division_id: Uuid) -> Result<(), ApiError> {
    match state.db.get_division(division_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::bad_request("Invalid courtDivisionId")),
    }
}

/// Reject a case number already used by a case other than `except`.
async fn check_case_number(
    state: &AppState,
    case_number: &str,
    except: Option<Uuid>,
) -> Result<(), ApiError> {
    match state.db.get_case_by_number(case_number).await? {
        Some(existing) if Some(existing.id) != except => {
            Err(ApiError::bad_request(CASE_NUMBER_TAKEN))
        }
        _ => Ok(()),
    }
}

pub async fn cases_list_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(page): QueryParams<PageQuery>,
    QueryParams(query): QueryParams<CaseListQuery>,
) -> Result<Json<DataResponse<Vec<CaseRecord>>>, ApiError> {
    let page = page.into_request()?;
    let filter = CaseFilter {
        category_id: query.category_id,
        status: non_empty(query.status.as_deref()).map(String::from),
        name: non_empty(query.name.as_deref()).map(String::from),
    };
    let paged = state.db.list_cases(&filter, page).await?;
    Ok(DataResponse::paged(paged, page))
}

pub async fn cases_create_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CreateCaseRequest>,
) -> Result<(StatusCode, Json<DataResponse<CaseRecord>>), ApiError> {
    let (Some(name), Some(category_id)) = (non_empty(body.name.as_deref()), body.category_id)
    else {
        return Err(ApiError::bad_request("Name and categoryId are required"));
    };
    check_category(&state, category_id).await?;
    if let Some(phase_id) = body.current_phase_id {
        check_phase(&state, phase_id, category_id).await?;
    }
    if let Some(division_id) = body.court_division_id {
        check_division(&state, division_id).await?;
    }
    let case_number = non_empty(body.case_number.as_deref()).map(String::from);
    if let Some(number) = case_number.as_deref() {
        check_case_number(&state, number, None).await?;
    }

    let mut params = CreateCaseParams::new(name, category_id);
    params.case_number = case_number;
    params.status = body.status;
    params.trial_level = body.trial_level;
    params.hourly_rate = body.hourly_rate;
    params.first_consultation_date = body.first_consultation_date;
    params.engagement_date = body.engagement_date;
    params.case_closed_date = body.case_closed_date;
    params.judgment_date = body.judgment_date;
    params.has_engagement_letter = body.has_engagement_letter.unwrap_or(false);
    params.remarks = body.remarks;
    if let Some(custom) = body.custom_properties {
        params.custom_properties = custom;
    }
    params.current_phase_id = body.current_phase_id;
    params.court_division_id = body.court_division_id;

    let case = state
        .db
        .create_case(&params)
        .await
        .map_err(unique_violation(CASE_NUMBER_TAKEN))?;
    tracing::info!(case_id = %case.id, "created case");
    Ok((StatusCode::CREATED, DataResponse::new(case)))
}

pub async fn cases_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<CaseRecord>>, ApiError> {
    let id = parse_id(&id, CASE_NOT_FOUND)?;
    Ok(DataResponse::new(found(
        state.db.get_case(id).await?,
        CASE_NOT_FOUND,
    )?))
}

pub async fn cases_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateCaseRequest>,
) -> Result<Json<DataResponse<CaseRecord>>, ApiError> {
    let id = parse_id(&id, CASE_NOT_FOUND)?;
    let existing = found(state.db.get_case(id).await?, CASE_NOT_FOUND)?;
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }
    if let Some(category_id) = body.category_id {
        check_category(&state, category_id).await?;
    }
    let category_id = body.category_id.unwrap_or(existing.category_id);
    if let Some(Some(phase_id)) = body.current_phase_id {
        check_phase(&state, phase_id, category_id).await?;
    }
    if let Some(Some(division_id)) = body.court_division_id {
        check_division(&state, division_id).await?;
    }
    let case_number = body
        .case_number
        .map(|number| non_empty(number.as_deref()).map(String::from));
    if let Some(Some(number)) = case_number.as_ref() {
        check_case_number(&state, number, Some(id)).await?;
    }

    let params = UpdateCaseParams {
        name: body.name.map(|n| n.trim().to_string()),
        case_number,
        status: body.status,
        trial_level: body.trial_level,
        hourly_rate: body.hourly_rate,
        first_consultation_date: body.first_consultation_date,
        engagement_date: body.engagement_date,
        case_closed_date: body.case_closed_date,
        judgment_date: body.judgment_date,
        has_engagement_letter: body.has_engagement_letter,
        remarks: body.remarks,
        custom_properties: body.custom_properties,
        category_id: body.category_id,
        current_phase_id: body.current_phase_id,
        court_division_id: body.court_division_id,
    };
    let updated = state
        .db
        .update_case(id, &params)
        .await
        .map_err(unique_violation(CASE_NUMBER_TAKEN))?;
    Ok(DataResponse::new(found(updated, CASE_NOT_FOUND)?))
}

pub async fn cases_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, CASE_NOT_FOUND)?;
    found(state.db.delete_case(id).await?.then_some(()), CASE_NOT_FOUND)?;
    tracing::info!(case_id = %id, "deleted case");
    Ok(StatusCode::NO_CONTENT)
}

// --- Case parties ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCasePartyRequest {
    pub party_id: Option<Uuid>,
    pub role: Option<String>,
}

/// A case party link with the party it points at.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CasePartyView {
    #[serde(flatten)]
    pub link: CasePartyRecord,
    pub party: Option<PartyWithProfiles>,
}

pub async fn case_parties_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<CasePartyView>>>, ApiError> {
    let case_id = parse_id(&id, CASE_NOT_FOUND)?;
    found(state.db.get_case(case_id).await?, CASE_NOT_FOUND)?;
    let links = state.db.list_case_parties(case_id).await?;
    let mut views = Vec::with_capacity(links.len());
    for link in links {
        let party = state.db.get_party(link.party_id).await?;
        views.push(CasePartyView { link, party });
    }
    Ok(DataResponse::new(views))
}

pub async fn case_parties_add_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<AddCasePartyRequest>,
) -> Result<(StatusCode, Json<DataResponse<CasePartyRecord>>), ApiError> {
    let (Some(party_id), Some(role)) = (body.party_id, non_empty(body.role.as_deref())) else {
        return Err(ApiError::bad_request("partyId and role are required"));
    };
    let case_id =
        Uuid::parse_str(id.trim()).map_err(|_| ApiError::bad_request(INVALID_CASE_OR_PARTY))?;
    if state.db.get_case(case_id).await?.is_none()
        || state.db.get_party(party_id).await?.is_none()
    {
        return Err(ApiError::bad_request(INVALID_CASE_OR_PARTY));
    }
    let link = state
        .db
        .add_case_party(case_id, party_id, role)
        .await
        .map_err(|err| {
            if err.is_unique_violation() {
                ApiError::bad_request(DUPLICATE_CASE_PARTY)
            } else if err.is_foreign_key_violation() {
                ApiError::bad_request(INVALID_CASE_OR_PARTY)
            } else {
                err.into()
            }
        })?;
    Ok((StatusCode::CREATED, DataResponse::new(link)))
}

pub async fn case_parties_remove_handler(
    State(state): State<Arc<AppState>>,
    Path((id, party_id, role)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let case_id = parse_id(&id, CASE_PARTY_NOT_FOUND)?;
    let party_id = parse_id(&party_id, CASE_PARTY_NOT_FOUND)?;
    let removed = state.db.remove_case_party(case_id, party_id, &role).await?;
    found(removed.then_some(()), CASE_PARTY_NOT_FOUND)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Assignments ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignUserRequest {
    pub user_id: Option<Uuid>,
    pub role: Option<String>,
}

pub async fn case_assignments_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<CaseAssignmentRecord>>>, ApiError> {
    let case_id = parse_id(&id, CASE_NOT_FOUND)?;
    found(state.db.get_case(case_id).await?, CASE_NOT_FOUND)?;
    Ok(DataResponse::new(state.db.list_assignments(case_id).await?))
}

pub async fn case_assignments_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<AssignUserRequest>,
) -> Result<(StatusCode, Json<DataResponse<CaseAssignmentRecord>>), ApiError> {
    let case_id = parse_id(&id, CASE_NOT_FOUND)?;
    found(state.db.get_case(case_id).await?, CASE_NOT_FOUND)?;
    let user_id = body
        .user_id
        .ok_or_else(|| ApiError::bad_request("userId is required"))?;
    if state.db.get_user(user_id).await?.is_none() {
        return Err(ApiError::bad_request("Invalid userId"));
    }
    let assignment = state
        .db
        .assign_user(case_id, user_id, non_empty(body.role.as_deref()))
        .await
        .map_err(unique_violation("User is already assigned to this case"))?;
    Ok((StatusCode::CREATED, DataResponse::new(assignment)))
}

pub async fn case_assignments_delete_handler(
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    const NOT_ASSIGNED: &str = "Assignment not found";
    let case_id = parse_id(&id, NOT_ASSIGNED)?;
    let user_id = parse_id(&user_id, NOT_ASSIGNED)?;
    found(
        state.db.unassign_user(case_id, user_id).await?.then_some(()),
        NOT_ASSIGNED,
    )?;
    Ok(StatusCode::NO_CONTENT)
}
