//! Courthouses with their divisions and personnel, plus the jurisdiction
//! rules that route appeals between them.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{
    CourtDivisionRecord, CourtPersonnelRecord, CourthouseRecord, CreateCourtDivisionParams,
    CreateCourtPersonnelParams, CreateCourthouseParams, CreateJurisdictionRuleParams,
    JurisdictionRuleFilter, JurisdictionRuleRecord, UpdateCourthouseParams,
    UpdateJurisdictionRuleParams,
};
use crate::error::DatabaseError;
use crate::notifications::model::double_option;
use crate::web::error::ApiError;
use crate::web::handlers::{found, unique_violation};
use crate::web::server::AppState;
use crate::web::types::{DataResponse, JsonBody, PageQuery, QueryParams, non_empty, parse_id};

const COURTHOUSE_NOT_FOUND: &str = "Courthouse not found";
const COURTHOUSE_NAME_TAKEN: &str = "Courthouse name already exists";
const RULE_NOT_FOUND: &str = "Jurisdiction rule not found";
const SAME_COURTHOUSE: &str = "lowerCourthouseId and superiorCourthouseId must differ";

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourthouseRequest {
    pub name: Option<String>,
    pub postal_code: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourthouseRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub postal_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address1: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address2: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDivisionRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub division_type: Option<String>,
    pub parent_id: Option<Uuid>,
    pub phone: Option<String>,
    pub fax: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonnelRequest {
    pub court_division_id: Option<Uuid>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
}

async fn existing_courthouse(state: &AppState, raw: &str) -> Result<CourthouseRecord, ApiError> {
    let id = parse_id(raw, COURTHOUSE_NOT_FOUND)?;
    found(state.db.get_courthouse(id).await?, COURTHOUSE_NOT_FOUND)
}

pub async fn courthouses_list_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(page): QueryParams<PageQuery>,
    QueryParams(query): QueryParams<NameQuery>,
) -> Result<Json<DataResponse<Vec<CourthouseRecord>>>, ApiError> {
    let page = page.into_request()?;
    let paged = state
        .db
        .list_courthouses(non_empty(query.name.as_deref()), page)
        .await?;
    Ok(DataResponse::paged(paged, page))
}

pub async fn courthouses_create_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CreateCourthouseRequest>,
) -> Result<(StatusCode, Json<DataResponse<CourthouseRecord>>), ApiError> {
    let name = non_empty(body.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Name is required"))?
        .to_string();
    if state.db.get_courthouse_by_name(&name).await?.is_some() {
        return Err(ApiError::bad_request(COURTHOUSE_NAME_TAKEN));
    }
    let courthouse = state
        .db
        .create_courthouse(&CreateCourthouseParams {
            name,
            postal_code: body.postal_code,
            address1: body.address1,
            address2: body.address2,
            phone: body.phone,
        })
        .await
        .map_err(unique_violation(COURTHOUSE_NAME_TAKEN))?;
    Ok((StatusCode::CREATED, DataResponse::new(courthouse)))
}

pub async fn courthouses_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<CourthouseRecord>>, ApiError> {
    Ok(DataResponse::new(existing_courthouse(&state, &id).await?))
}

pub async fn courthouses_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateCourthouseRequest>,
) -> Result<Json<DataResponse<CourthouseRecord>>, ApiError> {
    let id = parse_id(&id, COURTHOUSE_NOT_FOUND)?;
    let name = match body.name.as_deref() {
        Some(raw) => Some(
            non_empty(Some(raw))
                .ok_or_else(|| ApiError::bad_request("Name cannot be empty"))?
                .to_string(),
        ),
        None => None,
    };
    if let Some(name) = name.as_deref()
        && let Some(other) = state.db.get_courthouse_by_name(name).await?
        && other.id != id
    {
        return Err(ApiError::bad_request(COURTHOUSE_NAME_TAKEN));
    }
    let updated = state
        .db
        .update_courthouse(
            id,
            &UpdateCourthouseParams {
                name,
                postal_code: body.postal_code,
                address1: body.address1,
                address2: body.address2,
                phone: body.phone,
            },
        )
        .await
        .map_err(unique_violation(COURTHOUSE_NAME_TAKEN))?;
    Ok(DataResponse::new(found(updated, COURTHOUSE_NOT_FOUND)?))
}

pub async fn courthouses_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, COURTHOUSE_NOT_FOUND)?;
    found(
        state.db.delete_courthouse(id).await?.then_some(()),
        COURTHOUSE_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn divisions_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<CourtDivisionRecord>>>, ApiError> {
    let courthouse = existing_courthouse(&state, &id).await?;
    Ok(DataResponse::new(
        state.db.list_divisions(courthouse.id).await?,
    ))
}

pub async fn divisions_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CreateDivisionRequest>,
) -> Result<(StatusCode, Json<DataResponse<CourtDivisionRecord>>), ApiError> {
    let courthouse = existing_courthouse(&state, &id).await?;
    let (Some(name), Some(division_type)) = (
        non_empty(body.name.as_deref()),
        non_empty(body.division_type.as_deref()),
    ) else {
        return Err(ApiError::bad_request("Name and type are required"));
    };
    if let Some(parent_id) = body.parent_id {
        match state.db.get_division(parent_id).await? {
            Some(parent) if parent.courthouse_id == courthouse.id => {}
            _ => return Err(ApiError::bad_request("Invalid parentId")),
        }
    }
    let division = state
        .db
        .create_division(&CreateCourtDivisionParams {
            courthouse_id: courthouse.id,
            parent_id: body.parent_id,
            name: name.to_string(),
            division_type: division_type.to_string(),
            phone: body.phone,
            fax: body.fax,
        })
        .await?;
    Ok((StatusCode::CREATED, DataResponse::new(division)))
}

pub async fn personnel_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<CourtPersonnelRecord>>>, ApiError> {
    let courthouse = existing_courthouse(&state, &id).await?;
    Ok(DataResponse::new(
        state.db.list_personnel(courthouse.id).await?,
    ))
}

pub async fn personnel_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CreatePersonnelRequest>,
) -> Result<(StatusCode, Json<DataResponse<CourtPersonnelRecord>>), ApiError> {
    let courthouse = existing_courthouse(&state, &id).await?;
    let (Some(division_id), Some(name), Some(role)) = (
        body.court_division_id,
        non_empty(body.name.as_deref()),
        non_empty(body.role.as_deref()),
    ) else {
        return Err(ApiError::bad_request(
            "courtDivisionId, name and role are required",
        ));
    };
    match state.db.get_division(division_id).await? {
        Some(division) if division.courthouse_id == courthouse.id => {}
        _ => return Err(ApiError::bad_request("Invalid courtDivisionId")),
    }
    let person = state
        .db
        .create_personnel(&CreateCourtPersonnelParams {
            court_division_id: division_id,
            name: name.to_string(),
            role: role.to_string(),
            email: body.email,
        })
        .await?;
    Ok((StatusCode::CREATED, DataResponse::new(person)))
}

// --- Jurisdiction rules ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JurisdictionRuleQuery {
    pub lower_courthouse_id: Option<Uuid>,
    pub superior_courthouse_id: Option<Uuid>,
    pub case_category_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJurisdictionRuleRequest {
    pub lower_courthouse_id: Option<Uuid>,
    pub superior_courthouse_id: Option<Uuid>,
    pub case_category_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJurisdictionRuleRequest {
    pub lower_courthouse_id: Option<Uuid>,
    pub superior_courthouse_id: Option<Uuid>,
    #[serde(default, deserialize_with = "double_option")]
    pub case_category_id: Option<Option<Uuid>>,
}

/// 400 unless every supplied courthouse and category exists.
async fn check_rule_refs(
    state: &AppState,
    lower: Option<Uuid>,
    superior: Option<Uuid>,
    category: Option<Uuid>,
) -> Result<(), ApiError> {
    if let Some(id) = lower
        && state.db.get_courthouse(id).await?.is_none()
    {
        return Err(ApiError::bad_request("Invalid lowerCourthouseId"));
    }
    if let Some(id) = superior
        && state.db.get_courthouse(id).await?.is_none()
    {
        return Err(ApiError::bad_request("Invalid superiorCourthouseId"));
    }
    if let Some(id) = category
        && state.db.get_category(id).await?.is_none()
    {
        return Err(ApiError::bad_request("Invalid caseCategoryId"));
    }
    Ok(())
}

fn rule_write_error(err: DatabaseError) -> ApiError {
    match err {
        DatabaseError::Constraint(_) => ApiError::bad_request(SAME_COURTHOUSE),
        DatabaseError::ForeignKey(_) => {
            ApiError::bad_request("Courthouse or case category no longer exists")
        }
        other => other.into(),
    }
}

pub async fn jurisdiction_rules_list_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<JurisdictionRuleQuery>,
) -> Result<Json<DataResponse<Vec<JurisdictionRuleRecord>>>, ApiError> {
    let rules = state
        .db
        .list_jurisdiction_rules(&JurisdictionRuleFilter {
            lower_courthouse_id: query.lower_courthouse_id,
            superior_courthouse_id: query.superior_courthouse_id,
            case_category_id: query.case_category_id,
        })
        .await?;
    Ok(DataResponse::new(rules))
}

pub async fn jurisdiction_rules_create_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CreateJurisdictionRuleRequest>,
) -> Result<(StatusCode, Json<DataResponse<JurisdictionRuleRecord>>), ApiError> {
    let (Some(lower), Some(superior)) = (body.lower_courthouse_id, body.superior_courthouse_id)
    else {
        return Err(ApiError::bad_request(
            "lowerCourthouseId and superiorCourthouseId are required",
        ));
    };
    if lower == superior {
        return Err(ApiError::bad_request(SAME_COURTHOUSE));
    }
    check_rule_refs(&state, Some(lower), Some(superior), body.case_category_id).await?;
    let rule = state
        .db
        .create_jurisdiction_rule(&CreateJurisdictionRuleParams {
            lower_courthouse_id: lower,
            superior_courthouse_id: superior,
            case_category_id: body.case_category_id,
        })
        .await
        .map_err(rule_write_error)?;
    Ok((StatusCode::CREATED, DataResponse::new(rule)))
}

pub async fn jurisdiction_rules_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<JurisdictionRuleRecord>>, ApiError> {
    let id = parse_id(&id, RULE_NOT_FOUND)?;
    Ok(DataResponse::new(found(
        state.db.get_jurisdiction_rule(id).await?,
        RULE_NOT_FOUND,
    )?))
}

pub async fn jurisdiction_rules_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateJurisdictionRuleRequest>,
) -> Result<Json<DataResponse<JurisdictionRuleRecord>>, ApiError> {
    let id = parse_id(&id, RULE_NOT_FOUND)?;
    check_rule_refs(
        &state,
        body.lower_courthouse_id,
        body.superior_courthouse_id,
        body.case_category_id.flatten(),
    )
    .await?;
    let updated = state
        .db
        .update_jurisdiction_rule(
            id,
            &UpdateJurisdictionRuleParams {
                lower_courthouse_id: body.lower_courthouse_id,
                superior_courthouse_id: body.superior_courthouse_id,
                case_category_id: body.case_category_id,
            },
        )
        .await
        .map_err(rule_write_error)?;
    Ok(DataResponse::new(found(updated, RULE_NOT_FOUND)?))
}

pub async fn jurisdiction_rules_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, RULE_NOT_FOUND)?;
    found(
        state.db.delete_jurisdiction_rule(id).await?.then_some(()),
        RULE_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}
