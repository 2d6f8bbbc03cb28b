//! Law firms, their offices, and lawyers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{
    CreateLawFirmOfficeParams, CreateLawyerParams, LawFirmOfficeRecord, LawFirmRecord,
    LawyerFilter, LawyerRecord, UpdateLawFirmOfficeParams, UpdateLawyerParams,
};
use crate::notifications::model::double_option;
use crate::web::error::ApiError;
use crate::web::handlers::courts::NameQuery;
use crate::web::handlers::{found, unique_violation};
use crate::web::server::AppState;
use crate::web::types::{DataResponse, JsonBody, PageQuery, QueryParams, non_empty, parse_id};

const FIRM_NOT_FOUND: &str = "Law firm not found";
const FIRM_NAME_TAKEN: &str = "Law firm name already exists";
const OFFICE_NOT_FOUND: &str = "Office not found";
const LAWYER_NOT_FOUND: &str = "Lawyer not found";
const REGISTRATION_TAKEN: &str = "Registration number already exists";
const INVALID_OFFICE: &str = "Invalid officeId";

// --- Law firms ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficeRequest {
    pub is_primary: Option<bool>,
    pub office_name: Option<String>,
    pub postal_code: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
}

impl From<OfficeRequest> for CreateLawFirmOfficeParams {
    fn from(req: OfficeRequest) -> Self {
        Self {
            is_primary: req.is_primary.unwrap_or(false),
            office_name: req.office_name,
            postal_code: req.postal_code,
            address1: req.address1,
            address2: req.address2,
            phone: req.phone,
            fax: req.fax,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOfficeRequest {
    pub is_primary: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub office_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub postal_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address1: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address2: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub fax: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLawFirmRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub offices: Vec<OfficeRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLawFirmRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LawFirmView {
    #[serde(flatten)]
    pub firm: LawFirmRecord,
    pub offices: Vec<LawFirmOfficeRecord>,
}

async fn existing_firm(state: &AppState, raw: &str) -> Result<LawFirmRecord, ApiError> {
    let id = parse_id(raw, FIRM_NOT_FOUND)?;
    found(state.db.get_law_firm(id).await?, FIRM_NOT_FOUND)
}

pub async fn law_firms_list_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(page): QueryParams<PageQuery>,
    QueryParams(query): QueryParams<NameQuery>,
) -> Result<Json<DataResponse<Vec<LawFirmRecord>>>, ApiError> {
    let page = page.into_request()?;
    let paged = state
        .db
        .list_law_firms(non_empty(query.name.as_deref()), page)
        .await?;
    Ok(DataResponse::paged(paged, page))
}

pub async fn law_firms_create_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CreateLawFirmRequest>,
) -> Result<(StatusCode, Json<DataResponse<LawFirmView>>), ApiError> {
    let name = non_empty(body.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Name is required"))?
        .to_string();
    if state.db.get_law_firm_by_name(&name).await?.is_some() {
        return Err(ApiError::bad_request(FIRM_NAME_TAKEN));
    }
    let firm = state
        .db
        .create_law_firm(&name)
        .await
        .map_err(unique_violation(FIRM_NAME_TAKEN))?;
    let mut offices = Vec::with_capacity(body.offices.len());
    for office in body.offices {
        offices.push(state.db.create_office(firm.id, &office.into()).await?);
    }
    Ok((
        StatusCode::CREATED,
        DataResponse::new(LawFirmView { firm, offices }),
    ))
}

pub async fn law_firms_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<LawFirmView>>, ApiError> {
    let firm = existing_firm(&state, &id).await?;
    let offices = state.db.list_offices(firm.id).await?;
    Ok(DataResponse::new(LawFirmView { firm, offices }))
}

pub async fn law_firms_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateLawFirmRequest>,
) -> Result<Json<DataResponse<LawFirmRecord>>, ApiError> {
    let id = parse_id(&id, FIRM_NOT_FOUND)?;
    let name = non_empty(body.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Name is required"))?;
    if let Some(other) = state.db.get_law_firm_by_name(name).await?
        && other.id != id
    {
        return Err(ApiError::bad_request(FIRM_NAME_TAKEN));
    }
    let updated = state
        .db
        .update_law_firm(id, name)
        .await
        .map_err(unique_violation(FIRM_NAME_TAKEN))?;
    Ok(DataResponse::new(found(updated, FIRM_NOT_FOUND)?))
}

pub async fn law_firms_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, FIRM_NOT_FOUND)?;
    found(
        state.db.delete_law_firm(id).await?.then_some(()),
        FIRM_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn offices_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<LawFirmOfficeRecord>>>, ApiError> {
    let firm = existing_firm(&state, &id).await?;
    Ok(DataResponse::new(state.db.list_offices(firm.id).await?))
}

pub async fn offices_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<OfficeRequest>,
) -> Result<(StatusCode, Json<DataResponse<LawFirmOfficeRecord>>), ApiError> {
    let firm = existing_firm(&state, &id).await?;
    let office = state.db.create_office(firm.id, &body.into()).await?;
    Ok((StatusCode::CREATED, DataResponse::new(office)))
}

pub async fn offices_update_handler(
    State(state): State<Arc<AppState>>,
    Path((id, office_id)): Path<(String, String)>,
    JsonBody(body): JsonBody<UpdateOfficeRequest>,
) -> Result<Json<DataResponse<LawFirmOfficeRecord>>, ApiError> {
    let firm_id = parse_id(&id, OFFICE_NOT_FOUND)?;
    let office_id = parse_id(&office_id, OFFICE_NOT_FOUND)?;
    let updated = state
        .db
        .update_office(
            firm_id,
            office_id,
            &UpdateLawFirmOfficeParams {
                is_primary: body.is_primary,
                office_name: body.office_name,
                postal_code: body.postal_code,
                address1: body.address1,
                address2: body.address2,
                phone: body.phone,
                fax: body.fax,
            },
        )
        .await?;
    Ok(DataResponse::new(found(updated, OFFICE_NOT_FOUND)?))
}

pub async fn offices_delete_handler(
    State(state): State<Arc<AppState>>,
    Path((id, office_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let firm_id = parse_id(&id, OFFICE_NOT_FOUND)?;
    let office_id = parse_id(&office_id, OFFICE_NOT_FOUND)?;
    found(
        state
            .db
            .delete_office(firm_id, office_id)
            .await?
            .then_some(()),
        OFFICE_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Lawyers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LawyerListQuery {
    pub office_id: Option<Uuid>,
    pub name: Option<String>,
    pub registration_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLawyerRequest {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name_kana: Option<String>,
    pub first_name_kana: Option<String>,
    pub registration_number: Option<String>,
    pub office_id: Option<Uuid>,
    pub phone: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLawyerRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub last_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub last_name_kana: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub first_name_kana: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub registration_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub office_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub remarks: Option<Option<String>>,
}

async fn check_office(state: &AppState, office_id: Option<Uuid>) -> Result<(), ApiError> {
    if let Some(office_id) = office_id
        && state.db.get_office(office_id).await?.is_none()
    {
        return Err(ApiError::bad_request(INVALID_OFFICE));
    }
    Ok(())
}

async fn check_registration(
    state: &AppState,
    registration_number: &str,
    except: Option<Uuid>,
) -> Result<(), ApiError> {
    match state.db.get_lawyer_by_registration(registration_number).await? {
        Some(existing) if Some(existing.id) != except => {
            Err(ApiError::bad_request(REGISTRATION_TAKEN))
        }
        _ => Ok(()),
    }
}

pub async fn lawyers_list_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(page): QueryParams<PageQuery>,
    QueryParams(query): QueryParams<LawyerListQuery>,
) -> Result<Json<DataResponse<Vec<LawyerRecord>>>, ApiError> {
    let page = page.into_request()?;
    let filter = LawyerFilter {
        office_id: query.office_id,
        name: non_empty(query.name.as_deref()).map(String::from),
        registration_number: non_empty(query.registration_number.as_deref()).map(String::from),
    };
    let paged = state.db.list_lawyers(&filter, page).await?;
    Ok(DataResponse::paged(paged, page))
}

pub async fn lawyers_create_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CreateLawyerRequest>,
) -> Result<(StatusCode, Json<DataResponse<LawyerRecord>>), ApiError> {
    if non_empty(body.last_name.as_deref()).is_none()
        || non_empty(body.first_name.as_deref()).is_none()
    {
        return Err(ApiError::bad_request("lastName and firstName are required"));
    }
    check_office(&state, body.office_id).await?;
    let registration_number = non_empty(body.registration_number.as_deref()).map(String::from);
    if let Some(number) = registration_number.as_deref() {
        check_registration(&state, number, None).await?;
    }
    let lawyer = state
        .db
        .create_lawyer(&CreateLawyerParams {
            last_name: body.last_name,
            first_name: body.first_name,
            last_name_kana: body.last_name_kana,
            first_name_kana: body.first_name_kana,
            registration_number,
            office_id: body.office_id,
            phone: body.phone,
            remarks: body.remarks,
        })
        .await
        .map_err(|err| {
            if err.is_unique_violation() {
                ApiError::bad_request(REGISTRATION_TAKEN)
            } else if err.is_foreign_key_violation() {
                ApiError::bad_request(INVALID_OFFICE)
            } else {
                err.into()
            }
        })?;
    Ok((StatusCode::CREATED, DataResponse::new(lawyer)))
}

pub async fn lawyers_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<LawyerRecord>>, ApiError> {
    let id = parse_id(&id, LAWYER_NOT_FOUND)?;
    Ok(DataResponse::new(found(
        state.db.get_lawyer(id).await?,
        LAWYER_NOT_FOUND,
    )?))
}

pub async fn lawyers_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateLawyerRequest>,
) -> Result<Json<DataResponse<LawyerRecord>>, ApiError> {
    let id = parse_id(&id, LAWYER_NOT_FOUND)?;
    found(state.db.get_lawyer(id).await?, LAWYER_NOT_FOUND)?;
    if let Some(office_id) = body.office_id {
        check_office(&state, office_id).await?;
    }
    let registration_number = body
        .registration_number
        .map(|number| non_empty(number.as_deref()).map(String::from));
    if let Some(Some(number)) = registration_number.as_ref() {
        check_registration(&state, number, Some(id)).await?;
    }
    let updated = state
        .db
        .update_lawyer(
            id,
            &UpdateLawyerParams {
                last_name: body.last_name,
                first_name: body.first_name,
                last_name_kana: body.last_name_kana,
                first_name_kana: body.first_name_kana,
                registration_number,
                office_id: body.office_id,
                phone: body.phone,
                remarks: body.remarks,
            },
        )
        .await
        .map_err(unique_violation(REGISTRATION_TAKEN))?;
    Ok(DataResponse::new(found(updated, LAWYER_NOT_FOUND)?))
}

pub async fn lawyers_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, LAWYER_NOT_FOUND)?;
    found(
        state.db.delete_lawyer(id).await?.then_some(()),
        LAWYER_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}
