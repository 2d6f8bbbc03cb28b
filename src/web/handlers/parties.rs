//! Parties and their individual/corporate profiles.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use crate::db::{
    CorporateProfileFields, CorporateProfileRecord, CreatePartyParams, IndividualProfileFields,
    IndividualProfileRecord, PartyFilter, PartyWithProfiles, UpdatePartyParams,
};
use crate::web::error::ApiError;
use crate::web::handlers::found;
use crate::web::server::AppState;
use crate::web::types::{DataResponse, JsonBody, PageQuery, QueryParams, non_empty, parse_id};

const PARTY_NOT_FOUND: &str = "Party not found";
const PARTY_HAS_PROFILE: &str = "Party has a profile; delete the profile first";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyListQuery {
    pub is_corporation: Option<bool>,
    pub is_former_client: Option<bool>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePartyRequest {
    pub is_corporation: Option<bool>,
    pub is_former_client: Option<bool>,
    pub individual_profile: Option<IndividualProfileFields>,
    pub corporate_profile: Option<CorporateProfileFields>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePartyRequest {
    pub is_corporation: Option<bool>,
    pub is_former_client: Option<bool>,
}

async fn existing_party(state: &AppState, raw: &str) -> Result<PartyWithProfiles, ApiError> {
    let id = parse_id(raw, PARTY_NOT_FOUND)?;
    found(state.db.get_party(id).await?, PARTY_NOT_FOUND)
}

pub async fn parties_list_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(page): QueryParams<PageQuery>,
    QueryParams(query): QueryParams<PartyListQuery>,
) -> Result<Json<DataResponse<Vec<PartyWithProfiles>>>, ApiError> {
    let page = page.into_request()?;
    let filter = PartyFilter {
        is_corporation: query.is_corporation,
        is_former_client: query.is_former_client,
        name: non_empty(query.name.as_deref()).map(String::from),
    };
    let paged = state.db.list_parties(&filter, page).await?;
    Ok(DataResponse::paged(paged, page))
}

pub async fn parties_create_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CreatePartyRequest>,
) -> Result<(StatusCode, Json<DataResponse<PartyWithProfiles>>), ApiError> {
    let is_corporation = body
        .is_corporation
        .ok_or_else(|| ApiError::bad_request("isCorporation is required"))?;
    let party = state
        .db
        .create_party(&CreatePartyParams {
            is_corporation,
            is_former_client: body.is_former_client.unwrap_or(false),
            individual_profile: body.individual_profile,
            corporate_profile: body.corporate_profile,
        })
        .await?;
    tracing::info!(party_id = %party.party.id, "created party");
    Ok((StatusCode::CREATED, DataResponse::new(party)))
}

pub async fn parties_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<PartyWithProfiles>>, ApiError> {
    Ok(DataResponse::new(existing_party(&state, &id).await?))
}

pub async fn parties_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdatePartyRequest>,
) -> Result<Json<DataResponse<PartyWithProfiles>>, ApiError> {
    let id = parse_id(&id, PARTY_NOT_FOUND)?;
    let updated = state
        .db
        .update_party(
            id,
            &UpdatePartyParams {
                is_corporation: body.is_corporation,
                is_former_client: body.is_former_client,
            },
        )
        .await?;
    Ok(DataResponse::new(found(updated, PARTY_NOT_FOUND)?))
}

/// Profiles are never cascaded: a party with a profile cannot be deleted.
pub async fn parties_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let party = existing_party(&state, &id).await?;
    if party.has_profile() {
        return Err(ApiError::conflict(PARTY_HAS_PROFILE));
    }
    let deleted = state
        .db
        .delete_party(party.party.id)
        .await
        .map_err(|err| {
            if err.is_foreign_key_violation() {
                ApiError::conflict(PARTY_HAS_PROFILE)
            } else {
                err.into()
            }
        })?;
    found(deleted.then_some(()), PARTY_NOT_FOUND)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Profiles ---

pub async fn individual_profile_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<IndividualProfileRecord>>, ApiError> {
    let party = existing_party(&state, &id).await?;
    Ok(DataResponse::new(found(
        party.individual_profile,
        "Individual profile not found",
    )?))
}

pub async fn individual_profile_put_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(fields): JsonBody<IndividualProfileFields>,
) -> Result<Json<DataResponse<IndividualProfileRecord>>, ApiError> {
    let party = existing_party(&state, &id).await?;
    let profile = state
        .db
        .upsert_individual_profile(party.party.id, &fields)
        .await?;
    Ok(DataResponse::new(profile))
}

pub async fn individual_profile_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let party = existing_party(&state, &id).await?;
    found(
        state
            .db
            .delete_individual_profile(party.party.id)
            .await?
            .then_some(()),
        "Individual profile not found",
    )?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn corporate_profile_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<CorporateProfileRecord>>, ApiError> {
    let party = existing_party(&state, &id).await?;
    Ok(DataResponse::new(found(
        party.corporate_profile,
        "Corporate profile not found",
    )?))
}

pub async fn corporate_profile_put_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(fields): JsonBody<CorporateProfileFields>,
) -> Result<Json<DataResponse<CorporateProfileRecord>>, ApiError> {
    let party = existing_party(&state, &id).await?;
    let profile = state
        .db
        .upsert_corporate_profile(party.party.id, &fields)
        .await?;
    Ok(DataResponse::new(profile))
}

pub async fn corporate_profile_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let party = existing_party(&state, &id).await?;
    found(
        state
            .db
            .delete_corporate_profile(party.party.id)
            .await?
            .then_some(()),
        "Corporate profile not found",
    )?;
    Ok(StatusCode::NO_CONTENT)
}
