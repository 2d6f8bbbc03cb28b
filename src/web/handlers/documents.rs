//! Document templates and per-case document generation.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{
    CreateDocumentTemplateParams, DocumentTemplateRecord, UpdateDocumentTemplateParams,
};
use crate::legal::docgen::{LinkedParty, build_context, render_template};
use crate::notifications::model::double_option;
use crate::web::error::ApiError;
use crate::web::handlers::cases::CASE_NOT_FOUND;
use crate::web::handlers::{found, unique_violation};
use crate::web::server::AppState;
use crate::web::types::{DataResponse, JsonBody, non_empty, parse_id};

const TEMPLATE_NOT_FOUND: &str = "Document template not found";
const TEMPLATE_NAME_TAKEN: &str = "Document template name already exists";
const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentTemplateRequest {
    pub name: Option<String>,
    pub body: Option<String>,
    pub content_type: Option<String>,
    pub file_path: Option<String>,
    pub placeholders: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocumentTemplateRequest {
    pub name: Option<String>,
    pub body: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub content_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub file_path: Option<Option<String>>,
    pub placeholders: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateDocumentRequest {
    pub template_id: Option<Uuid>,
    /// Extra values exposed to the template as `extra`.
    pub data: Option<serde_json::Value>,
}

pub async fn document_templates_list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataResponse<Vec<DocumentTemplateRecord>>>, ApiError> {
    Ok(DataResponse::new(state.db.list_document_templates().await?))
}

pub async fn document_templates_create_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CreateDocumentTemplateRequest>,
) -> Result<(StatusCode, Json<DataResponse<DocumentTemplateRecord>>), ApiError> {
    let (Some(name), Some(template_body)) = (non_empty(body.name.as_deref()), body.body) else {
        return Err(ApiError::bad_request("Name and body are required"));
    };
    let template = state
        .db
        .create_document_template(&CreateDocumentTemplateParams {
            name: name.to_string(),
            body: template_body,
            content_type: body.content_type,
            file_path: body.file_path,
            placeholders: body
                .placeholders
                .unwrap_or_else(|| serde_json::json!([])),
        })
        .await
        .map_err(unique_violation(TEMPLATE_NAME_TAKEN))?;
    Ok((StatusCode::CREATED, DataResponse::new(template)))
}

pub async fn document_templates_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<DocumentTemplateRecord>>, ApiError> {
    let id = parse_id(&id, TEMPLATE_NOT_FOUND)?;
    Ok(DataResponse::new(found(
        state.db.get_document_template(id).await?,
        TEMPLATE_NOT_FOUND,
    )?))
}

pub async fn document_templates_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateDocumentTemplateRequest>,
) -> Result<Json<DataResponse<DocumentTemplateRecord>>, ApiError> {
    let id = parse_id(&id, TEMPLATE_NOT_FOUND)?;
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }
    let updated = state
        .db
        .update_document_template(
            id,
            &UpdateDocumentTemplateParams {
                name: body.name.map(|n| n.trim().to_string()),
                body: body.body,
                content_type: body.content_type,
                file_path: body.file_path,
                placeholders: body.placeholders,
            },
        )
        .await
        .map_err(unique_violation(TEMPLATE_NAME_TAKEN))?;
    Ok(DataResponse::new(found(updated, TEMPLATE_NOT_FOUND)?))
}

pub async fn document_templates_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, TEMPLATE_NOT_FOUND)?;
    found(
        state.db.delete_document_template(id).await?.then_some(()),
        TEMPLATE_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

/// Render a template against the case and return the document itself.
pub async fn generate_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<GenerateDocumentRequest>,
) -> Result<Response, ApiError> {
    let case_id = parse_id(&id, CASE_NOT_FOUND)?;
    let case = found(state.db.get_case(case_id).await?, CASE_NOT_FOUND)?;
    let template_id = body
        .template_id
        .ok_or_else(|| ApiError::bad_request("templateId is required"))?;
    let template = state
        .db
        .get_document_template(template_id)
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid templateId"))?;

    let category = state.db.get_category(case.category_id).await?;
    let mut parties: Vec<LinkedParty> = Vec::new();
    for link in state.db.list_case_parties(case_id).await? {
        if let Some(party) = state.db.get_party(link.party_id).await? {
            parties.push((link, party));
        }
    }
    let context = build_context(&case, category.as_ref(), &parties, body.data.as_ref());
    let document = render_template(&template.body, &context).map_err(|message| {
        tracing::warn!(
            case_id = %case_id,
            template_id = %template_id,
            %message,
            "document render failed"
        );
        ApiError::Unprocessable(message)
    })?;

    let content_type = template
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    tracing::info!(case_id = %case_id, template = %template.name, "generated document");
    Ok(([(header::CONTENT_TYPE, content_type)], document).into_response())
}
