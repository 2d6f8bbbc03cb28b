//! Case categories, phases, task templates and phase transition rules.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{
    AppliedPhaseTransition, CaseCategoryRecord, CaseEventRecord, CaseFilter, CasePhaseRecord,
    CreateCaseCategoryParams, CreateCasePhaseParams, CreateTransitionRuleParams,
    PHASE_TRANSITION_EVENT, PageRequest, PhaseTransitionRuleRecord, TaskTemplateItemRecord,
    TaskTemplateWithItems, TemplateItemParams, UpdateCaseCategoryParams, UpdateCasePhaseParams,
    UpdateTemplateItemParams, UpdateTransitionRuleParams,
};
use crate::legal::workflow::{
    CategoryTree, CategoryTreeNode, check_due_date_offset, transition_case_phase,
    validate_parent_assignment,
};
use crate::notifications::model::double_option;
use crate::web::error::ApiError;
use crate::web::handlers::{found, still_referenced, unique_violation};
use crate::web::server::AppState;
use crate::web::types::{DataResponse, JsonBody, QueryParams, non_empty, parse_id};

const CATEGORY_NOT_FOUND: &str = "Category not found";
const PHASE_NOT_FOUND: &str = "Phase not found";
const TEMPLATE_NOT_FOUND: &str = "Task template not found";
const ITEM_NOT_FOUND: &str = "Task template item not found";
const RULE_NOT_FOUND: &str = "Phase transition rule not found";

// --- Categories ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    pub name: Option<String>,
    pub parent_category_id: Option<Uuid>,
    pub role_definitions: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_category_id: Option<Option<Uuid>>,
    pub role_definitions: Option<serde_json::Value>,
}

async fn category_tree(state: &AppState) -> Result<CategoryTree, ApiError> {
    Ok(CategoryTree::from_records(state.db.list_categories().await?))
}

pub async fn categories_list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataResponse<Vec<CaseCategoryRecord>>>, ApiError> {
    Ok(DataResponse::new(state.db.list_categories().await?))
}

pub async fn categories_tree_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataResponse<Vec<CategoryTreeNode>>>, ApiError> {
    Ok(DataResponse::new(category_tree(&state).await?.to_nested()))
}

pub async fn categories_create_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<DataResponse<CaseCategoryRecord>>), ApiError> {
    let name = non_empty(body.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Name is required"))?
        .to_string();
    if body.parent_category_id.is_some() {
        let tree = category_tree(&state).await?;
        validate_parent_assignment(&tree, None, body.parent_category_id)?;
    }
    let category = state
        .db
        .create_category(&CreateCaseCategoryParams {
            name,
            parent_category_id: body.parent_category_id,
            role_definitions: body.role_definitions.unwrap_or_else(|| serde_json::json!([])),
        })
        .await?;
    Ok((StatusCode::CREATED, DataResponse::new(category)))
}

pub async fn categories_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<CaseCategoryRecord>>, ApiError> {
    let id = parse_id(&id, CATEGORY_NOT_FOUND)?;
    let category = found(state.db.get_category(id).await?, CATEGORY_NOT_FOUND)?;
    Ok(DataResponse::new(category))
}

pub async fn categories_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateCategoryRequest>,
) -> Result<Json<DataResponse<CaseCategoryRecord>>, ApiError> {
    let id = parse_id(&id, CATEGORY_NOT_FOUND)?;
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }
    let tree = category_tree(&state).await?;
    if !tree.contains(id) {
        return Err(ApiError::not_found(CATEGORY_NOT_FOUND));
    }
    if let Some(new_parent) = body.parent_category_id {
        validate_parent_assignment(&tree, Some(id), new_parent)?;
    }
    let updated = state
        .db
        .update_category(
            id,
            &UpdateCaseCategoryParams {
                name: body.name.map(|n| n.trim().to_string()),
                parent_category_id: body.parent_category_id,
                role_definitions: body.role_definitions,
            },
        )
        .await?;
    Ok(DataResponse::new(found(updated, CATEGORY_NOT_FOUND)?))
}

pub async fn categories_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, CATEGORY_NOT_FOUND)?;
    found(state.db.get_category(id).await?, CATEGORY_NOT_FOUND)?;
    if !state.db.list_child_categories(id).await?.is_empty() {
        return Err(ApiError::conflict("Category has sub-categories"));
    }
    let cases = state
        .db
        .list_cases(
            &CaseFilter {
                category_id: Some(id),
                ..Default::default()
            },
            PageRequest { page: 1, limit: 1 },
        )
        .await?;
    if cases.total > 0 {
        return Err(ApiError::conflict("Category has cases"));
    }
    let deleted = state
        .db
        .delete_category(id)
        .await
        .map_err(still_referenced("Category is still in use"))?;
    found(deleted.then_some(()), CATEGORY_NOT_FOUND)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Phases ---

#[derive(Debug, Deserialize)]
pub struct CreatePhaseRequest {
    pub name: Option<String>,
    pub order: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePhaseRequest {
    pub name: Option<String>,
    pub order: Option<i64>,
}

pub async fn category_phases_list_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<CasePhaseRecord>>>, ApiError> {
    let id = parse_id(&id, CATEGORY_NOT_FOUND)?;
    found(state.db.get_category(id).await?, CATEGORY_NOT_FOUND)?;
    Ok(DataResponse::new(state.db.list_phases_for_category(id).await?))
}

/// Create a phase; without an explicit `order` it goes last.
pub async fn category_phases_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CreatePhaseRequest>,
) -> Result<(StatusCode, Json<DataResponse<CasePhaseRecord>>), ApiError> {
    let category_id = parse_id(&id, CATEGORY_NOT_FOUND)?;
    found(state.db.get_category(category_id).await?, CATEGORY_NOT_FOUND)?;
    let name = non_empty(body.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Name is required"))?
        .to_string();
    let order = match body.order {
        Some(order) => order,
        None => state
            .db
            .list_phases_for_category(category_id)
            .await?
            .iter()
            .map(|phase| phase.order + 1)
            .max()
            .unwrap_or(0),
    };
    let phase = state
        .db
        .create_phase(&CreateCasePhaseParams {
            category_id,
            name,
            order,
        })
        .await?;
    Ok((StatusCode::CREATED, DataResponse::new(phase)))
}

pub async fn phases_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<CasePhaseRecord>>, ApiError> {
    let id = parse_id(&id, PHASE_NOT_FOUND)?;
    Ok(DataResponse::new(found(
        state.db.get_phase(id).await?,
        PHASE_NOT_FOUND,
    )?))
}

pub async fn phases_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdatePhaseRequest>,
) -> Result<Json<DataResponse<CasePhaseRecord>>, ApiError> {
    let id = parse_id(&id, PHASE_NOT_FOUND)?;
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }
    let updated = state
        .db
        .update_phase(
            id,
            &UpdateCasePhaseParams {
                name: body.name.map(|n| n.trim().to_string()),
                order: body.order,
            },
        )
        .await?;
    Ok(DataResponse::new(found(updated, PHASE_NOT_FOUND)?))
}

pub async fn phases_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, PHASE_NOT_FOUND)?;
    let deleted = state
        .db
        .delete_phase(id)
        .await
        .map_err(still_referenced("Phase is the current phase of a case"))?;
    found(deleted.then_some(()), PHASE_NOT_FOUND)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Task templates ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateItemRequest {
    pub description: Option<String>,
    pub due_date_offset_days: Option<i64>,
}

impl TemplateItemRequest {
    fn into_params(self) -> Result<TemplateItemParams, ApiError> {
        let description = non_empty(self.description.as_deref())
            .ok_or_else(|| ApiError::bad_request("Item description is required"))?
            .to_string();
        Ok(TemplateItemParams {
            description,
            due_date_offset_days: check_due_date_offset(self.due_date_offset_days.unwrap_or(0))?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskTemplateRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub items: Vec<TemplateItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskTemplateRequest {
    pub name: Option<String>,
}

pub async fn task_templates_list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataResponse<Vec<TaskTemplateWithItems>>>, ApiError> {
    Ok(DataResponse::new(state.db.list_task_templates().await?))
}

pub async fn task_templates_create_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CreateTaskTemplateRequest>,
) -> Result<(StatusCode, Json<DataResponse<TaskTemplateWithItems>>), ApiError> {
    let name = non_empty(body.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Name is required"))?
        .to_string();
    let items = body
        .items
        .into_iter()
        .map(TemplateItemRequest::into_params)
        .collect::<Result<Vec<_>, _>>()?;
    let template = state.db.create_task_template(&name, &items).await?;
    Ok((StatusCode::CREATED, DataResponse::new(template)))
}

pub async fn task_templates_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<TaskTemplateWithItems>>, ApiError> {
    let id = parse_id(&id, TEMPLATE_NOT_FOUND)?;
    Ok(DataResponse::new(found(
        state.db.get_task_template(id).await?,
        TEMPLATE_NOT_FOUND,
    )?))
}

pub async fn task_templates_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateTaskTemplateRequest>,
) -> Result<Json<DataResponse<TaskTemplateWithItems>>, ApiError> {
    let id = parse_id(&id, TEMPLATE_NOT_FOUND)?;
    let name = non_empty(body.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Name is required"))?;
    let updated = state.db.update_task_template(id, name).await?;
    Ok(DataResponse::new(found(updated, TEMPLATE_NOT_FOUND)?))
}

pub async fn task_templates_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, TEMPLATE_NOT_FOUND)?;
    found(
        state.db.delete_task_template(id).await?.then_some(()),
        TEMPLATE_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn template_items_create_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<TemplateItemRequest>,
) -> Result<(StatusCode, Json<DataResponse<TaskTemplateItemRecord>>), ApiError> {
    let template_id = parse_id(&id, TEMPLATE_NOT_FOUND)?;
    found(
        state.db.get_task_template(template_id).await?,
        TEMPLATE_NOT_FOUND,
    )?;
    let item = state
        .db
        .create_template_item(template_id, &body.into_params()?)
        .await?;
    Ok((StatusCode::CREATED, DataResponse::new(item)))
}

pub async fn template_items_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<TaskTemplateItemRecord>>, ApiError> {
    let id = parse_id(&id, ITEM_NOT_FOUND)?;
    Ok(DataResponse::new(found(
        state.db.get_template_item(id).await?,
        ITEM_NOT_FOUND,
    )?))
}

pub async fn template_items_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<TemplateItemRequest>,
) -> Result<Json<DataResponse<TaskTemplateItemRecord>>, ApiError> {
    let id = parse_id(&id, ITEM_NOT_FOUND)?;
    if body.description.as_deref().is_some_and(|d| d.trim().is_empty()) {
        return Err(ApiError::bad_request("Item description cannot be empty"));
    }
    let due_date_offset_days = body
        .due_date_offset_days
        .map(check_due_date_offset)
        .transpose()?;
    let updated = state
        .db
        .update_template_item(
            id,
            &UpdateTemplateItemParams {
                description: body.description.map(|d| d.trim().to_string()),
                due_date_offset_days,
            },
        )
        .await?;
    Ok(DataResponse::new(found(updated, ITEM_NOT_FOUND)?))
}

pub async fn template_items_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, ITEM_NOT_FOUND)?;
    found(
        state.db.delete_template_item(id).await?.then_some(()),
        ITEM_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Phase transition rules ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleRequest {
    pub from_phase_id: Option<Uuid>,
    pub to_phase_id: Option<Uuid>,
    pub task_template_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuleRequest {
    pub from_phase_id: Option<Uuid>,
    pub to_phase_id: Option<Uuid>,
    #[serde(default, deserialize_with = "double_option")]
    pub task_template_id: Option<Option<Uuid>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleListQuery {
    pub from_phase_id: Option<Uuid>,
}

/// Both ends must exist and share a category; the template must exist.
async fn check_rule_refs(
    state: &AppState,
    from: Uuid,
    to: Uuid,
    template: Option<Uuid>,
) -> Result<(), ApiError> {
    let from_phase = state
        .db
        .get_phase(from)
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid fromPhaseId"))?;
    let to_phase = state
        .db
        .get_phase(to)
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid toPhaseId"))?;
    if from == to {
        return Err(ApiError::bad_request(
            "fromPhaseId and toPhaseId must differ",
        ));
    }
    if from_phase.category_id != to_phase.category_id {
        return Err(ApiError::bad_request(
            "Both phases must belong to the same category",
        ));
    }
    if let Some(template_id) = template
        && state.db.get_task_template(template_id).await?.is_none()
    {
        return Err(ApiError::bad_request("Invalid taskTemplateId"));
    }
    Ok(())
}

pub async fn rules_list_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<RuleListQuery>,
) -> Result<Json<DataResponse<Vec<PhaseTransitionRuleRecord>>>, ApiError> {
    Ok(DataResponse::new(
        state.db.list_transition_rules(query.from_phase_id).await?,
    ))
}

pub async fn rules_create_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CreateRuleRequest>,
) -> Result<(StatusCode, Json<DataResponse<PhaseTransitionRuleRecord>>), ApiError> {
    let (Some(from), Some(to)) = (body.from_phase_id, body.to_phase_id) else {
        return Err(ApiError::bad_request(
            "fromPhaseId and toPhaseId are required",
        ));
    };
    check_rule_refs(&state, from, to, body.task_template_id).await?;
    let rule = state
        .db
        .create_transition_rule(&CreateTransitionRuleParams {
            from_phase_id: from,
            to_phase_id: to,
            task_template_id: body.task_template_id,
        })
        .await
        .map_err(unique_violation("Transition rule already exists"))?;
    Ok((StatusCode::CREATED, DataResponse::new(rule)))
}

pub async fn rules_get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<PhaseTransitionRuleRecord>>, ApiError> {
    let id = parse_id(&id, RULE_NOT_FOUND)?;
    Ok(DataResponse::new(found(
        state.db.get_transition_rule(id).await?,
        RULE_NOT_FOUND,
    )?))
}

pub async fn rules_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateRuleRequest>,
) -> Result<Json<DataResponse<PhaseTransitionRuleRecord>>, ApiError> {
    let id = parse_id(&id, RULE_NOT_FOUND)?;
    let existing = found(state.db.get_transition_rule(id).await?, RULE_NOT_FOUND)?;
    let template = match body.task_template_id {
        Some(next) => next,
        None => existing.task_template_id,
    };
    check_rule_refs(
        &state,
        body.from_phase_id.unwrap_or(existing.from_phase_id),
        body.to_phase_id.unwrap_or(existing.to_phase_id),
        template,
    )
    .await?;
    let updated = state
        .db
        .update_transition_rule(
            id,
            &UpdateTransitionRuleParams {
                from_phase_id: body.from_phase_id,
                to_phase_id: body.to_phase_id,
                task_template_id: body.task_template_id,
            },
        )
        .await
        .map_err(unique_violation("Transition rule already exists"))?;
    Ok(DataResponse::new(found(updated, RULE_NOT_FOUND)?))
}

pub async fn rules_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, RULE_NOT_FOUND)?;
    found(
        state.db.delete_transition_rule(id).await?.then_some(()),
        RULE_NOT_FOUND,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Case phase transitions ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTransitionRequest {
    pub to_phase_id: Option<Uuid>,
    pub reason: Option<String>,
    pub actor_id: Option<Uuid>,
}

pub async fn case_phase_transition_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<PhaseTransitionRequest>,
) -> Result<Json<DataResponse<AppliedPhaseTransition>>, ApiError> {
    let case_id = parse_id(&id, "Case not found")?;
    let target = body
        .to_phase_id
        .ok_or_else(|| ApiError::bad_request("toPhaseId is required"))?;
    let applied = transition_case_phase(
        state.db.as_ref(),
        case_id,
        target,
        body.reason.filter(|r| !r.trim().is_empty()),
        body.actor_id,
    )
    .await?;
    Ok(DataResponse::new(applied))
}

pub async fn case_phase_history_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Vec<CaseEventRecord>>>, ApiError> {
    let case_id = parse_id(&id, "Case not found")?;
    found(state.db.get_case(case_id).await?, "Case not found")?;
    Ok(DataResponse::new(
        state
            .db
            .list_case_events(case_id, Some(PHASE_TRANSITION_EVENT))
            .await?,
    ))
}
