use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use engine::{ValidationLevel, ValidationResult, WorkflowValidator};
use store::Workflow;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowDto {
    pub definition: Value,
}

#[derive(Debug, Deserialize)]
pub struct ValidateWorkflowDto {
    pub level: ValidationLevel,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
}

/// Store a definition that passes CREATE-level validation.
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let result = WorkflowValidator::validate(ValidationLevel::Create, &payload.definition, None);
    if !result.is_ok() {
        return Err(ApiError::Invalid(result));
    }

    let workflow = state.store.create_workflow(payload.definition).await?;
    info!("created workflow {}", workflow.id);
    Ok((StatusCode::CREATED, Json(workflow)))
}

pub async fn get(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .store
        .get_workflow(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("workflow", id))
}

/// Validate a stored definition at the requested level.
pub async fn validate(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ValidateWorkflowDto>,
) -> Result<Json<ValidationResult>, ApiError> {
    let workflow = state
        .store
        .get_workflow(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("workflow", &id))?;
    Ok(Json(WorkflowValidator::validate(
        payload.level,
        &workflow.definition,
        payload.variables.as_ref(),
    )))
}
