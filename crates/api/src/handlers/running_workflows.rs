use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use engine::{ValidationLevel, WorkflowValidator};
use queue::WorkflowMessage;
use store::{NewRunningWorkflow, RunningWorkflow, RunningWorkflowStep};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct RunWorkflowDto {
    pub project_id: String,
    pub name: String,
    pub running_user: String,
    pub running_user_api_token: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub debug: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunningWorkflowDetail {
    pub running_workflow: RunningWorkflow,
    pub steps: Vec<RunningWorkflowStep>,
}

/// Create a running workflow and ask the engine to start it.
///
/// The definition is validated at RUN level against the supplied variables
/// first; nothing is recorded if that fails.
pub async fn run(
    Path(workflow_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<RunWorkflowDto>,
) -> Result<(StatusCode, Json<RunningWorkflow>), ApiError> {
    let workflow = state
        .store
        .get_workflow(&workflow_id)
        .await?
        .ok_or_else(|| ApiError::not_found("workflow", &workflow_id))?;

    let result = WorkflowValidator::validate(
        ValidationLevel::Run,
        &workflow.definition,
        Some(&payload.variables),
    );
    if !result.is_ok() {
        return Err(ApiError::Invalid(result));
    }

    let rwf = state
        .store
        .create_running_workflow(NewRunningWorkflow {
            workflow_id,
            project_id: payload.project_id,
            name: payload.name,
            running_user: payload.running_user,
            running_user_api_token: payload.running_user_api_token,
            variables: payload.variables,
            debug: payload.debug,
        })
        .await?;
    state.dispatcher.send(WorkflowMessage::start(&rwf.id))?;

    info!("running workflow {} requested", rwf.id);
    Ok((StatusCode::ACCEPTED, Json(rwf)))
}

pub async fn get(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RunningWorkflowDetail>, ApiError> {
    let running_workflow = state
        .store
        .get_running_workflow(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("running workflow", &id))?;
    let steps = state.store.get_running_workflow_steps(&id).await?;
    Ok(Json(RunningWorkflowDetail {
        running_workflow,
        steps,
    }))
}

/// Ask the engine to stop a running workflow. Stopping one that is already
/// done is accepted and has no effect.
pub async fn stop(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .get_running_workflow(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("running workflow", &id))?;
    state.dispatcher.send(WorkflowMessage::stop(&id))?;

    info!("stop requested for running workflow {}", id);
    Ok(StatusCode::ACCEPTED)
}
