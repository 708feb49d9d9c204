use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use weft_core::engine::AdvanceOutcome;
use weft_core::error::EngineError;
use weft_core::models::{progress_percentage, StepStatus};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_execution))
        .route("/{id}", get(get_execution))
        .route("/{id}/next", post(advance_execution))
        .route("/{id}/input", post(submit_input))
        .route("/{id}/pause", post(pause_execution))
        .route("/{id}/resume", post(resume_execution))
        .route("/{id}/cancel", post(cancel_execution))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateExecutionRequest {
    template_id: String,
    owner_id: Option<String>,
    initial_context: Option<Value>,
}

async fn create_execution(
    State(state): State<AppState>,
    Json(body): Json<CreateExecutionRequest>,
) -> Result<(StatusCode, Json<Value>), EngineError> {
    let execution = state
        .engine
        .start(
            &body.template_id,
            body.owner_id.as_deref().unwrap_or("default"),
            body.initial_context.unwrap_or(Value::Null),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "execution": execution })),
    ))
}

fn outcome_body(outcome: AdvanceOutcome) -> Json<Value> {
    Json(serde_json::json!({
        "execution": outcome.execution,
        "completed": outcome.completed,
        "requiresUserInput": outcome.requires_user_input,
    }))
}

/// Execute the current step. The call blocks for the duration of the agent
/// invocation; a concurrent call against the same execution gets 409.
async fn advance_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let outcome = state.engine.advance(&id, &CancellationToken::new()).await?;
    Ok(outcome_body(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitInputRequest {
    step_order: usize,
    user_input: Value,
}

async fn submit_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SubmitInputRequest>,
) -> Result<Json<Value>, EngineError> {
    let outcome = state
        .engine
        .submit_input(&id, body.step_order, body.user_input, &CancellationToken::new())
        .await?;
    Ok(outcome_body(outcome))
}

async fn pause_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let execution = state.engine.pause(&id).await?;
    Ok(Json(serde_json::json!({ "execution": execution })))
}

async fn resume_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let execution = state.engine.resume(&id).await?;
    Ok(Json(serde_json::json!({ "execution": execution })))
}

async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let execution = state.engine.cancel(&id).await?;
    Ok(Json(serde_json::json!({ "execution": execution })))
}

async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let (execution, steps) = state.engine.snapshot(&id).await?;
    let total_steps = state
        .template_store
        .get(&execution.template_id)
        .await?
        .map(|t| t.steps.len())
        .unwrap_or(0);
    let completed_steps = steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .count();

    Ok(Json(serde_json::json!({
        "execution": execution,
        "steps": steps,
        "progressPercentage": progress_percentage(completed_steps, total_steps),
    })))
}
