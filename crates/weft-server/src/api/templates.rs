use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use weft_core::error::EngineError;
use weft_core::models::{Visibility, WorkflowStep, WorkflowTemplate};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_templates).post(create_template))
        .route("/{id}", get(get_template).delete(delete_template))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTemplatesQuery {
    owner_id: Option<String>,
}

async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<ListTemplatesQuery>,
) -> Result<Json<serde_json::Value>, EngineError> {
    let owner_id = query.owner_id.as_deref().unwrap_or("default");
    let templates = state.template_store.list_by_owner(owner_id).await?;
    Ok(Json(serde_json::json!({ "templates": templates })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTemplateRequest {
    name: String,
    description: Option<String>,
    owner_id: Option<String>,
    visibility: Option<Visibility>,
    steps: Vec<WorkflowStep>,
}

async fn create_template(
    State(state): State<AppState>,
    Json(body): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), EngineError> {
    let template = WorkflowTemplate::new(
        uuid::Uuid::new_v4().to_string(),
        body.name,
        body.description,
        body.owner_id.unwrap_or_else(|| "default".to_string()),
        body.visibility.unwrap_or_default(),
        body.steps,
    );

    state.template_store.save(&template).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "template": template })),
    ))
}

async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowTemplate>, EngineError> {
    state
        .template_store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| EngineError::NotFound(format!("Template {} not found", id)))
}

async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, EngineError> {
    state.template_store.delete(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
