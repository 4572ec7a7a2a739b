//! Model catalog and switching handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use xpathai_llama::{ModelInfo, ServerStatus};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    /// File names, sorted.
    pub available_models: Vec<String>,
    pub models: Vec<ModelInfo>,
    pub current_model: Option<String>,
    pub default_model: Option<String>,
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let models = state.switchboard.supervisor().catalog().list();
    Json(ModelsResponse {
        available_models: models.iter().map(|m| m.name.clone()).collect(),
        models,
        current_model: state.switchboard.current_model(),
        default_model: state.switchboard.default_model().map(str::to_string),
    })
}

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct SelectModelResponse {
    pub model: Option<String>,
    pub status: ServerStatus,
}

/// Load `model`, waiting until it serves or fails.
pub async fn select_model(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectModelRequest>,
) -> Result<Json<SelectModelResponse>, ApiError> {
    if req.model.trim().is_empty() {
        return Err(ApiError::BadRequest("model must not be empty".to_string()));
    }
    state.switchboard.ensure_model(req.model.trim()).await?;

    let status = state.switchboard.supervisor().status();
    info!("Model {:?} selected", status.model);
    Ok(Json(SelectModelResponse {
        model: status.model.clone(),
        status,
    }))
}

/// Stop the running model once in-flight generations finish.
pub async fn unload_model(State(state): State<Arc<AppState>>) -> Json<SelectModelResponse> {
    state.switchboard.unload().await;
    Json(SelectModelResponse {
        model: None,
        status: state.switchboard.supervisor().status(),
    })
}
