use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::HistoryItem;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HistoryListResponse {
    pub items: Vec<HistoryItem>,
}

/// GET /api/v1/history
pub async fn handle_list_history(
    State(state): State<AppState>,
) -> Result<Json<HistoryListResponse>, AppError> {
    let items = state.history.list().await?;
    Ok(Json(HistoryListResponse { items }))
}

/// GET /api/v1/history/:id
pub async fn handle_get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryItem>, AppError> {
    state
        .history
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("History item {id} not found")))
}

/// DELETE /api/v1/history/:id
pub async fn handle_delete_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.history.remove(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("History item {id} not found")))
    }
}

/// DELETE /api/v1/history
pub async fn handle_clear_history(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.history.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}
