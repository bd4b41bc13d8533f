use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    api::state::AppState,
    domain::Event,
    error::{AppError, Result},
};

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Event>>> {
    let events = state.service_context.event_repo.list_published().await?;
    Ok(Json(events))
}

pub async fn get(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Event>> {
    let event = state.service_context.event_repo
        .find_by_slug(&slug)
        .await?
        .filter(|event| !matches!(event.status, crate::domain::EventStatus::Draft))
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    Ok(Json(event))
}
