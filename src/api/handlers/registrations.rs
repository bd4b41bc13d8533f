use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    api::{handlers::actor_from_headers, state::AppState},
    domain::{CreateSchoolRegistrationRequest, CreateStudentRegistrationRequest},
    error::Result,
    service::registration_service::RegistrationOutcome,
};

pub async fn register_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateStudentRegistrationRequest>,
) -> Result<(StatusCode, Json<RegistrationOutcome>)> {
    let actor = actor_from_headers(&headers).with_email(request.email.clone());
    let outcome = state.service_context.registration_service
        .register_student(request, &actor)
        .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn register_school(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSchoolRegistrationRequest>,
) -> Result<(StatusCode, Json<RegistrationOutcome>)> {
    let actor = actor_from_headers(&headers).with_email(request.contact_email.clone());
    let outcome = state.service_context.registration_service
        .register_school(request, &actor)
        .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}
