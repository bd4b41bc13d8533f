use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{handlers::admin_actor, middleware::auth::CurrentUser, state::AppState},
    domain::{
        AuditQuery, AuditRecord, Coupon, CreateEventRequest, Event, StudentRegistration,
        UpdateEventRequest,
    },
    error::Result,
};

pub async fn audit_log(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditRecord>>> {
    let records = state.service_context.audit.query(&query).await?;
    Ok(Json(records))
}

pub async fn list_coupons(State(state): State<AppState>) -> Result<Json<Vec<Coupon>>> {
    let coupons = state.service_context.coupon_ledger.list().await?;
    Ok(Json(coupons))
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

pub async fn list_students(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<StudentRegistration>>> {
    let students = state.service_context.registration_service
        .list_students(event_id, page.limit.clamp(1, 500), page.offset.max(0))
        .await?;
    Ok(Json(students))
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>)> {
    let actor = admin_actor(&user, &headers);
    let event = state.service_context.event_service.create(request, &actor).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn update_event(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<UpdateEventRequest>,
) -> Result<Json<Event>> {
    let actor = admin_actor(&user, &headers);
    let event = state.service_context.event_service.update(id, request, &actor).await?;
    Ok(Json(event))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let actor = admin_actor(&user, &headers);
    state.service_context.event_service.delete(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}
