pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    auth::SsoClient,
    config::Settings,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(
    service_context: Arc<ServiceContext>,
    sso_client: Arc<SsoClient>,
    settings: Arc<Settings>,
) -> Router {
    let app_state = AppState::new(service_context, sso_client, settings);

    Router::new()
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))
        .nest("/api/v1", api_routes())
        .nest("/admin", admin_routes(app_state.clone()))
        .with_state(app_state)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/events", event_routes())
        .nest("/registrations", registration_routes())
        .nest("/payments", payment_routes())
}

fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::events::list))
        .route("/:slug", get(handlers::events::get))
}

fn registration_routes() -> Router<AppState> {
    Router::new()
        .route("/student", post(handlers::registrations::register_student))
        .route("/school", post(handlers::registrations::register_school))
}

fn payment_routes() -> Router<AppState> {
    Router::new()
        // Gateway callback, authenticated by its signature header
        .route("/webhook", post(handlers::payments::webhook))
        .route("/coupons/validate", post(handlers::payments::validate_coupon))
        .route("/confirm", post(handlers::payments::confirm))
        .route("/retry", post(handlers::payments::retry))
        .route("/:id", get(handlers::payments::get))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/audit-log", get(handlers::admin::audit_log))
        .route("/coupons", get(handlers::admin::list_coupons))
        .route("/events", post(handlers::admin::create_event))
        .route(
            "/events/:id",
            put(handlers::admin::update_event).delete(handlers::admin::delete_event),
        )
        .route("/events/:id/students", get(handlers::admin::list_students))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_admin,
        ))
}
