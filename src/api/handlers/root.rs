use axum::{http::StatusCode, Json, response::IntoResponse};
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Stride Events API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Event registration with coupon-aware payment settlement",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "events": "/api/v1/events",
            "registrations": "/api/v1/registrations",
            "payments": "/api/v1/payments",
            "admin": "/admin"
        }
    }))
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
