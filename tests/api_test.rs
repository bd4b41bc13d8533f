mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;
use stride_events::{
    api::create_app,
    auth::{Claims, SsoClient},
    config::Settings,
    payments::FakeGateway,
};

fn app(t: &TestContext) -> Router {
    let settings = Settings::default();
    let sso_client = Arc::new(SsoClient::new(&settings.auth).unwrap());
    create_app(t.context.clone(), sso_client, Arc::new(settings))
}

fn token(role: &str) -> String {
    let claims = Claims {
        sub: Some("user-1".to_string()),
        user_id: None,
        email: Some("ops@example.com".to_string()),
        name: Some("Ops".to_string()),
        role: Some(role.to_string()),
        tenant_id: None,
        exp: Utc::now().timestamp() + 3600,
    };
    let secret = Settings::default().auth.jwt_secret;
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() -> anyhow::Result<()> {
    let t = setup().await?;
    let response = app(&t)
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn test_events_are_listed_and_found_by_slug() -> anyhow::Result<()> {
    let t = setup().await?;

    let response = app(&t)
        .oneshot(Request::builder().uri("/api/v1/events").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await.as_array().map(Vec::len), Some(1));

    let response = app(&t)
        .oneshot(Request::builder().uri("/api/v1/events/stride-2026").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["registration_fee"], FEE);

    let response = app(&t)
        .oneshot(Request::builder().uri("/api/v1/events/nope").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_student_registration_then_client_confirmation() -> anyhow::Result<()> {
    let t = setup().await?;

    let response = app(&t)
        .oneshot(post_json(
            "/api/v1/registrations/student",
            json!({
                "event_id": t.event.id,
                "full_name": "Asha Rao",
                "email": "asha@example.com",
                "mobile": "9876543210",
                "school_name": "Delhi Public School",
                "grade": "9",
            }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["registration"]["registration_type"], "student");
    assert_eq!(body["gateway"], "razorpay");
    let order_id = body["order"]["gateway_order_id"].as_str().unwrap().to_string();

    let response = app(&t)
        .oneshot(post_json(
            "/api/v1/payments/confirm",
            json!({
                "razorpay_order_id": order_id,
                "razorpay_payment_id": "pay_api",
                "razorpay_signature": FakeGateway::sign_payment(&order_id, "pay_api"),
            }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["payment"]["status"], "success");
    assert_eq!(body["registration"]["payment_status"], "success");
    Ok(())
}

#[tokio::test]
async fn test_forged_confirmation_is_payment_required() -> anyhow::Result<()> {
    let t = setup().await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "forge@example.com", None), &actor())
        .await?;
    let order_id = outcome.order.unwrap().gateway_order_id;

    let response = app(&t)
        .oneshot(post_json(
            "/api/v1/payments/confirm",
            json!({"order_id": order_id, "payment_id": "pay_x", "signature": "bad"}),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    Ok(())
}

#[tokio::test]
async fn test_coupon_validation_reports_errors_inline() -> anyhow::Result<()> {
    let t = setup().await?;
    standard_coupons(&t.context).await?;

    let response = app(&t)
        .oneshot(post_json(
            "/api/v1/payments/coupons/validate",
            json!({"code": "EARLYBIRD", "event_id": t.event.id, "registration_type": "school"}),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["original_amount"], FEE);
    assert_eq!(body["final_amount"], 4950);

    let response = app(&t)
        .oneshot(post_json(
            "/api/v1/payments/coupons/validate",
            json!({"code": "KEEPSTRIDING", "event_id": t.event.id, "registration_type": "school"}),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "Coupon not applicable");
    assert_eq!(body["final_amount"], FEE);
    Ok(())
}

#[tokio::test]
async fn test_webhook_signature_is_enforced() -> anyhow::Result<()> {
    let t = setup().await?;
    let outcome = t.context.registration_service
        .register_student(student(t.event.id, "hook@example.com", None), &actor())
        .await?;
    let payment = outcome.payment.unwrap();
    let (body, signature) = FakeGateway::captured_webhook(&payment.transaction_reference, "pay_h", FEE);

    let forged = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("x-razorpay-signature", "deadbeef")
        .body(Body::from(body.clone()))?;
    let response = app(&t).oneshot(forged).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let genuine = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("x-razorpay-signature", signature.as_str())
        .body(Body::from(body.clone()))?;
    let response = app(&t).oneshot(genuine).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "processed");

    let redelivered = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("x-razorpay-signature", signature.as_str())
        .body(Body::from(body))?;
    let response = app(&t).oneshot(redelivered).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "already_processed");
    Ok(())
}

#[tokio::test]
async fn test_webhook_for_unknown_order_is_acknowledged() -> anyhow::Result<()> {
    let t = setup().await?;
    let (body, signature) = FakeGateway::captured_webhook("missing", "pay_m", FEE);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("x-razorpay-signature", signature.as_str())
        .body(Body::from(body))?;
    let response = app(&t).oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "unknown_order");
    Ok(())
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() -> anyhow::Result<()> {
    let t = setup().await?;

    let response = app(&t)
        .oneshot(Request::builder().uri("/admin/audit-log").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app(&t)
        .oneshot(
            Request::builder()
                .uri("/admin/audit-log")
                .header(header::AUTHORIZATION, format!("Bearer {}", token("viewer")))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    t.context.registration_service
        .register_student(student(t.event.id, "audited@example.com", None), &actor())
        .await?;

    let response = app(&t)
        .oneshot(
            Request::builder()
                .uri("/admin/audit-log?event_type=registration")
                .header(header::AUTHORIZATION, format!("Bearer {}", token("admin")))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let records = read_json(response).await;
    assert_eq!(records.as_array().map(Vec::len), Some(1));
    assert_eq!(records[0]["user_email"], "audited@example.com");

    let response = app(&t)
        .oneshot(
            Request::builder()
                .uri(format!("/admin/events/{}/students", t.event.id))
                .header(header::AUTHORIZATION, format!("Bearer {}", token("admin")))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await.as_array().map(Vec::len), Some(1));
    Ok(())
}

fn admin_json(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token("admin")));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn new_event(slug: &str, fee: i64) -> Value {
    json!({
        "title": "Stride Robotics League",
        "slug": slug,
        "status": "published",
        "is_free": false,
        "registration_fee": fee,
    })
}

#[tokio::test]
async fn test_admin_creates_events() -> anyhow::Result<()> {
    let t = setup().await?;

    let mut request = post_json("/admin/events", new_event("robotics", 19900));
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token("viewer")).parse()?,
    );
    let response = app(&t).oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app(&t)
        .oneshot(admin_json("POST", "/admin/events", Some(new_event("robotics", 19900))))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    assert_eq!(created["slug"], "robotics");
    assert_eq!(created["registration_fee"], 19900);

    let response = app(&t)
        .oneshot(admin_json("POST", "/admin/events", Some(new_event("robotics", 100))))
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app(&t)
        .oneshot(admin_json("POST", "/admin/events", Some(new_event("negative", -1))))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app(&t)
        .oneshot(Request::builder().uri("/api/v1/events/robotics").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_admin_updates_events() -> anyhow::Result<()> {
    let t = setup().await?;
    let other = create_event(&t.context, "quiz-bowl", FEE).await?;

    let response = app(&t)
        .oneshot(admin_json(
            "PUT",
            &format!("/admin/events/{}", other.id),
            Some(json!({"registration_fee": 4900, "status": "draft"})),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = read_json(response).await;
    assert_eq!(updated["registration_fee"], 4900);
    assert_eq!(updated["status"], "draft");
    assert_eq!(updated["title"], other.title);

    // Drafts drop out of the public catalogue.
    let response = app(&t)
        .oneshot(Request::builder().uri("/api/v1/events/quiz-bowl").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app(&t)
        .oneshot(admin_json(
            "PUT",
            &format!("/admin/events/{}", other.id),
            Some(json!({"slug": t.event.slug})),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app(&t)
        .oneshot(admin_json(
            "PUT",
            &format!("/admin/events/{}", uuid::Uuid::new_v4()),
            Some(json!({"title": "Ghost"})),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_admin_deletes_only_unused_events() -> anyhow::Result<()> {
    let t = setup().await?;
    let spare = create_event(&t.context, "spare", FEE).await?;
    t.context.registration_service
        .register_student(student(t.event.id, "kept@example.com", None), &actor())
        .await?;

    let response = app(&t)
        .oneshot(admin_json("DELETE", &format!("/admin/events/{}", t.event.id), None))
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(count(&t.pool, "student_registrations").await?, 1);

    let response = app(&t)
        .oneshot(admin_json("DELETE", &format!("/admin/events/{}", spare.id), None))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(t.context.event_repo.find_by_id(spare.id).await?.is_none());

    let response = app(&t)
        .oneshot(admin_json("DELETE", &format!("/admin/events/{}", spare.id), None))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app(&t)
        .oneshot(admin_json("GET", "/admin/audit-log?event_type=event", None))
        .await?;
    let records = read_json(response).await;
    assert_eq!(records.as_array().map(Vec::len), Some(1));
    assert_eq!(records[0]["action"], "delete");
    assert_eq!(records[0]["user_email"], "ops@example.com");
    assert_eq!(records[0]["resource_id"], spare.id.to_string());
    Ok(())
}
