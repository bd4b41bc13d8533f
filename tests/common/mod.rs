#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use stride_events::{
    domain::{
        Actor, Coupon, CouponApplicability, CreateCouponRequest, CreateEventRequest,
        CreateSchoolRegistrationRequest, CreateStudentRegistrationRequest, DiscountType, Event,
        EventStatus,
    },
    notifications::{recording::RecordingSender, NotificationManager},
    payments::{FakeGateway, PaymentGateway},
    service::ServiceContext,
};

pub const FEE: i64 = 9900;

pub struct TestContext {
    pub pool: SqlitePool,
    pub context: Arc<ServiceContext>,
    pub gateway: Arc<FakeGateway>,
    pub recorder: Arc<RecordingSender>,
    pub event: Event,
}

/// A single connection keeps every query on the same in-memory database.
pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// A named in-memory database behind several connections, so concurrent
/// callers really do run on different connections.
pub async fn shared_pool(max_connections: u32) -> anyhow::Result<SqlitePool> {
    let url = format!("sqlite:file:stride-{}?mode=memory&cache=shared", Uuid::new_v4());
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub async fn setup() -> anyhow::Result<TestContext> {
    setup_with_pool(test_pool().await?).await
}

pub async fn setup_with_pool(pool: SqlitePool) -> anyhow::Result<TestContext> {

    let gateway = Arc::new(FakeGateway::new());
    let recorder = Arc::new(RecordingSender::new());
    let notifications = Arc::new(NotificationManager::new());
    notifications.register(recorder.clone()).await;

    let dyn_gateway: Arc<dyn PaymentGateway> = gateway.clone();
    let context = Arc::new(ServiceContext::new(pool.clone(), dyn_gateway, notifications));

    let event = create_event(&context, "stride-2026", FEE).await?;

    Ok(TestContext { pool, context, gateway, recorder, event })
}

pub async fn create_event(context: &ServiceContext, slug: &str, fee: i64) -> anyhow::Result<Event> {
    let now = Utc::now();
    let event = context.event_repo.create(CreateEventRequest {
        title: "Stride Innovation Challenge".to_string(),
        slug: slug.to_string(),
        tagline: None,
        description: None,
        status: EventStatus::Published,
        start_date: Some(now + Duration::days(30)),
        end_date: None,
        registration_deadline: Some(now + Duration::days(20)),
        max_participants: None,
        is_free: fee == 0,
        registration_fee: fee,
    }).await?;
    Ok(event)
}

pub fn coupon_request(
    code: &str,
    percent: i64,
    applicable_to: CouponApplicability,
    max_uses: Option<i64>,
) -> CreateCouponRequest {
    let now = Utc::now();
    CreateCouponRequest {
        code: code.to_string(),
        description: None,
        discount_type: DiscountType::Percentage,
        discount_value: percent,
        max_uses,
        valid_from: now - Duration::days(1),
        valid_until: now + Duration::days(30),
        min_amount: None,
        applicable_to,
        event_id: None,
    }
}

pub async fn create_coupon(
    context: &ServiceContext,
    code: &str,
    percent: i64,
    applicable_to: CouponApplicability,
    max_uses: Option<i64>,
) -> anyhow::Result<Coupon> {
    let coupon = context
        .coupon_repo
        .create(coupon_request(code, percent, applicable_to, max_uses))
        .await?;
    Ok(coupon)
}

pub async fn standard_coupons(context: &ServiceContext) -> anyhow::Result<()> {
    create_coupon(context, "KEEPSTRIDING", 100, CouponApplicability::Student, None).await?;
    create_coupon(context, "SCHOOL_FREE", 100, CouponApplicability::School, None).await?;
    create_coupon(context, "EARLYBIRD", 50, CouponApplicability::All, None).await?;
    Ok(())
}

pub fn student(event_id: Uuid, email: &str, coupon_code: Option<&str>) -> CreateStudentRegistrationRequest {
    CreateStudentRegistrationRequest {
        event_id,
        school_id: None,
        full_name: "Asha Rao".to_string(),
        email: email.to_string(),
        mobile: "9876543210".to_string(),
        school_name: "Delhi Public School".to_string(),
        grade: "9".to_string(),
        coupon_code: coupon_code.map(str::to_string),
    }
}

pub fn school(event_id: Uuid, email: &str, coupon_code: Option<&str>) -> CreateSchoolRegistrationRequest {
    CreateSchoolRegistrationRequest {
        event_id,
        school_name: "Bengaluru International School".to_string(),
        contact_person_name: "Ravi Kumar".to_string(),
        contact_email: email.to_string(),
        contact_mobile: "9123456780".to_string(),
        city: Some("Bengaluru".to_string()),
        state: Some("Karnataka".to_string()),
        coupon_code: coupon_code.map(str::to_string),
    }
}

pub fn actor() -> Actor {
    Actor {
        ip_address: Some("127.0.0.1".to_string()),
        user_agent: Some("integration-test".to_string()),
        ..Default::default()
    }
}

pub async fn count(pool: &SqlitePool, table: &str) -> anyhow::Result<i64> {
    let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(n)
}
