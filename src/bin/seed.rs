use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Parser;
use fake::{
    faker::{internet::en::SafeEmail, name::en::Name},
    Fake,
};
use sqlx::sqlite::SqlitePoolOptions;

use stride_events::{
    config::PaymentConfig,
    domain::{
        Actor, CouponApplicability, CreateCouponRequest, CreateEventRequest,
        CreateSchoolRegistrationRequest, CreateStudentRegistrationRequest, DiscountType,
        EventStatus,
    },
    notifications::NotificationManager,
    payments,
    service::ServiceContext,
};

/// Populate a database with a sample event, its coupons and a few registrations.
#[derive(Debug, Parser)]
#[command(name = "seed")]
struct Args {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://stride_events.db?mode=rwc")]
    database_url: String,

    /// Student registrations to create with the KEEPSTRIDING coupon.
    #[arg(long, default_value_t = 5)]
    students: usize,

    /// School registrations to create with the SCHOOL_FREE coupon.
    #[arg(long, default_value_t = 2)]
    schools: usize,

    #[arg(long, default_value = "stride-2026")]
    event_slug: String,
}

const GRADES: &[&str] = &["6", "7", "8", "9", "10", "11", "12"];
const CITIES: &[(&str, &str)] = &[
    ("Bengaluru", "Karnataka"),
    ("Pune", "Maharashtra"),
    ("Chennai", "Tamil Nadu"),
    ("Hyderabad", "Telangana"),
];

fn mobile() -> String {
    let n: u32 = (10_000_000u32..99_999_999u32).fake();
    format!("98{}", n)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    println!("🌱 Starting database seeding...");

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Every seeded registration is fully discounted, so the gateway is
    // never called and needs no credentials.
    let gateway = payments::build_gateway(&PaymentConfig::default())?;
    let context = ServiceContext::new(
        db_pool.clone(),
        gateway,
        Arc::new(NotificationManager::new()),
    );

    println!("📅 Creating event...");
    let now = Utc::now();
    let event = match context.event_repo.find_by_slug(&args.event_slug).await? {
        Some(event) => {
            println!("  ↪️  Event {} already exists", event.slug);
            event
        }
        None => {
            let event = context.event_repo.create(CreateEventRequest {
                title: "Stride Innovation Challenge".to_string(),
                slug: args.event_slug.clone(),
                tagline: Some("Build something that matters".to_string()),
                description: Some("A one-day innovation challenge for school students.".to_string()),
                status: EventStatus::Published,
                start_date: Some(now + Duration::days(45)),
                end_date: Some(now + Duration::days(45) + Duration::hours(8)),
                registration_deadline: Some(now + Duration::days(30)),
                max_participants: Some(500),
                is_free: false,
                registration_fee: 9900,
            }).await?;
            println!("  ✅ Created {} (fee ₹99.00)", event.title);
            event
        }
    };

    println!("🎟️  Creating coupons...");
    let coupons = [
        ("KEEPSTRIDING", "Full waiver for students", 100, CouponApplicability::Student),
        ("SCHOOL_FREE", "Full waiver for partner schools", 100, CouponApplicability::School),
        ("EARLYBIRD", "Half price for early registrations", 50, CouponApplicability::All),
    ];

    for (code, description, percent, applicable_to) in coupons {
        if context.coupon_repo.find_active_by_code(code).await?.is_some() {
            println!("  ↪️  {} already exists", code);
            continue;
        }

        context.coupon_repo.create(CreateCouponRequest {
            code: code.to_string(),
            description: Some(description.to_string()),
            discount_type: DiscountType::Percentage,
            discount_value: percent,
            max_uses: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(90),
            min_amount: None,
            applicable_to,
            event_id: Some(event.id),
        }).await?;
        println!("  ✅ {} ({}% off, {})", code, percent, applicable_to.as_str());
    }

    let actor = Actor::system("seed");

    println!("🎒 Creating student registrations...");
    for i in 0..args.students {
        let outcome = context.registration_service.register_student(
            CreateStudentRegistrationRequest {
                event_id: event.id,
                school_id: None,
                full_name: Name().fake(),
                email: SafeEmail().fake(),
                mobile: mobile(),
                school_name: format!("{} Public School", CITIES[i % CITIES.len()].0),
                grade: GRADES[i % GRADES.len()].to_string(),
                coupon_code: Some("KEEPSTRIDING".to_string()),
            },
            &actor,
        ).await?;
        println!(
            "  ✅ {} ({})",
            outcome.registration.registration_code(),
            outcome.registration.contact_name()
        );
    }

    println!("🏫 Creating school registrations...");
    for i in 0..args.schools {
        let (city, state) = CITIES[i % CITIES.len()];
        let outcome = context.registration_service.register_school(
            CreateSchoolRegistrationRequest {
                event_id: event.id,
                school_name: format!("{} International School", city),
                contact_person_name: Name().fake(),
                contact_email: SafeEmail().fake(),
                contact_mobile: mobile(),
                city: Some(city.to_string()),
                state: Some(state.to_string()),
                coupon_code: Some("SCHOOL_FREE".to_string()),
            },
            &actor,
        ).await?;
        println!(
            "  ✅ {} ({})",
            outcome.registration.registration_code(),
            outcome.registration.contact_name()
        );
    }

    println!("🎉 Seeding complete!");
    Ok(())
}
