use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stride_events::{
    api,
    auth::SsoClient,
    config::Settings,
    notifications::{email::EmailSender, whatsapp::WhatsAppSender, NotificationManager},
    payments,
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stride_events=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new()?;

    if let Err(errors) = settings.validate() {
        for error in &errors {
            tracing::error!("Configuration error: {}", error);
        }
        anyhow::bail!("Invalid configuration ({} problems)", errors.len());
    }

    tracing::info!("Starting stride-events on {}:{}", settings.server.host, settings.server.port);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    if !settings.payments.enabled {
        tracing::warn!("Payments are disabled; only free registrations will succeed");
    }
    let gateway = payments::build_gateway(&settings.payments)?;

    let notifications = Arc::new(NotificationManager::new());

    if let Some(email) = EmailSender::new(settings.notifications.email.clone())? {
        notifications.register(Arc::new(email)).await;
    }

    if let Some(whatsapp) = WhatsAppSender::new(settings.notifications.whatsapp.clone())? {
        notifications.register(Arc::new(whatsapp)).await;
    }

    let sso_client = Arc::new(SsoClient::new(&settings.auth)?);

    let service_context = Arc::new(ServiceContext::new(
        db_pool.clone(),
        gateway,
        notifications,
    ));

    let app = api::create_app(service_context, sso_client, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}
