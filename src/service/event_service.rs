use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{Actor, CreateEventRequest, Event, NewAuditRecord, UpdateEventRequest},
    error::Result,
    repository::EventRepository,
    service::audit_service::{AuditRecorder, EVENT_CATALOG, STATUS_SUCCESS},
};

/// Back-office management of the event catalogue. Every change is audited
/// against the admin who made it.
pub struct EventService {
    event_repo: Arc<dyn EventRepository>,
    audit: Arc<AuditRecorder>,
}

impl EventService {
    pub fn new(event_repo: Arc<dyn EventRepository>, audit: Arc<AuditRecorder>) -> Self {
        Self { event_repo, audit }
    }

    pub async fn create(&self, request: CreateEventRequest, actor: &Actor) -> Result<Event> {
        request.validate()?;

        let event = self.event_repo.create(request).await?;
        tracing::info!("Event {} ({}) created", event.id, event.slug);

        self.record("create", &event, actor).await;
        Ok(event)
    }

    pub async fn update(&self, id: Uuid, request: UpdateEventRequest, actor: &Actor) -> Result<Event> {
        request.validate()?;

        let event = self.event_repo.update(id, request).await?;
        tracing::info!("Event {} ({}) updated", event.id, event.slug);

        self.record("update", &event, actor).await;
        Ok(event)
    }

    pub async fn delete(&self, id: Uuid, actor: &Actor) -> Result<()> {
        self.event_repo.delete(id).await?;
        tracing::info!("Event {} deleted", id);

        self.audit
            .record(
                NewAuditRecord::new(EVENT_CATALOG, "delete", STATUS_SUCCESS)
                    .actor(actor)
                    .resource("event", id),
            )
            .await;
        Ok(())
    }

    async fn record(&self, action: &str, event: &Event, actor: &Actor) {
        self.audit
            .record(
                NewAuditRecord::new(EVENT_CATALOG, action, STATUS_SUCCESS)
                    .actor(actor)
                    .resource("event", event.id)
                    .details(json!({
                        "slug": event.slug,
                        "status": event.status,
                        "is_free": event.is_free,
                        "registration_fee": event.registration_fee,
                    })),
            )
            .await;
    }
}
