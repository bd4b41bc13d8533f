use std::sync::Arc;

use serde_json::json;

use crate::{
    domain::{Actor, AuditQuery, AuditRecord, NewAuditRecord, Payment},
    error::Result,
    notifications::{Delivery, NotificationEvent},
    repository::AuditRepository,
};

pub const EVENT_PAYMENT: &str = "payment";
pub const EVENT_COUPON: &str = "coupon";
pub const EVENT_REGISTRATION: &str = "registration";
pub const EVENT_NOTIFICATION: &str = "notification";
/// Admin changes to the event catalogue.
pub const EVENT_CATALOG: &str = "event";

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILURE: &str = "failure";
pub const STATUS_ANOMALY: &str = "anomaly";

/// Append-only audit trail. Recording never fails the caller: a write
/// error is logged and dropped.
pub struct AuditRecorder {
    repo: Arc<dyn AuditRepository>,
}

impl AuditRecorder {
    pub fn new(repo: Arc<dyn AuditRepository>) -> Self {
        Self { repo }
    }

    pub async fn record(&self, record: NewAuditRecord) {
        let label = format!("{}/{}/{}", record.event_type, record.action, record.status);
        match self.repo.append(record).await {
            Ok(entry) => tracing::debug!("Audit record {} written: {}", entry.id, label),
            Err(e) => tracing::error!("Failed to write audit record {}: {:?}", label, e),
        }
    }

    pub async fn payment(&self, action: &str, status: &str, payment: &Payment, actor: &Actor) {
        let mut record = NewAuditRecord::new(EVENT_PAYMENT, action, status)
            .actor(actor)
            .resource("payment", payment.id)
            .details(payment_details(payment));

        if let Some(reason) = &payment.error_message {
            record = record.error(reason.clone());
        }

        self.record(record).await;
    }

    /// One `notification/send` record per sender that was tried.
    pub async fn deliveries(&self, event: &NotificationEvent, deliveries: &[Delivery]) {
        let registration = event.registration();
        let actor = Actor::system("notifications");

        for delivery in deliveries {
            let status = if delivery.is_delivered() { STATUS_SUCCESS } else { STATUS_FAILURE };
            let mut record = NewAuditRecord::new(EVENT_NOTIFICATION, "send", status)
                .actor(&actor)
                .resource(registration.registration_type().as_str(), registration.id())
                .details(json!({
                    "sender": delivery.sender,
                    "notification": event.kind(),
                    "registration_code": registration.registration_code(),
                }));

            if let Some(error) = &delivery.error {
                record = record.error(error.clone());
            }

            self.record(record).await;
        }
    }

    pub async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        self.repo.query(query).await
    }
}

pub fn payment_details(payment: &Payment) -> serde_json::Value {
    json!({
        "registration_id": payment.registration_id,
        "registration_type": payment.registration_type,
        "gateway": payment.gateway,
        "gateway_order_id": payment.gateway_order_id,
        "gateway_payment_id": payment.gateway_payment_id,
        "transaction_reference": payment.transaction_reference,
        "amount": payment.amount,
        "discount_amount": payment.discount_amount,
        "final_amount": payment.final_amount,
        "coupon_id": payment.coupon_id,
        "status": payment.status,
    })
}
