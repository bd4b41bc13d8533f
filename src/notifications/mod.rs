use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{Payment, Registration};
use crate::error::Result;

pub mod email;
pub mod whatsapp;

#[cfg(any(test, feature = "test-utils"))]
pub mod recording;

pub use email::EmailSender;
pub use whatsapp::WhatsAppSender;

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingSender;

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    RegistrationReceived {
        registration: Registration,
        event_title: String,
    },
    PaymentConfirmed {
        registration: Registration,
        event_title: String,
        payment: Payment,
    },
}

impl NotificationEvent {
    pub fn registration(&self) -> &Registration {
        match self {
            NotificationEvent::RegistrationReceived { registration, .. } => registration,
            NotificationEvent::PaymentConfirmed { registration, .. } => registration,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::RegistrationReceived { .. } => "registration_received",
            NotificationEvent::PaymentConfirmed { .. } => "payment_confirmed",
        }
    }

    pub fn event_title(&self) -> &str {
        match self {
            NotificationEvent::RegistrationReceived { event_title, .. } => event_title,
            NotificationEvent::PaymentConfirmed { event_title, .. } => event_title,
        }
    }
}

/// How one sender fared with one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub sender: String,
    pub error: Option<String>,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        self.error.is_none()
    }
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn send(&self, event: &NotificationEvent) -> Result<()>;
}

/// Fans a notification out to every registered sender. Delivery is best
/// effort: failures are logged and reported back, never raised.
pub struct NotificationManager {
    senders: RwLock<Vec<Arc<dyn NotificationSender>>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, sender: Arc<dyn NotificationSender>) {
        if sender.is_enabled() {
            tracing::info!("Registered notification sender: {}", sender.name());
            self.senders.write().await.push(sender);
        }
    }

    pub async fn notify(&self, event: &NotificationEvent) -> Vec<Delivery> {
        let senders = self.senders.read().await;
        let mut deliveries = Vec::with_capacity(senders.len());

        for sender in senders.iter() {
            let error = match sender.send(event).await {
                Ok(_) => {
                    tracing::debug!(
                        "Sender {} delivered notification for {}",
                        sender.name(),
                        event.registration().registration_code()
                    );
                    None
                }
                Err(e) => {
                    tracing::error!(
                        "Sender {} failed to deliver notification for {}: {:?}",
                        sender.name(),
                        event.registration().registration_code(),
                        e
                    );
                    Some(e.to_string())
                }
            };

            deliveries.push(Delivery {
                sender: sender.name().to_string(),
                error,
            });
        }

        deliveries
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Paise as a rupee string, e.g. `4950` -> `49.50`.
pub fn format_amount(paise: i64) -> String {
    format!("{}.{:02}", paise / 100, paise % 100)
}
