use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::PaymentConfig,
    domain::{GatewayKind, RegistrationType},
    error::Result,
};

pub mod razorpay;
pub mod signature;
pub mod stripe_client;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use razorpay::RazorpayGateway;
pub use stripe_client::StripeGateway;

#[cfg(any(test, feature = "test-utils"))]
pub use fake::FakeGateway;

/// Prefix of the synthetic order id given to zero-amount orders.
pub const FREE_ORDER_PREFIX: &str = "free_";

/// What the gateway is told about the order, echoed back in its notes or
/// metadata next to `transaction_id`.
#[derive(Debug, Clone)]
pub struct OrderMetadata {
    pub registration_id: Uuid,
    pub registration_type: RegistrationType,
    pub event_id: Uuid,
}

impl OrderMetadata {
    pub fn notes(&self, transaction_reference: &str) -> HashMap<String, String> {
        let mut notes = HashMap::new();
        notes.insert("transaction_id".to_string(), transaction_reference.to_string());
        notes.insert("registration_id".to_string(), self.registration_id.to_string());
        notes.insert("registration_type".to_string(), self.registration_type.to_string());
        notes.insert("event_id".to_string(), self.event_id.to_string());
        notes
    }
}

/// A created gateway order (Razorpay order or Stripe PaymentIntent).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderRef {
    pub gateway_order_id: String,
    pub transaction_reference: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub is_free: bool,
    /// Stripe only: handed to the browser to complete the intent.
    pub client_secret: Option<String>,
}

impl OrderRef {
    /// A zero-amount order that never touches the gateway.
    pub fn free(currency: &str) -> Self {
        let transaction_reference = Uuid::new_v4().to_string();
        Self {
            gateway_order_id: format!("{}{}", FREE_ORDER_PREFIX, transaction_reference),
            transaction_reference,
            amount: 0,
            currency: currency.to_string(),
            status: "free".to_string(),
            is_free: true,
            client_secret: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookEventKind {
    Captured,
    Failed,
    Other,
}

/// A webhook after its signature has been checked, in gateway-neutral form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub kind: WebhookEventKind,
    pub event_name: String,
    pub gateway_payment_id: Option<String>,
    pub transaction_reference: Option<String>,
    pub amount: Option<i64>,
    /// Gateway-reported failure description, when there is one.
    pub outcome: Option<String>,
}

impl WebhookEvent {
    pub fn other(event_name: impl Into<String>) -> Self {
        Self {
            kind: WebhookEventKind::Other,
            event_name: event_name.into(),
            gateway_payment_id: None,
            transaction_reference: None,
            amount: None,
            outcome: None,
        }
    }
}

/// The gateway's answer about a client-reported payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentVerification {
    Verified,
    /// The payment did not and will not go through.
    Rejected(String),
    /// Still in flight at the gateway (e.g. 3-D Secure); the webhook settles it.
    Pending(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Name of the HTTP header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Key the browser checkout widget needs, if any.
    fn public_key(&self) -> Option<String>;

    /// Create an order for `final_amount` paise. Zero-amount orders are
    /// synthesized locally.
    async fn create_order(&self, final_amount: i64, metadata: &OrderMetadata) -> Result<OrderRef>;

    /// Check a client-reported payment. Errors only when the gateway cannot
    /// be reached, in which case the payment must stay pending.
    async fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<PaymentVerification>;

    /// Authenticate and normalize a webhook. Fails with
    /// `InvalidWebhookSignature` before the body is parsed.
    fn parse_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookEvent>;
}

pub fn build_gateway(config: &PaymentConfig) -> Result<Arc<dyn PaymentGateway>> {
    let gateway: Arc<dyn PaymentGateway> = match config.gateway {
        GatewayKind::Razorpay => Arc::new(RazorpayGateway::new(&config.razorpay, &config.currency)?),
        GatewayKind::Stripe => Arc::new(StripeGateway::new(&config.stripe, &config.currency)?),
    };

    tracing::info!("Payment gateway: {}", gateway.kind());
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_order_is_synthetic() {
        let order = OrderRef::free("INR");
        assert!(order.is_free);
        assert_eq!(order.amount, 0);
        assert_eq!(
            order.gateway_order_id,
            format!("free_{}", order.transaction_reference)
        );
        assert!(Uuid::parse_str(&order.transaction_reference).is_ok());
    }

    #[test]
    fn test_notes_carry_transaction_id() {
        let metadata = OrderMetadata {
            registration_id: Uuid::new_v4(),
            registration_type: RegistrationType::School,
            event_id: Uuid::new_v4(),
        };
        let notes = metadata.notes("ref-1");
        assert_eq!(notes["transaction_id"], "ref-1");
        assert_eq!(notes["registration_type"], "school");
    }
}
