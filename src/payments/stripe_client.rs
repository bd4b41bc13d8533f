use async_trait::async_trait;
use stripe::{
    Client, CreatePaymentIntent, CreatePaymentIntentAutomaticPaymentMethods, Currency, EventObject,
    EventType, PaymentIntent, PaymentIntentId, PaymentIntentStatus, StripeError, Webhook,
    WebhookError,
};
use uuid::Uuid;

use crate::{
    config::StripeConfig,
    domain::GatewayKind,
    error::{AppError, Result},
    payments::{
        OrderMetadata, OrderRef, PaymentGateway, PaymentVerification, WebhookEvent,
        WebhookEventKind,
    },
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub struct StripeGateway {
    client: Client,
    publishable_key: String,
    webhook_secret: String,
    currency: String,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig, currency: &str) -> Result<Self> {
        let client = match &config.base_url {
            Some(url) => {
                reqwest::Url::parse(url)
                    .map_err(|e| AppError::Internal(format!("Invalid Stripe base URL {}: {}", url, e)))?;
                Client::from_url(url.as_str(), config.secret_key.clone())
            }
            None => Client::new(config.secret_key.clone()),
        };

        Ok(Self {
            client,
            publishable_key: config.publishable_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            currency: currency.to_string(),
        })
    }
}

/// `payment_intent.succeeded` rather than the quoted JSON form.
fn event_name(event_type: EventType) -> String {
    event_type.to_string().trim_matches('"').to_string()
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn public_key(&self) -> Option<String> {
        Some(self.publishable_key.clone())
    }

    async fn create_order(&self, final_amount: i64, metadata: &OrderMetadata) -> Result<OrderRef> {
        if final_amount == 0 {
            return Ok(OrderRef::free(&self.currency));
        }

        let currency: Currency = self.currency
            .to_lowercase()
            .parse()
            .map_err(|_| AppError::Internal(format!("Unsupported currency: {}", self.currency)))?;

        let transaction_reference = Uuid::new_v4().to_string();

        let mut params = CreatePaymentIntent::new(final_amount, currency);
        params.metadata = Some(metadata.notes(&transaction_reference));
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            enabled: true,
            ..Default::default()
        });

        let intent = PaymentIntent::create(&self.client, params)
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("Stripe error: {}", e)))?;

        tracing::info!(
            "Created Stripe PaymentIntent {} for {} (ref {})",
            intent.id, intent.amount, transaction_reference
        );

        Ok(OrderRef {
            gateway_order_id: intent.id.to_string(),
            transaction_reference,
            amount: intent.amount,
            currency: intent.currency.to_string().to_uppercase(),
            status: intent.status.to_string(),
            is_free: false,
            client_secret: intent.client_secret,
        })
    }

    /// Stripe has no client-side signature. The payment id must be the
    /// intent itself, and only Stripe's view of the intent decides: a
    /// succeeded intent verifies, a canceled one is rejected, and anything
    /// still in flight is left for the webhook.
    async fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        _signature: &str,
    ) -> Result<PaymentVerification> {
        if order_id != payment_id {
            tracing::warn!("Stripe payment id {} does not match intent {}", payment_id, order_id);
            return Ok(PaymentVerification::Rejected(format!(
                "Payment {} does not belong to intent {}",
                payment_id, order_id
            )));
        }

        let id: PaymentIntentId = match order_id.parse() {
            Ok(id) => id,
            Err(_) => {
                return Ok(PaymentVerification::Rejected(format!(
                    "Malformed PaymentIntent id {}",
                    order_id
                )))
            }
        };

        let intent = match PaymentIntent::retrieve(&self.client, &id, &[]).await {
            Ok(intent) => intent,
            Err(StripeError::Stripe(err)) if err.http_status == 404 => {
                return Ok(PaymentVerification::Rejected(format!(
                    "Unknown PaymentIntent {}",
                    order_id
                )))
            }
            Err(e) => {
                tracing::error!("Failed to retrieve Stripe PaymentIntent {}: {}", order_id, e);
                return Err(AppError::GatewayUnavailable(format!("Stripe error: {}", e)));
            }
        };

        Ok(match intent.status {
            PaymentIntentStatus::Succeeded => PaymentVerification::Verified,
            PaymentIntentStatus::Canceled => PaymentVerification::Rejected(format!(
                "PaymentIntent {} was canceled",
                order_id
            )),
            status => PaymentVerification::Pending(status.to_string()),
        })
    }

    fn parse_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookEvent> {
        let payload = std::str::from_utf8(raw_body).map_err(|_| AppError::InvalidWebhookSignature)?;

        let event = Webhook::construct_event(payload, signature, &self.webhook_secret)
            .map_err(|e| match e {
                WebhookError::BadParse(e) => {
                    AppError::BadRequest(format!("Malformed webhook body: {}", e))
                }
                e => {
                    tracing::warn!("Rejected Stripe webhook: {}", e);
                    AppError::InvalidWebhookSignature
                }
            })?;

        let kind = match event.type_ {
            EventType::PaymentIntentSucceeded => WebhookEventKind::Captured,
            EventType::PaymentIntentPaymentFailed => WebhookEventKind::Failed,
            other => return Ok(WebhookEvent::other(event_name(other))),
        };

        let EventObject::PaymentIntent(intent) = event.data.object else {
            return Err(AppError::BadRequest(format!(
                "Stripe event {} does not carry a PaymentIntent",
                event.id
            )));
        };

        Ok(WebhookEvent {
            kind,
            event_name: event_name(event.type_),
            gateway_payment_id: Some(intent.id.to_string()),
            transaction_reference: intent.metadata.get("transaction_id").cloned(),
            amount: Some(intent.amount),
            outcome: intent.last_payment_error.and_then(|error| error.message),
        })
    }
}
