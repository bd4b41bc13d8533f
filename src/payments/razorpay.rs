use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    config::RazorpayConfig,
    domain::GatewayKind,
    error::{AppError, Result},
    payments::{
        signature::verify_hmac_sha256, OrderMetadata, OrderRef, PaymentGateway,
        PaymentVerification, WebhookEvent, WebhookEventKind,
    },
};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: i64,
    currency: String,
    status: String,
}

pub struct RazorpayGateway {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
    currency: String,
}

impl RazorpayGateway {
    pub fn new(config: &RazorpayConfig, currency: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
            currency: currency.to_string(),
        })
    }

    /// Signature Razorpay's checkout hands the browser after payment.
    pub fn payment_signature(&self, order_id: &str, payment_id: &str) -> String {
        super::signature::hmac_sha256_hex(
            &self.key_secret,
            format!("{}|{}", order_id, payment_id).as_bytes(),
        )
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn public_key(&self) -> Option<String> {
        Some(self.key_id.clone())
    }

    async fn create_order(&self, final_amount: i64, metadata: &OrderMetadata) -> Result<OrderRef> {
        if final_amount == 0 {
            return Ok(OrderRef::free(&self.currency));
        }

        let transaction_reference = Uuid::new_v4().to_string();
        let receipt: String = transaction_reference.chars().take(8).collect();

        let body = json!({
            "amount": final_amount,
            "currency": self.currency,
            "receipt": format!("event_reg_{}", receipt),
            "payment_capture": 1,
            "notes": metadata.notes(&transaction_reference),
        });

        let response = self.http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("Razorpay request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::error!("Razorpay order creation failed with {}: {}", status, text);
            return Err(AppError::GatewayUnavailable(format!(
                "Razorpay returned {}",
                status
            )));
        }

        let order: RazorpayOrder = response
            .json()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("Invalid Razorpay response: {}", e)))?;

        tracing::info!(
            "Created Razorpay order {} for {} paise (ref {})",
            order.id, order.amount, transaction_reference
        );

        Ok(OrderRef {
            gateway_order_id: order.id,
            transaction_reference,
            amount: order.amount,
            currency: order.currency,
            status: order.status,
            is_free: false,
            client_secret: None,
        })
    }

    async fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<PaymentVerification> {
        let message = format!("{}|{}", order_id, payment_id);
        if verify_hmac_sha256(&self.key_secret, message.as_bytes(), signature) {
            return Ok(PaymentVerification::Verified);
        }

        tracing::warn!("Razorpay signature mismatch for order {}", order_id);
        Ok(PaymentVerification::Rejected("Signature verification failed".to_string()))
    }

    fn parse_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookEvent> {
        if !verify_hmac_sha256(&self.webhook_secret, raw_body, signature) {
            return Err(AppError::InvalidWebhookSignature);
        }

        let payload: Value = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::BadRequest(format!("Malformed webhook body: {}", e)))?;

        let event_name = payload["event"].as_str().unwrap_or_default().to_string();
        let kind = match event_name.as_str() {
            "payment.captured" => WebhookEventKind::Captured,
            "payment.failed" => WebhookEventKind::Failed,
            _ => return Ok(WebhookEvent::other(event_name)),
        };

        let entity = &payload["payload"]["payment"]["entity"];

        Ok(WebhookEvent {
            kind,
            event_name,
            gateway_payment_id: entity["id"].as_str().map(str::to_string),
            transaction_reference: entity["notes"]["transaction_id"].as_str().map(str::to_string),
            amount: entity["amount"].as_i64(),
            outcome: entity["error_description"].as_str().map(str::to_string),
        })
    }
}
