//! In-process gateway for tests. Orders are numbered, signatures are the
//! Razorpay HMAC under a fixed secret, and failures can be switched on.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    domain::GatewayKind,
    error::{AppError, Result},
    payments::{
        signature::{hmac_sha256_hex, verify_hmac_sha256},
        OrderMetadata, OrderRef, PaymentGateway, PaymentVerification, WebhookEvent,
        WebhookEventKind,
    },
};

pub const FAKE_KEY_SECRET: &str = "fake_key_secret";
pub const FAKE_WEBHOOK_SECRET: &str = "fake_webhook_secret";

#[derive(Default)]
pub struct FakeGateway {
    orders_created: AtomicUsize,
    fail_create: AtomicBool,
    fail_verify: AtomicBool,
    verify_in_flight: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create_order` fail as if the gateway were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_create.store(unavailable, Ordering::SeqCst);
    }

    /// Make every subsequent `verify_signature` fail as if the gateway
    /// could not be reached.
    pub fn set_verification_unavailable(&self, unavailable: bool) {
        self.fail_verify.store(unavailable, Ordering::SeqCst);
    }

    /// Report every subsequent client payment as still processing.
    pub fn set_verification_in_flight(&self, in_flight: bool) {
        self.verify_in_flight.store(in_flight, Ordering::SeqCst);
    }

    /// Number of paid orders sent to the "gateway".
    pub fn orders_created(&self) -> usize {
        self.orders_created.load(Ordering::SeqCst)
    }

    pub fn sign_payment(order_id: &str, payment_id: &str) -> String {
        hmac_sha256_hex(FAKE_KEY_SECRET, format!("{}|{}", order_id, payment_id).as_bytes())
    }

    pub fn sign_webhook(body: &[u8]) -> String {
        hmac_sha256_hex(FAKE_WEBHOOK_SECRET, body)
    }

    /// A signed `payment.captured` body for `transaction_reference`.
    pub fn captured_webhook(transaction_reference: &str, payment_id: &str, amount: i64) -> (Vec<u8>, String) {
        let body = serde_json::json!({
            "event": "payment.captured",
            "payload": {"payment": {"entity": {
                "id": payment_id,
                "amount": amount,
                "notes": {"transaction_id": transaction_reference},
            }}},
        })
        .to_string()
        .into_bytes();
        let signature = Self::sign_webhook(&body);
        (body, signature)
    }

    pub fn failed_webhook(transaction_reference: &str, payment_id: &str, reason: &str) -> (Vec<u8>, String) {
        let body = serde_json::json!({
            "event": "payment.failed",
            "payload": {"payment": {"entity": {
                "id": payment_id,
                "notes": {"transaction_id": transaction_reference},
                "error_description": reason,
            }}},
        })
        .to_string()
        .into_bytes();
        let signature = Self::sign_webhook(&body);
        (body, signature)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    fn signature_header(&self) -> &'static str {
        super::razorpay::SIGNATURE_HEADER
    }

    fn public_key(&self) -> Option<String> {
        Some("fake_key_id".to_string())
    }

    async fn create_order(&self, final_amount: i64, _metadata: &OrderMetadata) -> Result<OrderRef> {
        if final_amount == 0 {
            return Ok(OrderRef::free("INR"));
        }

        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::GatewayUnavailable("fake gateway is down".to_string()));
        }

        let n = self.orders_created.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(OrderRef {
            gateway_order_id: format!("order_fake_{}", n),
            transaction_reference: Uuid::new_v4().to_string(),
            amount: final_amount,
            currency: "INR".to_string(),
            status: "created".to_string(),
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
        if self.fail_verify.load(Ordering::SeqCst) {
            return Err(AppError::GatewayUnavailable("fake gateway is down".to_string()));
        }

        if self.verify_in_flight.load(Ordering::SeqCst) {
            return Ok(PaymentVerification::Pending("processing".to_string()));
        }

        let message = format!("{}|{}", order_id, payment_id);
        if verify_hmac_sha256(FAKE_KEY_SECRET, message.as_bytes(), signature) {
            Ok(PaymentVerification::Verified)
        } else {
            Ok(PaymentVerification::Rejected("Signature verification failed".to_string()))
        }
    }

    fn parse_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookEvent> {
        if !verify_hmac_sha256(FAKE_WEBHOOK_SECRET, raw_body, signature) {
            return Err(AppError::InvalidWebhookSignature);
        }

        let payload: serde_json::Value = serde_json::from_slice(raw_body)
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
