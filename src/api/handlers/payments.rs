use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    api::{handlers::actor_from_headers, state::AppState},
    domain::{Payment, Registration, RegistrationType},
    error::{AppError, Result},
    service::{
        registration_service::RegistrationOutcome,
        settlement_service::{ConfirmationProof, WebhookOutcome},
    },
};

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub event_id: Uuid,
    pub registration_type: RegistrationType,
    /// Defaults to the event's registration fee.
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ValidateCouponResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub original_amount: i64,
    pub discount_amount: i64,
    pub final_amount: i64,
}

/// Pricing preview; nothing is reserved or redeemed.
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<ValidateCouponResponse>> {
    let amount = match request.amount {
        Some(amount) => amount,
        None => state.service_context.event_repo
            .find_by_id(request.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?
            .fee(),
    };

    let priced = state.service_context.coupon_ledger
        .price(&request.code, amount, request.event_id, request.registration_type)
        .await;

    let response = match priced {
        Ok(pricing) => ValidateCouponResponse {
            valid: true,
            error: None,
            coupon_id: Some(pricing.coupon_id),
            code: Some(pricing.code),
            original_amount: amount,
            discount_amount: pricing.discount_amount,
            final_amount: pricing.final_amount,
        },
        Err(AppError::Coupon(e)) => ValidateCouponResponse {
            valid: false,
            error: Some(e.to_string()),
            coupon_id: None,
            code: None,
            original_amount: amount,
            discount_amount: 0,
            final_amount: amount,
        },
        Err(e) => return Err(e),
    };

    Ok(Json(response))
}

/// What the checkout widget returns. Razorpay field names are accepted.
#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    #[serde(alias = "razorpay_order_id", alias = "payment_intent_id")]
    pub order_id: String,
    #[serde(alias = "razorpay_payment_id")]
    pub payment_id: String,
    #[serde(alias = "razorpay_signature", default)]
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmPaymentResponse {
    pub payment: Payment,
    pub registration: Option<Registration>,
}

pub async fn confirm(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ConfirmPaymentResponse>> {
    let actor = actor_from_headers(&headers);
    let payment = state.service_context.settlement
        .confirm(
            &request.order_id,
            ConfirmationProof::Client {
                gateway_payment_id: request.payment_id,
                signature: request.signature,
            },
            &actor,
        )
        .await?;

    let registration = state.service_context.registration_repo
        .find(payment.registration_type, payment.registration_id)
        .await?;

    Ok(Json(ConfirmPaymentResponse { payment, registration }))
}

#[derive(Debug, Deserialize)]
pub struct RetryPaymentRequest {
    pub registration_id: Uuid,
    pub registration_type: RegistrationType,
    pub coupon_code: Option<String>,
}

pub async fn retry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RetryPaymentRequest>,
) -> Result<Json<RegistrationOutcome>> {
    let actor = actor_from_headers(&headers);
    let outcome = state.service_context.registration_service
        .retry_payment(
            request.registration_type,
            request.registration_id,
            request.coupon_code,
            &actor,
        )
        .await?;

    Ok(Json(outcome))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>> {
    let payment = state.service_context.settlement.get(id).await?;
    Ok(Json(payment))
}

/// Gateway webhook. Anything short of a bad signature or an infrastructure
/// failure is acknowledged with 200 so the gateway stops redelivering.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let settlement = &state.service_context.settlement;
    let signature = headers
        .get(settlement.gateway().signature_header())
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let outcome = match settlement.handle_webhook(&body, signature).await {
        Ok(outcome) => outcome,
        Err(AppError::InvalidWebhookSignature) => {
            tracing::warn!("Rejected webhook with invalid signature");
            return Err(AppError::InvalidWebhookSignature);
        }
        Err(AppError::PaymentNotFound(order)) => {
            tracing::warn!("Webhook for unknown payment {}", order);
            return Ok(Json(json!({"status": "unknown_order"})));
        }
        Err(e) => return Err(e),
    };

    let body = match outcome {
        WebhookOutcome::Settled(payment) => json!({
            "status": "processed",
            "payment_id": payment.id,
            "payment_status": payment.status,
        }),
        WebhookOutcome::AlreadySettled(payment) => json!({
            "status": "already_processed",
            "payment_id": payment.id,
            "payment_status": payment.status,
        }),
        WebhookOutcome::Ignored(event) => json!({"status": "ignored", "event": event}),
        WebhookOutcome::UnknownOrder(_) => json!({"status": "unknown_order"}),
    };

    Ok(Json(body))
}
