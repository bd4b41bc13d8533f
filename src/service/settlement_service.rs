use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
    domain::{
        Actor, NewAuditRecord, Payment, PaymentStatus, PaymentTransition, PricingResult,
        RegistrationPaymentStatus, RegistrationStatus, RegistrationType,
    },
    error::{AppError, Result},
    notifications::{NotificationEvent, NotificationManager},
    payments::{
        OrderMetadata, OrderRef, PaymentGateway, PaymentVerification, WebhookEvent,
        WebhookEventKind,
    },
    repository::{EventRepository, PaymentRepository, RegistrationRepository},
    service::{
        audit_service::{self, AuditRecorder, EVENT_COUPON, STATUS_ANOMALY, STATUS_FAILURE, STATUS_SUCCESS},
        coupon_ledger::CouponLedger,
    },
};

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub registration_id: Uuid,
    pub registration_type: RegistrationType,
    pub event_id: Uuid,
    /// Undiscounted price in paise.
    pub amount: i64,
    pub coupon_code: Option<String>,
    pub actor: Actor,
}

/// A priced order with its pending payment, not yet persisted.
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub payment: Payment,
    pub order: OrderRef,
    pub pricing: Option<PricingResult>,
}

/// Evidence that a payment went through.
#[derive(Debug, Clone)]
pub enum ConfirmationProof {
    /// The triple the checkout widget hands back to the browser.
    Client {
        gateway_payment_id: String,
        signature: String,
    },
    /// A webhook whose signature has already been checked.
    Webhook(WebhookEvent),
    /// A zero-amount order.
    Free,
}

impl ConfirmationProof {
    fn source(&self) -> &'static str {
        match self {
            ConfirmationProof::Client { .. } => "client",
            ConfirmationProof::Webhook(_) => "webhook",
            ConfirmationProof::Free => "free",
        }
    }
}

#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// This delivery moved the payment to a terminal state, or found it
    /// settled by a concurrent caller.
    Settled(Payment),
    /// The payment was already terminal before this delivery.
    AlreadySettled(Payment),
    /// An event type we do not act on.
    Ignored(String),
    /// No payment carries the webhook's transaction reference.
    UnknownOrder(Option<String>),
}

/// Moves payments from `pending` to a terminal state exactly once, no
/// matter how many confirmations or webhook deliveries race for it.
pub struct SettlementEngine {
    payment_repo: Arc<dyn PaymentRepository>,
    registration_repo: Arc<dyn RegistrationRepository>,
    event_repo: Arc<dyn EventRepository>,
    ledger: Arc<CouponLedger>,
    gateway: Arc<dyn PaymentGateway>,
    audit: Arc<AuditRecorder>,
    notifications: Arc<NotificationManager>,
}

impl SettlementEngine {
    pub fn new(
        payment_repo: Arc<dyn PaymentRepository>,
        registration_repo: Arc<dyn RegistrationRepository>,
        event_repo: Arc<dyn EventRepository>,
        ledger: Arc<CouponLedger>,
        gateway: Arc<dyn PaymentGateway>,
        audit: Arc<AuditRecorder>,
        notifications: Arc<NotificationManager>,
    ) -> Self {
        Self {
            payment_repo,
            registration_repo,
            event_repo,
            ledger,
            gateway,
            audit,
            notifications,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    /// Price the request and open a gateway order. Nothing is persisted, so
    /// a coupon or gateway error leaves no trace.
    pub async fn quote(&self, request: &PaymentRequest) -> Result<InitiatedPayment> {
        if request.amount < 0 {
            return Err(AppError::BadRequest("Amount cannot be negative".to_string()));
        }

        let coupon_code = request.coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty());

        let pricing = match coupon_code {
            Some(code) => Some(
                self.ledger
                    .price(code, request.amount, request.event_id, request.registration_type)
                    .await?,
            ),
            None => None,
        };

        let discount_amount = pricing.as_ref().map(|p| p.discount_amount).unwrap_or(0);
        let final_amount = request.amount - discount_amount;

        let metadata = OrderMetadata {
            registration_id: request.registration_id,
            registration_type: request.registration_type,
            event_id: request.event_id,
        };
        let order = self.gateway.create_order(final_amount, &metadata).await?;

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            registration_id: request.registration_id,
            registration_type: request.registration_type,
            amount: request.amount,
            currency: order.currency.clone(),
            status: PaymentStatus::Pending,
            gateway: self.gateway.kind(),
            gateway_order_id: order.gateway_order_id.clone(),
            gateway_payment_id: None,
            gateway_signature: None,
            transaction_reference: order.transaction_reference.clone(),
            coupon_id: pricing.as_ref().map(|p| p.coupon_id),
            discount_amount,
            final_amount,
            error_message: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };

        Ok(InitiatedPayment { payment, order, pricing })
    }

    /// Bookkeeping once the pending payment is stored: audit it, and settle
    /// zero-amount orders on the spot.
    pub async fn record_initiated(&self, initiated: &InitiatedPayment, actor: &Actor) -> Result<Payment> {
        let payment = &initiated.payment;

        tracing::info!(
            "Payment {} initiated for {} registration {}: {} -> {} {}",
            payment.id,
            payment.registration_type,
            payment.registration_id,
            payment.amount,
            payment.final_amount,
            payment.currency
        );

        self.audit.payment("create", STATUS_SUCCESS, payment, actor).await;

        if payment.is_free() {
            return self
                .confirm(&payment.gateway_order_id, ConfirmationProof::Free, actor)
                .await;
        }

        Ok(payment.clone())
    }

    /// Start a new payment for an existing registration.
    pub async fn initiate(&self, request: PaymentRequest) -> Result<InitiatedPayment> {
        if self.payment_repo
            .find_pending_for_registration(request.registration_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "Registration already has a payment in progress".to_string(),
            ));
        }

        let mut initiated = self.quote(&request).await?;
        self.registration_repo.attach_payment(&initiated.payment).await?;

        initiated.payment = self.record_initiated(&initiated, &request.actor).await?;
        Ok(initiated)
    }

    /// Settle the payment behind `gateway_order_id`. Idempotent: a payment
    /// that is already terminal is returned unchanged.
    pub async fn confirm(
        &self,
        gateway_order_id: &str,
        proof: ConfirmationProof,
        actor: &Actor,
    ) -> Result<Payment> {
        let payment = self.find_by_order(gateway_order_id).await?;

        if payment.is_terminal() {
            tracing::debug!(
                "Payment {} already {}, ignoring {} confirmation",
                payment.id,
                payment.status.as_str(),
                proof.source()
            );
            return Ok(payment);
        }

        let source = proof.source();
        let verified = match &proof {
            ConfirmationProof::Client { gateway_payment_id, signature } => {
                match self.gateway
                    .verify_signature(gateway_order_id, gateway_payment_id, signature)
                    .await?
                {
                    PaymentVerification::Verified => {
                        Ok((Some(gateway_payment_id.clone()), Some(signature.clone())))
                    }
                    PaymentVerification::Rejected(reason) => {
                        Err((Some(gateway_payment_id.clone()), reason))
                    }
                    PaymentVerification::Pending(status) => {
                        tracing::info!(
                            "Payment {} is {} at the gateway, leaving it pending",
                            payment.id, status
                        );
                        return Ok(payment);
                    }
                }
            }
            ConfirmationProof::Webhook(event) => {
                if event.amount == Some(payment.final_amount) {
                    Ok((event.gateway_payment_id.clone(), None))
                } else {
                    Err((
                        event.gateway_payment_id.clone(),
                        format!(
                            "Webhook amount {:?} does not match expected {}",
                            event.amount, payment.final_amount
                        ),
                    ))
                }
            }
            ConfirmationProof::Free => {
                if payment.final_amount == 0 {
                    Ok((None, None))
                } else {
                    Err((None, "Payment is not free".to_string()))
                }
            }
        };

        let (gateway_payment_id, gateway_signature) = match verified {
            Ok(ids) => ids,
            Err((gateway_payment_id, reason)) => {
                tracing::warn!("Payment {} failed verification: {}", payment.id, reason);
                self.fail(&payment, gateway_payment_id, &reason, actor).await?;
                return Err(AppError::PaymentVerificationFailed(reason));
            }
        };

        let transition = PaymentTransition::Succeeded {
            gateway_payment_id,
            gateway_signature,
            paid_at: Utc::now(),
        };

        if !self.payment_repo.transition(payment.id, &transition).await? {
            tracing::debug!("Payment {} settled concurrently", payment.id);
            return self.get(payment.id).await;
        }

        let settled = self.get(payment.id).await?;
        tracing::info!(
            "Payment {} succeeded via {} ({} {})",
            settled.id, source, settled.final_amount, settled.currency
        );

        if let Some(coupon_id) = settled.coupon_id {
            self.redeem_coupon(&settled, coupon_id, actor).await;
        }

        self.mirror(
            &settled,
            RegistrationPaymentStatus::Success,
            Some(RegistrationStatus::Confirmed),
        )
        .await;

        self.audit
            .record(
                NewAuditRecord::new(audit_service::EVENT_PAYMENT, "confirm", STATUS_SUCCESS)
                    .actor(actor)
                    .resource("payment", settled.id)
                    .details(json!({
                        "source": source,
                        "payment": audit_service::payment_details(&settled),
                    })),
            )
            .await;

        self.notify_confirmed(&settled).await;

        Ok(settled)
    }

    /// Explicitly fail a pending payment, e.g. on a gateway failure event.
    pub async fn mark_failed(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: Option<String>,
        reason: &str,
        actor: &Actor,
    ) -> Result<Payment> {
        let payment = self.find_by_order(gateway_order_id).await?;

        if payment.is_terminal() {
            return Ok(payment);
        }

        self.fail(&payment, gateway_payment_id, reason, actor).await?;
        self.get(payment.id).await
    }

    /// Authenticate a gateway webhook and apply it. Redeliveries are no-ops.
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookOutcome> {
        let event = self.gateway.parse_webhook(raw_body, signature)?;
        let actor = Actor::system(&format!("webhook:{}", self.gateway.kind()));

        if event.kind == WebhookEventKind::Other {
            tracing::debug!("Ignoring webhook event {}", event.event_name);
            return Ok(WebhookOutcome::Ignored(event.event_name));
        }

        let payment = match &event.transaction_reference {
            Some(reference) => self.payment_repo.find_by_transaction_reference(reference).await?,
            None => None,
        };

        let Some(payment) = payment else {
            tracing::warn!(
                "Webhook {} for unknown transaction {:?}",
                event.event_name, event.transaction_reference
            );
            return Ok(WebhookOutcome::UnknownOrder(event.transaction_reference));
        };

        if payment.is_terminal() {
            tracing::debug!(
                "Webhook {} for already {} payment {}",
                event.event_name,
                payment.status.as_str(),
                payment.id
            );
            return Ok(WebhookOutcome::AlreadySettled(payment));
        }

        let order_id = payment.gateway_order_id.clone();
        let settled = match event.kind {
            WebhookEventKind::Captured => {
                match self.confirm(&order_id, ConfirmationProof::Webhook(event), &actor).await {
                    Ok(payment) => payment,
                    Err(AppError::PaymentVerificationFailed(_)) => self.get(payment.id).await?,
                    Err(e) => return Err(e),
                }
            }
            WebhookEventKind::Failed => {
                let reason = event.outcome
                    .clone()
                    .unwrap_or_else(|| "Payment failed at gateway".to_string());
                self.mark_failed(&order_id, event.gateway_payment_id.clone(), &reason, &actor)
                    .await?
            }
            WebhookEventKind::Other => return Ok(WebhookOutcome::Ignored(event.event_name)),
        };

        Ok(WebhookOutcome::Settled(settled))
    }

    pub async fn get(&self, id: Uuid) -> Result<Payment> {
        self.payment_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PaymentNotFound(id.to_string()))
    }

    pub async fn find_by_order(&self, gateway_order_id: &str) -> Result<Payment> {
        self.payment_repo
            .find_by_order_id(gateway_order_id)
            .await?
            .ok_or_else(|| AppError::PaymentNotFound(gateway_order_id.to_string()))
    }

    /// CAS to `failed`; side effects only for the caller that wins.
    async fn fail(
        &self,
        payment: &Payment,
        gateway_payment_id: Option<String>,
        reason: &str,
        actor: &Actor,
    ) -> Result<()> {
        let transition = PaymentTransition::Failed {
            gateway_payment_id,
            reason: reason.to_string(),
        };

        if !self.payment_repo.transition(payment.id, &transition).await? {
            return Ok(());
        }

        let failed = self.get(payment.id).await?;
        tracing::info!("Payment {} failed: {}", failed.id, reason);

        self.mirror(&failed, RegistrationPaymentStatus::Failed, None).await;
        self.audit.payment("fail", STATUS_FAILURE, &failed, actor).await;

        Ok(())
    }

    async fn redeem_coupon(&self, payment: &Payment, coupon_id: Uuid, actor: &Actor) {
        let record = match self.ledger.redeem(coupon_id).await {
            Ok(()) => NewAuditRecord::new(EVENT_COUPON, "redeem", STATUS_SUCCESS),
            Err(e) => {
                // The payment stands even when the coupon is over its cap.
                tracing::warn!(
                    "Coupon race anomaly: coupon {} could not be redeemed for payment {}: {}",
                    coupon_id, payment.id, e
                );
                NewAuditRecord::new(EVENT_COUPON, "redeem", STATUS_ANOMALY).error(e.to_string())
            }
        };

        self.audit
            .record(
                record
                    .actor(actor)
                    .resource("coupon", coupon_id)
                    .details(json!({
                        "payment_id": payment.id,
                        "discount_amount": payment.discount_amount,
                    })),
            )
            .await;
    }

    async fn mirror(
        &self,
        payment: &Payment,
        payment_status: RegistrationPaymentStatus,
        status: Option<RegistrationStatus>,
    ) {
        if let Err(e) = self.registration_repo
            .update_payment_status(
                payment.registration_type,
                payment.registration_id,
                payment_status,
                payment.id,
                status,
            )
            .await
        {
            tracing::error!(
                "Failed to mirror payment {} onto registration {}: {:?}",
                payment.id, payment.registration_id, e
            );
        }
    }

    async fn notify_confirmed(&self, payment: &Payment) {
        let registration = match self.registration_repo
            .find(payment.registration_type, payment.registration_id)
            .await
        {
            Ok(Some(registration)) => registration,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("Failed to load registration for notification: {:?}", e);
                return;
            }
        };

        let event_title = match self.event_repo.find_by_id(registration.event_id()).await {
            Ok(Some(event)) => event.title,
            _ => String::new(),
        };

        let notification = NotificationEvent::PaymentConfirmed {
            registration,
            event_title,
            payment: payment.clone(),
        };
        let deliveries = self.notifications.notify(&notification).await;
        self.audit.deliveries(&notification, &deliveries).await;
    }
}
