use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RegistrationType;

/// One registration-payment attempt.
///
/// `final_amount` is fixed when the row is created and never recomputed,
/// and `status` leaves `pending` at most once, through
/// [`PaymentRepository::transition`](crate::repository::PaymentRepository::transition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub registration_type: RegistrationType,
    /// Amount in minor units (paise) before any discount.
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway: GatewayKind,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    /// Reference embedded in the gateway order's metadata; webhooks are
    /// matched back to the payment through it.
    pub transaction_reference: String,
    pub coupon_id: Option<Uuid>,
    pub discount_amount: i64,
    pub final_amount: i64,
    pub error_message: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_free(&self) -> bool {
        self.final_amount == 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "success" => Some(PaymentStatus::Success),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Razorpay,
    Stripe,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Razorpay => "razorpay",
            GatewayKind::Stripe => "stripe",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "razorpay" => Some(GatewayKind::Razorpay),
            "stripe" => Some(GatewayKind::Stripe),
            _ => None,
        }
    }
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal transition applied by a single compare-and-set on `status`.
#[derive(Debug, Clone)]
pub enum PaymentTransition {
    Succeeded {
        gateway_payment_id: Option<String>,
        gateway_signature: Option<String>,
        paid_at: DateTime<Utc>,
    },
    Failed {
        gateway_payment_id: Option<String>,
        reason: String,
    },
}

impl PaymentTransition {
    pub fn target(&self) -> PaymentStatus {
        match self {
            PaymentTransition::Succeeded { .. } => PaymentStatus::Success,
            PaymentTransition::Failed { .. } => PaymentStatus::Failed,
        }
    }
}
