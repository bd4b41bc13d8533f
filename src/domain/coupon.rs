use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RegistrationType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub event_id: Option<Uuid>,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Percentage points for `Percentage`, paise for `Fixed`.
    pub discount_value: i64,
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub min_amount: Option<i64>,
    pub applicable_to: CouponApplicability,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "percentage" => Some(DiscountType::Percentage),
            "fixed" => Some(DiscountType::Fixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CouponApplicability {
    All,
    Student,
    School,
}

impl CouponApplicability {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponApplicability::All => "all",
            CouponApplicability::Student => "student",
            CouponApplicability::School => "school",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(CouponApplicability::All),
            "student" => Some(CouponApplicability::Student),
            "school" => Some(CouponApplicability::School),
            _ => None,
        }
    }

    pub fn allows(&self, registration_type: RegistrationType) -> bool {
        match self {
            CouponApplicability::All => true,
            CouponApplicability::Student => registration_type == RegistrationType::Student,
            CouponApplicability::School => registration_type == RegistrationType::School,
        }
    }
}

/// Why a coupon cannot be applied. All of these are user-correctable and
/// surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponError {
    #[error("Invalid coupon code")]
    NotFound,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon usage limit reached")]
    Exhausted,
    #[error("Coupon not valid for this event")]
    EventMismatch,
    #[error("Minimum order amount ₹{} required", format_rupees(.min_amount))]
    BelowMinimum { min_amount: i64 },
    #[error("Coupon not applicable")]
    NotApplicable,
}

fn format_rupees(paise: &i64) -> String {
    format!("{}.{:02}", paise / 100, paise % 100)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingResult {
    pub coupon_id: Uuid,
    pub code: String,
    pub discount_amount: i64,
    pub final_amount: i64,
}

impl Coupon {
    /// Validate this coupon for an order and compute the discount.
    ///
    /// Checks run in a fixed order so the first failing constraint is the
    /// one reported. Usage exhaustion is checked here as a courtesy only;
    /// redemption re-checks it atomically.
    pub fn price(
        &self,
        amount: i64,
        event_id: Uuid,
        registration_type: RegistrationType,
        now: DateTime<Utc>,
    ) -> Result<PricingResult, CouponError> {
        if !self.is_active {
            return Err(CouponError::NotFound);
        }

        if now < self.valid_from || now > self.valid_until {
            return Err(CouponError::Expired);
        }

        if let Some(max_uses) = self.max_uses {
            if self.used_count >= max_uses {
                return Err(CouponError::Exhausted);
            }
        }

        if let Some(restricted_to) = self.event_id {
            if restricted_to != event_id {
                return Err(CouponError::EventMismatch);
            }
        }

        if let Some(min_amount) = self.min_amount {
            if amount < min_amount {
                return Err(CouponError::BelowMinimum { min_amount });
            }
        }

        if !self.applicable_to.allows(registration_type) {
            return Err(CouponError::NotApplicable);
        }

        let discount_amount = self.discount_for(amount);

        Ok(PricingResult {
            coupon_id: self.id,
            code: self.code.clone(),
            discount_amount,
            final_amount: amount - discount_amount,
        })
    }

    /// Discount in paise, never more than `amount` and never negative.
    pub fn discount_for(&self, amount: i64) -> i64 {
        let raw = match self.discount_type {
            DiscountType::Percentage => amount.saturating_mul(self.discount_value) / 100,
            DiscountType::Fixed => self.discount_value,
        };
        raw.clamp(0, amount.max(0))
    }
}

/// Administrative coupon creation (seeding and back-office tooling).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_uses: Option<i64>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub min_amount: Option<i64>,
    pub applicable_to: CouponApplicability,
    pub event_id: Option<Uuid>,
}
