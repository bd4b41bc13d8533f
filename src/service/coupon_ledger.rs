use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    domain::{Coupon, CouponError, PricingResult, RegistrationType},
    error::{AppError, Result},
    repository::CouponRepository,
};

/// Prices orders against coupons and records redemptions.
pub struct CouponLedger {
    repo: Arc<dyn CouponRepository>,
}

impl CouponLedger {
    pub fn new(repo: Arc<dyn CouponRepository>) -> Self {
        Self { repo }
    }

    /// Validate `code` for an order of `amount` paise. Read-only.
    pub async fn price(
        &self,
        code: &str,
        amount: i64,
        event_id: Uuid,
        registration_type: RegistrationType,
    ) -> Result<PricingResult> {
        let coupon = self.repo
            .find_active_by_code(code)
            .await?
            .ok_or(CouponError::NotFound)?;

        let pricing = coupon.price(amount, event_id, registration_type, Utc::now())?;

        tracing::debug!(
            "Coupon {} prices {} -> {} (discount {})",
            pricing.code, amount, pricing.final_amount, pricing.discount_amount
        );

        Ok(pricing)
    }

    /// Count one use of the coupon. The usage cap is enforced by the
    /// database, so concurrent redemptions cannot push it past `max_uses`.
    pub async fn redeem(&self, coupon_id: Uuid) -> Result<()> {
        if self.repo.try_increment_usage(coupon_id).await? {
            return Ok(());
        }

        match self.repo.find_by_id(coupon_id).await? {
            Some(_) => Err(AppError::Coupon(CouponError::Exhausted)),
            None => Err(AppError::Coupon(CouponError::NotFound)),
        }
    }

    pub async fn get(&self, coupon_id: Uuid) -> Result<Option<Coupon>> {
        self.repo.find_by_id(coupon_id).await
    }

    pub async fn list(&self) -> Result<Vec<Coupon>> {
        self.repo.list().await
    }
}
