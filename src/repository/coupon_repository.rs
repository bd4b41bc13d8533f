use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Coupon, CouponApplicability, CreateCouponRequest, DiscountType},
    error::{AppError, Result},
    repository::CouponRepository,
};

#[derive(FromRow)]
struct CouponRow {
    id: String,
    event_id: Option<String>,
    code: String,
    description: Option<String>,
    discount_type: String,
    discount_value: i64,
    max_uses: Option<i64>,
    used_count: i64,
    valid_from: NaiveDateTime,
    valid_until: NaiveDateTime,
    is_active: i32,
    min_amount: Option<i64>,
    applicable_to: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const COUPON_COLUMNS: &str = r#"
    id, event_id, code, description, discount_type, discount_value,
    max_uses, used_count, valid_from, valid_until, is_active,
    min_amount, applicable_to, created_at, updated_at
"#;

pub struct SqliteCouponRepository {
    pool: SqlitePool,
}

impl SqliteCouponRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_coupon(row: CouponRow) -> Result<Coupon> {
        let event_id = row.event_id
            .as_ref()
            .map(|id| Uuid::parse_str(id))
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Coupon {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            event_id,
            code: row.code,
            description: row.description,
            discount_type: DiscountType::from_str(&row.discount_type).ok_or_else(|| {
                AppError::Database(format!("Invalid discount type: {}", row.discount_type))
            })?,
            discount_value: row.discount_value,
            max_uses: row.max_uses,
            used_count: row.used_count,
            valid_from: DateTime::from_naive_utc_and_offset(row.valid_from, Utc),
            valid_until: DateTime::from_naive_utc_and_offset(row.valid_until, Utc),
            is_active: row.is_active != 0,
            min_amount: row.min_amount,
            applicable_to: CouponApplicability::from_str(&row.applicable_to).ok_or_else(|| {
                AppError::Database(format!("Invalid coupon applicability: {}", row.applicable_to))
            })?,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }
}

#[async_trait]
impl CouponRepository for SqliteCouponRepository {
    async fn create(&self, request: CreateCouponRequest) -> Result<Coupon> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, event_id, code, description, discount_type, discount_value,
                max_uses, used_count, valid_from, valid_until, is_active,
                min_amount, applicable_to, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, 1, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(request.event_id.map(|id| id.to_string()))
        .bind(request.code.trim().to_uppercase())
        .bind(&request.description)
        .bind(request.discount_type.as_str())
        .bind(request.discount_value)
        .bind(request.max_uses)
        .bind(request.valid_from.naive_utc())
        .bind(request.valid_until.naive_utc())
        .bind(request.min_amount)
        .bind(request.applicable_to.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Coupon code '{}' already exists", request.code))
            }
            other => AppError::Database(other.to_string()),
        })?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created coupon".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Coupon>> {
        let sql = format!("SELECT {} FROM coupons WHERE id = ?", COUPON_COLUMNS);
        let row = sqlx::query_as::<_, CouponRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_coupon).transpose()
    }

    async fn find_active_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let sql = format!(
            "SELECT {} FROM coupons WHERE code = ? COLLATE NOCASE AND is_active = 1",
            COUPON_COLUMNS
        );
        let row = sqlx::query_as::<_, CouponRow>(&sql)
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_coupon).transpose()
    }

    async fn list(&self) -> Result<Vec<Coupon>> {
        let sql = format!("SELECT {} FROM coupons ORDER BY created_at DESC", COUPON_COLUMNS);
        let rows = sqlx::query_as::<_, CouponRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_coupon)
            .collect()
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE coupons SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(if active { 1i32 } else { 0i32 })
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Coupon not found".to_string()));
        }

        Ok(())
    }

    async fn try_increment_usage(&self, id: Uuid) -> Result<bool> {
        // Cap re-checked inside the UPDATE. `is_active` is not consulted:
        // a payment priced while the coupon was active keeps its discount.
        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET used_count = used_count + 1,
                updated_at = ?
            WHERE id = ?
              AND (max_uses IS NULL OR used_count < max_uses)
            "#
        )
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}
