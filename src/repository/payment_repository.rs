use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{GatewayKind, Payment, PaymentStatus, PaymentTransition, RegistrationType},
    error::{AppError, Result},
    repository::PaymentRepository,
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    registration_id: String,
    registration_type: String,
    amount: i64,
    currency: String,
    status: String,
    gateway: String,
    gateway_order_id: String,
    gateway_payment_id: Option<String>,
    gateway_signature: Option<String>,
    transaction_reference: String,
    coupon_id: Option<String>,
    discount_amount: i64,
    final_amount: i64,
    error_message: Option<String>,
    paid_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const PAYMENT_COLUMNS: &str = r#"
    id, registration_id, registration_type, amount, currency, status,
    gateway, gateway_order_id, gateway_payment_id, gateway_signature,
    transaction_reference, coupon_id, discount_amount, final_amount,
    error_message, paid_at, created_at, updated_at
"#;

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        let coupon_id = row.coupon_id
            .as_ref()
            .map(|id| Uuid::parse_str(id))
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Payment {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            registration_id: Uuid::parse_str(&row.registration_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            registration_type: RegistrationType::from_str(&row.registration_type).ok_or_else(|| {
                AppError::Database(format!("Invalid registration type: {}", row.registration_type))
            })?,
            amount: row.amount,
            currency: row.currency,
            status: PaymentStatus::from_str(&row.status)
                .ok_or_else(|| AppError::Database(format!("Invalid payment status: {}", row.status)))?,
            gateway: GatewayKind::from_str(&row.gateway)
                .ok_or_else(|| AppError::Database(format!("Invalid gateway: {}", row.gateway)))?,
            gateway_order_id: row.gateway_order_id,
            gateway_payment_id: row.gateway_payment_id,
            gateway_signature: row.gateway_signature,
            transaction_reference: row.transaction_reference,
            coupon_id,
            discount_amount: row.discount_amount,
            final_amount: row.final_amount,
            error_message: row.error_message,
            paid_at: row.paid_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE {} = ?", PAYMENT_COLUMNS, column);
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payment).transpose()
    }
}

/// Insert a payment row inside a registration write's transaction.
pub(crate) async fn insert_payment<'e, E>(executor: E, payment: &Payment) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, registration_id, registration_type, amount, currency, status,
            gateway, gateway_order_id, gateway_payment_id, gateway_signature,
            transaction_reference, coupon_id, discount_amount, final_amount,
            error_message, paid_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    )
    .bind(payment.id.to_string())
    .bind(payment.registration_id.to_string())
    .bind(payment.registration_type.as_str())
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(payment.status.as_str())
    .bind(payment.gateway.as_str())
    .bind(&payment.gateway_order_id)
    .bind(&payment.gateway_payment_id)
    .bind(&payment.gateway_signature)
    .bind(&payment.transaction_reference)
    .bind(payment.coupon_id.map(|id| id.to_string()))
    .bind(payment.discount_amount)
    .bind(payment.final_amount)
    .bind(&payment.error_message)
    .bind(payment.paid_at.map(|dt| dt.naive_utc()))
    .bind(payment.created_at.naive_utc())
    .bind(payment.updated_at.naive_utc())
    .execute(executor)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::Conflict(
            "Registration already has a payment in progress".to_string(),
        ),
        other => AppError::Database(other.to_string()),
    })?;

    Ok(())
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        self.find_one("id", &id.to_string()).await
    }

    async fn find_by_order_id(&self, gateway_order_id: &str) -> Result<Option<Payment>> {
        self.find_one("gateway_order_id", gateway_order_id).await
    }

    async fn find_by_transaction_reference(&self, reference: &str) -> Result<Option<Payment>> {
        self.find_one("transaction_reference", reference).await
    }

    async fn find_pending_for_registration(&self, registration_id: Uuid) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE registration_id = ? AND status = 'pending'",
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(registration_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn list_for_registration(&self, registration_id: Uuid) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE registration_id = ? ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(registration_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_payment)
            .collect()
    }

    async fn transition(&self, id: Uuid, transition: &PaymentTransition) -> Result<bool> {
        let now = Utc::now().naive_utc();

        // The `status = 'pending'` guard makes this a compare-and-set: of
        // any number of concurrent callers exactly one sees a row updated.
        let result = match transition {
            PaymentTransition::Succeeded { gateway_payment_id, gateway_signature, paid_at } => {
                sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = 'success',
                        gateway_payment_id = COALESCE(?, gateway_payment_id),
                        gateway_signature = COALESCE(?, gateway_signature),
                        paid_at = ?,
                        error_message = NULL,
                        updated_at = ?
                    WHERE id = ? AND status = 'pending'
                    "#
                )
                .bind(gateway_payment_id)
                .bind(gateway_signature)
                .bind(paid_at.naive_utc())
                .bind(now)
                .bind(id.to_string())
                .execute(&self.pool)
                .await
            }
            PaymentTransition::Failed { gateway_payment_id, reason } => {
                sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = 'failed',
                        gateway_payment_id = COALESCE(?, gateway_payment_id),
                        error_message = ?,
                        updated_at = ?
                    WHERE id = ? AND status = 'pending'
                    "#
                )
                .bind(gateway_payment_id)
                .bind(reason)
                .bind(now)
                .bind(id.to_string())
                .execute(&self.pool)
                .await
            }
        }
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}
