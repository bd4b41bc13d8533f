use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{AuditQuery, AuditRecord, NewAuditRecord},
    error::{AppError, Result},
    repository::AuditRepository,
};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(FromRow)]
struct AuditRow {
    id: String,
    event_type: String,
    action: String,
    status: String,
    user_id: Option<String>,
    user_email: Option<String>,
    resource_type: Option<String>,
    resource_id: Option<String>,
    details: Option<String>,
    error_message: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    timestamp: NaiveDateTime,
}

pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: AuditRow) -> Result<AuditRecord> {
        let details = row.details
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Database(format!("Invalid audit details: {}", e)))?;

        Ok(AuditRecord {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            event_type: row.event_type,
            action: row.action,
            status: row.status,
            user_id: row.user_id,
            user_email: row.user_email,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            details,
            error_message: row.error_message,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            timestamp: DateTime::from_naive_utc_and_offset(row.timestamp, Utc),
        })
    }
}

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn append(&self, record: NewAuditRecord) -> Result<AuditRecord> {
        let id = Uuid::new_v4();
        let details = record.details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, event_type, action, status, user_id, user_email,
                resource_type, resource_id, details, error_message,
                ip_address, user_agent, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(&record.event_type)
        .bind(&record.action)
        .bind(&record.status)
        .bind(&record.actor.user_id)
        .bind(&record.actor.user_email)
        .bind(&record.resource_type)
        .bind(&record.resource_id)
        .bind(&details)
        .bind(&record.error_message)
        .bind(&record.actor.ip_address)
        .bind(&record.actor.user_agent)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let row = sqlx::query_as::<_, AuditRow>("SELECT * FROM audit_logs WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Self::row_to_record(row)
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM audit_logs WHERE 1 = 1");

        if let Some(event_type) = &query.event_type {
            builder.push(" AND event_type = ").push_bind(event_type);
        }
        if let Some(user_email) = &query.user_email {
            builder.push(" AND user_email = ").push_bind(user_email);
        }
        if let Some(resource_type) = &query.resource_type {
            builder.push(" AND resource_type = ").push_bind(resource_type);
        }
        if let Some(resource_id) = &query.resource_id {
            builder.push(" AND resource_id = ").push_bind(resource_id);
        }

        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        builder.push(" ORDER BY timestamp DESC LIMIT ").push_bind(limit);

        let rows = builder
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_record)
            .collect()
    }
}
