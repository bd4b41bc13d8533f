use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{CreateEventRequest, Event, EventStatus, UpdateEventRequest},
    error::{AppError, Result},
    repository::EventRepository,
};

#[derive(FromRow)]
struct EventRow {
    id: String,
    title: String,
    slug: String,
    tagline: Option<String>,
    description: Option<String>,
    status: String,
    start_date: Option<NaiveDateTime>,
    end_date: Option<NaiveDateTime>,
    registration_deadline: Option<NaiveDateTime>,
    max_participants: Option<i64>,
    is_free: i32,
    registration_fee: i64,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const EVENT_COLUMNS: &str = r#"
    id, title, slug, tagline, description, status, start_date, end_date,
    registration_deadline, max_participants, is_free, registration_fee,
    created_at, updated_at
"#;

fn map_write_error(slug: &str, e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::Conflict(format!("Event slug '{}' already exists", slug))
        }
        other => AppError::Database(other.to_string()),
    }
}

pub struct SqliteEventRepository {
    pool: SqlitePool,
}

impl SqliteEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_event(row: EventRow) -> Result<Event> {
        let utc = |dt: NaiveDateTime| DateTime::from_naive_utc_and_offset(dt, Utc);

        Ok(Event {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            title: row.title,
            slug: row.slug,
            tagline: row.tagline,
            description: row.description,
            status: EventStatus::from_str(&row.status)
                .ok_or_else(|| AppError::Database(format!("Invalid event status: {}", row.status)))?,
            start_date: row.start_date.map(utc),
            end_date: row.end_date.map(utc),
            registration_deadline: row.registration_deadline.map(utc),
            max_participants: row.max_participants,
            is_free: row.is_free != 0,
            registration_fee: row.registration_fee,
            created_at: utc(row.created_at),
            updated_at: utc(row.updated_at),
        })
    }
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn create(&self, request: CreateEventRequest) -> Result<Event> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO events (
                id, title, slug, tagline, description, status, start_date, end_date,
                registration_deadline, max_participants, is_free, registration_fee,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(&request.title)
        .bind(&request.slug)
        .bind(&request.tagline)
        .bind(&request.description)
        .bind(request.status.as_str())
        .bind(request.start_date.map(|dt| dt.naive_utc()))
        .bind(request.end_date.map(|dt| dt.naive_utc()))
        .bind(request.registration_deadline.map(|dt| dt.naive_utc()))
        .bind(request.max_participants)
        .bind(if request.is_free { 1i32 } else { 0i32 })
        .bind(request.registration_fee)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(&request.slug, e))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created event".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>> {
        let sql = format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS);
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_event).transpose()
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Event>> {
        let sql = format!("SELECT {} FROM events WHERE slug = ?", EVENT_COLUMNS);
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_event).transpose()
    }

    async fn list_published(&self) -> Result<Vec<Event>> {
        let sql = format!(
            r#"
            SELECT {} FROM events
            WHERE status IN ('published', 'ongoing')
            ORDER BY start_date ASC
            "#,
            EVENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_event)
            .collect()
    }

    async fn update(&self, id: Uuid, request: UpdateEventRequest) -> Result<Event> {
        let existing = self.find_by_id(id).await?.ok_or_else(|| {
            AppError::NotFound("Event not found".to_string())
        })?;

        let title = request.title.unwrap_or(existing.title);
        let slug = request.slug.unwrap_or(existing.slug);
        let tagline = request.tagline.or(existing.tagline);
        let description = request.description.or(existing.description);
        let status = request.status.unwrap_or(existing.status);
        let start_date = request.start_date.or(existing.start_date);
        let end_date = request.end_date.or(existing.end_date);
        let registration_deadline = request.registration_deadline.or(existing.registration_deadline);
        let max_participants = request.max_participants.or(existing.max_participants);
        let is_free = request.is_free.unwrap_or(existing.is_free);
        let registration_fee = request.registration_fee.unwrap_or(existing.registration_fee);

        sqlx::query(
            r#"
            UPDATE events
            SET title = ?, slug = ?, tagline = ?, description = ?, status = ?,
                start_date = ?, end_date = ?, registration_deadline = ?,
                max_participants = ?, is_free = ?, registration_fee = ?, updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(&title)
        .bind(&slug)
        .bind(&tagline)
        .bind(&description)
        .bind(status.as_str())
        .bind(start_date.map(|dt| dt.naive_utc()))
        .bind(end_date.map(|dt| dt.naive_utc()))
        .bind(registration_deadline.map(|dt| dt.naive_utc()))
        .bind(max_participants)
        .bind(if is_free { 1i32 } else { 0i32 })
        .bind(registration_fee)
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(&slug, e))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated event".to_string())
        })
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let id_str = id.to_string();

        let (registrations,): (i64,) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM student_registrations WHERE event_id = ?)
                 + (SELECT COUNT(*) FROM school_registrations WHERE event_id = ?)
            "#
        )
        .bind(&id_str)
        .bind(&id_str)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if registrations > 0 {
            return Err(AppError::Conflict(format!(
                "Event has {} registrations and cannot be deleted",
                registrations
            )));
        }

        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(&id_str)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    AppError::Conflict("Event still has coupons attached".to_string())
                }
                other => AppError::Database(other.to_string()),
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Event not found".to_string()));
        }

        Ok(())
    }
}
