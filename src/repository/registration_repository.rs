use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{
        Payment, Registration, RegistrationPaymentStatus, RegistrationStatus, RegistrationType,
        SchoolRegistration, StudentRegistration,
    },
    error::{AppError, Result},
    repository::{payment_repository::insert_payment, RegistrationRepository},
};

#[derive(FromRow)]
struct StudentRow {
    id: String,
    event_id: String,
    school_id: Option<String>,
    full_name: String,
    email: String,
    mobile: String,
    school_name: String,
    grade: String,
    registration_code: String,
    status: String,
    payment_status: String,
    payment_id: Option<String>,
    registered_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct SchoolRow {
    id: String,
    event_id: String,
    school_name: String,
    contact_person_name: String,
    contact_email: String,
    contact_mobile: String,
    city: Option<String>,
    state: Option<String>,
    registration_code: String,
    status: String,
    payment_status: String,
    payment_id: Option<String>,
    registered_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const STUDENT_COLUMNS: &str = r#"
    id, event_id, school_id, full_name, email, mobile, school_name, grade,
    registration_code, status, payment_status, payment_id, registered_at, updated_at
"#;

const SCHOOL_COLUMNS: &str = r#"
    id, event_id, school_name, contact_person_name, contact_email, contact_mobile,
    city, state, registration_code, status, payment_status, payment_id,
    registered_at, updated_at
"#;

pub struct SqliteRegistrationRepository {
    pool: SqlitePool,
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))
}

fn parse_optional_uuid(s: Option<&String>) -> Result<Option<Uuid>> {
    s.map(|id| parse_uuid(id)).transpose()
}

fn parse_status(s: &str) -> Result<RegistrationStatus> {
    RegistrationStatus::from_str(s)
        .ok_or_else(|| AppError::Database(format!("Invalid registration status: {}", s)))
}

fn parse_payment_status(s: &str) -> Result<RegistrationPaymentStatus> {
    RegistrationPaymentStatus::from_str(s)
        .ok_or_else(|| AppError::Database(format!("Invalid payment status: {}", s)))
}

fn table_for(registration_type: RegistrationType) -> &'static str {
    match registration_type {
        RegistrationType::Student => "student_registrations",
        RegistrationType::School => "school_registrations",
    }
}

fn map_insert_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::Conflict("Already registered for this event".to_string())
        }
        other => AppError::Database(other.to_string()),
    }
}

impl SqliteRegistrationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_student(row: StudentRow) -> Result<StudentRegistration> {
        Ok(StudentRegistration {
            id: parse_uuid(&row.id)?,
            event_id: parse_uuid(&row.event_id)?,
            school_id: parse_optional_uuid(row.school_id.as_ref())?,
            full_name: row.full_name,
            email: row.email,
            mobile: row.mobile,
            school_name: row.school_name,
            grade: row.grade,
            registration_code: row.registration_code,
            status: parse_status(&row.status)?,
            payment_status: parse_payment_status(&row.payment_status)?,
            payment_id: parse_optional_uuid(row.payment_id.as_ref())?,
            registered_at: DateTime::from_naive_utc_and_offset(row.registered_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn row_to_school(row: SchoolRow) -> Result<SchoolRegistration> {
        Ok(SchoolRegistration {
            id: parse_uuid(&row.id)?,
            event_id: parse_uuid(&row.event_id)?,
            school_name: row.school_name,
            contact_person_name: row.contact_person_name,
            contact_email: row.contact_email,
            contact_mobile: row.contact_mobile,
            city: row.city,
            state: row.state,
            registration_code: row.registration_code,
            status: parse_status(&row.status)?,
            payment_status: parse_payment_status(&row.payment_status)?,
            payment_id: parse_optional_uuid(row.payment_id.as_ref())?,
            registered_at: DateTime::from_naive_utc_and_offset(row.registered_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<StudentRegistration>> {
        let sql = format!("SELECT {} FROM student_registrations WHERE id = ?", STUDENT_COLUMNS);
        let row = sqlx::query_as::<_, StudentRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_student).transpose()
    }

    async fn find_school(&self, id: Uuid) -> Result<Option<SchoolRegistration>> {
        let sql = format!("SELECT {} FROM school_registrations WHERE id = ?", SCHOOL_COLUMNS);
        let row = sqlx::query_as::<_, SchoolRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_school).transpose()
    }
}

#[async_trait]
impl RegistrationRepository for SqliteRegistrationRepository {
    async fn create_student(
        &self,
        registration: StudentRegistration,
        payment: Option<&Payment>,
    ) -> Result<StudentRegistration> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO student_registrations (
                id, event_id, school_id, full_name, email, mobile, school_name, grade,
                registration_code, status, payment_status, payment_id, registered_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(registration.id.to_string())
        .bind(registration.event_id.to_string())
        .bind(registration.school_id.map(|id| id.to_string()))
        .bind(&registration.full_name)
        .bind(&registration.email)
        .bind(&registration.mobile)
        .bind(&registration.school_name)
        .bind(&registration.grade)
        .bind(&registration.registration_code)
        .bind(registration.status.as_str())
        .bind(registration.payment_status.as_str())
        .bind(registration.payment_id.map(|id| id.to_string()))
        .bind(registration.registered_at.naive_utc())
        .bind(registration.updated_at.naive_utc())
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        if let Some(payment) = payment {
            insert_payment(&mut *tx, payment).await?;
        }

        tx.commit().await?;

        self.find_student(registration.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created registration".to_string())
        })
    }

    async fn create_school(
        &self,
        registration: SchoolRegistration,
        payment: Option<&Payment>,
    ) -> Result<SchoolRegistration> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO school_registrations (
                id, event_id, school_name, contact_person_name, contact_email, contact_mobile,
                city, state, registration_code, status, payment_status, payment_id,
                registered_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(registration.id.to_string())
        .bind(registration.event_id.to_string())
        .bind(&registration.school_name)
        .bind(&registration.contact_person_name)
        .bind(&registration.contact_email)
        .bind(&registration.contact_mobile)
        .bind(&registration.city)
        .bind(&registration.state)
        .bind(&registration.registration_code)
        .bind(registration.status.as_str())
        .bind(registration.payment_status.as_str())
        .bind(registration.payment_id.map(|id| id.to_string()))
        .bind(registration.registered_at.naive_utc())
        .bind(registration.updated_at.naive_utc())
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        if let Some(payment) = payment {
            insert_payment(&mut *tx, payment).await?;
        }

        tx.commit().await?;

        self.find_school(registration.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created registration".to_string())
        })
    }

    async fn find(&self, registration_type: RegistrationType, id: Uuid) -> Result<Option<Registration>> {
        match registration_type {
            RegistrationType::Student => Ok(self.find_student(id).await?.map(Registration::Student)),
            RegistrationType::School => Ok(self.find_school(id).await?.map(Registration::School)),
        }
    }

    async fn find_student_by_email(&self, event_id: Uuid, email: &str) -> Result<Option<StudentRegistration>> {
        let sql = format!(
            "SELECT {} FROM student_registrations WHERE event_id = ? AND email = ? COLLATE NOCASE",
            STUDENT_COLUMNS
        );
        let row = sqlx::query_as::<_, StudentRow>(&sql)
            .bind(event_id.to_string())
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_student).transpose()
    }

    async fn find_school_by_email(&self, event_id: Uuid, email: &str) -> Result<Option<SchoolRegistration>> {
        let sql = format!(
            "SELECT {} FROM school_registrations WHERE event_id = ? AND contact_email = ? COLLATE NOCASE",
            SCHOOL_COLUMNS
        );
        let row = sqlx::query_as::<_, SchoolRow>(&sql)
            .bind(event_id.to_string())
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_school).transpose()
    }

    async fn list_students(&self, event_id: Uuid, limit: i64, offset: i64) -> Result<Vec<StudentRegistration>> {
        let sql = format!(
            r#"
            SELECT {} FROM student_registrations
            WHERE event_id = ?
            ORDER BY registered_at DESC
            LIMIT ? OFFSET ?
            "#,
            STUDENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, StudentRow>(&sql)
            .bind(event_id.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_student)
            .collect()
    }

    async fn update_payment_status(
        &self,
        registration_type: RegistrationType,
        id: Uuid,
        payment_status: RegistrationPaymentStatus,
        payment_id: Uuid,
        status: Option<RegistrationStatus>,
    ) -> Result<()> {
        let sql = format!(
            r#"
            UPDATE {}
            SET payment_status = ?,
                payment_id = ?,
                status = COALESCE(?, status),
                updated_at = ?
            WHERE id = ?
            "#,
            table_for(registration_type)
        );

        let result = sqlx::query(&sql)
            .bind(payment_status.as_str())
            .bind(payment_id.to_string())
            .bind(status.map(|s| s.as_str()))
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("{} registration {} not found", registration_type, id)));
        }

        Ok(())
    }

    async fn attach_payment(&self, payment: &Payment) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        insert_payment(&mut *tx, payment).await?;

        let sql = format!(
            "UPDATE {} SET payment_status = ?, payment_id = ?, updated_at = ? WHERE id = ?",
            table_for(payment.registration_type)
        );
        let result = sqlx::query(&sql)
            .bind(RegistrationPaymentStatus::Pending.as_str())
            .bind(payment.id.to_string())
            .bind(Utc::now().naive_utc())
            .bind(payment.registration_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "{} registration {} not found",
                payment.registration_type, payment.registration_id
            )));
        }

        tx.commit().await?;
        Ok(())
    }
}
