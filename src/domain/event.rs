use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub status: EventStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub max_participants: Option<i64>,
    pub is_free: bool,
    /// Fee in paise; ignored when `is_free` is set.
    pub registration_fee: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Amount a registration owes before any coupon.
    pub fn fee(&self) -> i64 {
        if self.is_free {
            0
        } else {
            self.registration_fee.max(0)
        }
    }

    pub fn is_open_for_registration(&self, now: DateTime<Utc>) -> bool {
        let status_open = matches!(self.status, EventStatus::Published | EventStatus::Ongoing);
        let before_deadline = self.registration_deadline.map(|d| now <= d).unwrap_or(true);
        status_open && before_deadline
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Published,
    Ongoing,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Published => "published",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(EventStatus::Draft),
            "published" => Some(EventStatus::Published),
            "ongoing" => Some(EventStatus::Ongoing),
            "completed" => Some(EventStatus::Completed),
            "cancelled" => Some(EventStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub slug: String,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub status: EventStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub registration_deadline: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub max_participants: Option<i64>,
    pub is_free: bool,
    #[validate(range(min = 0))]
    pub registration_fee: i64,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub slug: Option<String>,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub status: Option<EventStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub registration_deadline: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub max_participants: Option<i64>,
    pub is_free: Option<bool>,
    #[validate(range(min = 0))]
    pub registration_fee: Option<i64>,
}
