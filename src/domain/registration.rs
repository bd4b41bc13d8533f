use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::PaymentStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationType {
    Student,
    School,
}

impl RegistrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationType::Student => "student",
            RegistrationType::School => "school",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "student" => Some(RegistrationType::Student),
            "school" => Some(RegistrationType::School),
            _ => None,
        }
    }

    /// Prefix for the human-facing registration code.
    pub fn code_prefix(&self) -> &'static str {
        match self {
            RegistrationType::Student => "STU",
            RegistrationType::School => "SCH",
        }
    }
}

impl std::fmt::Display for RegistrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(RegistrationStatus::Pending),
            "confirmed" => Some(RegistrationStatus::Confirmed),
            "cancelled" => Some(RegistrationStatus::Cancelled),
            _ => None,
        }
    }
}

/// Read-optimized mirror of the latest payment's status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPaymentStatus {
    NotRequired,
    Pending,
    Success,
    Failed,
    Refunded,
}

impl RegistrationPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationPaymentStatus::NotRequired => "not_required",
            RegistrationPaymentStatus::Pending => "pending",
            RegistrationPaymentStatus::Success => "success",
            RegistrationPaymentStatus::Failed => "failed",
            RegistrationPaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "not_required" => Some(RegistrationPaymentStatus::NotRequired),
            "pending" => Some(RegistrationPaymentStatus::Pending),
            "success" => Some(RegistrationPaymentStatus::Success),
            "failed" => Some(RegistrationPaymentStatus::Failed),
            "refunded" => Some(RegistrationPaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl From<PaymentStatus> for RegistrationPaymentStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => RegistrationPaymentStatus::Pending,
            PaymentStatus::Success => RegistrationPaymentStatus::Success,
            PaymentStatus::Failed => RegistrationPaymentStatus::Failed,
            PaymentStatus::Refunded => RegistrationPaymentStatus::Refunded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRegistration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub school_id: Option<Uuid>,
    pub full_name: String,
    pub email: String,
    pub mobile: String,
    pub school_name: String,
    pub grade: String,
    pub registration_code: String,
    pub status: RegistrationStatus,
    pub payment_status: RegistrationPaymentStatus,
    pub payment_id: Option<Uuid>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolRegistration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub school_name: String,
    pub contact_person_name: String,
    pub contact_email: String,
    pub contact_mobile: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub registration_code: String,
    pub status: RegistrationStatus,
    pub payment_status: RegistrationPaymentStatus,
    pub payment_id: Option<Uuid>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Either kind of registration, for code that only needs the contact and
/// settlement fields.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "registration_type", rename_all = "lowercase")]
pub enum Registration {
    Student(StudentRegistration),
    School(SchoolRegistration),
}

impl Registration {
    pub fn id(&self) -> Uuid {
        match self {
            Registration::Student(r) => r.id,
            Registration::School(r) => r.id,
        }
    }

    pub fn registration_type(&self) -> RegistrationType {
        match self {
            Registration::Student(_) => RegistrationType::Student,
            Registration::School(_) => RegistrationType::School,
        }
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            Registration::Student(r) => r.event_id,
            Registration::School(r) => r.event_id,
        }
    }

    pub fn registration_code(&self) -> &str {
        match self {
            Registration::Student(r) => &r.registration_code,
            Registration::School(r) => &r.registration_code,
        }
    }

    pub fn payment_status(&self) -> RegistrationPaymentStatus {
        match self {
            Registration::Student(r) => r.payment_status,
            Registration::School(r) => r.payment_status,
        }
    }

    pub fn status(&self) -> RegistrationStatus {
        match self {
            Registration::Student(r) => r.status,
            Registration::School(r) => r.status,
        }
    }

    pub fn contact_name(&self) -> &str {
        match self {
            Registration::Student(r) => &r.full_name,
            Registration::School(r) => &r.contact_person_name,
        }
    }

    pub fn contact_email(&self) -> &str {
        match self {
            Registration::Student(r) => &r.email,
            Registration::School(r) => &r.contact_email,
        }
    }

    pub fn contact_mobile(&self) -> &str {
        match self {
            Registration::Student(r) => &r.mobile,
            Registration::School(r) => &r.contact_mobile,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateStudentRegistrationRequest {
    pub event_id: Uuid,
    pub school_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 10, max = 20))]
    pub mobile: String,
    #[validate(length(min = 1, max = 500))]
    pub school_name: String,
    #[validate(length(min = 1, max = 50))]
    pub grade: String,
    #[validate(length(min = 1, max = 50))]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSchoolRegistrationRequest {
    pub event_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub school_name: String,
    #[validate(length(min = 1, max = 255))]
    pub contact_person_name: String,
    #[validate(email)]
    pub contact_email: String,
    #[validate(length(min = 10, max = 20))]
    pub contact_mobile: String,
    #[validate(length(max = 255))]
    pub city: Option<String>,
    #[validate(length(max = 255))]
    pub state: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub coupon_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_mirror() {
        assert_eq!(
            RegistrationPaymentStatus::from(PaymentStatus::Success),
            RegistrationPaymentStatus::Success
        );
        assert_eq!(
            RegistrationPaymentStatus::from(PaymentStatus::Failed).as_str(),
            "failed"
        );
    }

    #[test]
    fn test_student_request_validation() {
        let request = CreateStudentRegistrationRequest {
            event_id: Uuid::new_v4(),
            school_id: None,
            full_name: "Asha Rao".to_string(),
            email: "not-an-email".to_string(),
            mobile: "+919876543210".to_string(),
            school_name: "DPS".to_string(),
            grade: "10".to_string(),
            coupon_code: None,
        };
        assert!(request.validate().is_err());

        let request = CreateStudentRegistrationRequest {
            email: "asha@example.com".to_string(),
            ..request
        };
        assert!(request.validate().is_ok());
    }
}
