use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::*;
use crate::error::Result;

pub mod audit_repository;
pub mod coupon_repository;
pub mod event_repository;
pub mod payment_repository;
pub mod registration_repository;

pub use audit_repository::SqliteAuditRepository;
pub use coupon_repository::SqliteCouponRepository;
pub use event_repository::SqliteEventRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use registration_repository::SqliteRegistrationRepository;

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn create(&self, event: CreateEventRequest) -> Result<Event>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Event>>;
    async fn list_published(&self) -> Result<Vec<Event>>;
    async fn update(&self, id: Uuid, request: UpdateEventRequest) -> Result<Event>;
    /// Refuses with `Conflict` while registrations or coupons still point at
    /// the event.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// Insert the registration and, when given, its first payment in one
    /// transaction.
    async fn create_student(
        &self,
        registration: StudentRegistration,
        payment: Option<&Payment>,
    ) -> Result<StudentRegistration>;
    async fn create_school(
        &self,
        registration: SchoolRegistration,
        payment: Option<&Payment>,
    ) -> Result<SchoolRegistration>;
    async fn find(&self, registration_type: RegistrationType, id: Uuid) -> Result<Option<Registration>>;
    async fn find_student_by_email(&self, event_id: Uuid, email: &str) -> Result<Option<StudentRegistration>>;
    async fn find_school_by_email(&self, event_id: Uuid, email: &str) -> Result<Option<SchoolRegistration>>;
    async fn list_students(&self, event_id: Uuid, limit: i64, offset: i64) -> Result<Vec<StudentRegistration>>;
    async fn update_payment_status(
        &self,
        registration_type: RegistrationType,
        id: Uuid,
        payment_status: RegistrationPaymentStatus,
        payment_id: Uuid,
        status: Option<RegistrationStatus>,
    ) -> Result<()>;
    /// Insert a new pending payment and point the registration at it in one
    /// transaction; neither write survives without the other.
    async fn attach_payment(&self, payment: &Payment) -> Result<()>;
}

/// Payments are never deleted, and leave `pending` only through `transition`.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_order_id(&self, gateway_order_id: &str) -> Result<Option<Payment>>;
    async fn find_by_transaction_reference(&self, reference: &str) -> Result<Option<Payment>>;
    async fn find_pending_for_registration(&self, registration_id: Uuid) -> Result<Option<Payment>>;
    async fn list_for_registration(&self, registration_id: Uuid) -> Result<Vec<Payment>>;
    /// Move a pending payment to a terminal state. Returns `true` only for
    /// the caller whose update took effect.
    async fn transition(&self, id: Uuid, transition: &PaymentTransition) -> Result<bool>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn create(&self, coupon: CreateCouponRequest) -> Result<Coupon>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Coupon>>;
    async fn find_active_by_code(&self, code: &str) -> Result<Option<Coupon>>;
    async fn list(&self) -> Result<Vec<Coupon>>;
    async fn set_active(&self, id: Uuid, active: bool) -> Result<()>;
    /// Increment `used_count` unless it would exceed `max_uses`.
    async fn try_increment_usage(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, record: NewAuditRecord) -> Result<AuditRecord>;
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>>;
}
