use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::*,
    error::{AppError, Result},
    notifications::{NotificationEvent, NotificationManager},
    payments::OrderRef,
    repository::{EventRepository, RegistrationRepository},
    service::{
        audit_service::{AuditRecorder, EVENT_REGISTRATION, STATUS_SUCCESS},
        settlement_service::{PaymentRequest, SettlementEngine},
    },
};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 8;

/// `STU-XXXXXXXX` / `SCH-XXXXXXXX`.
pub fn generate_registration_code(registration_type: RegistrationType) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", registration_type.code_prefix(), suffix)
}

/// What the client needs to finish a registration: the stored record and,
/// for paid events, the order to hand to the checkout widget.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
    pub registration: Registration,
    pub payment: Option<Payment>,
    pub order: Option<OrderRef>,
    pub gateway: Option<GatewayKind>,
    pub gateway_key: Option<String>,
}

pub struct RegistrationService {
    registration_repo: Arc<dyn RegistrationRepository>,
    event_repo: Arc<dyn EventRepository>,
    settlement: Arc<SettlementEngine>,
    audit: Arc<AuditRecorder>,
    notifications: Arc<NotificationManager>,
}

impl RegistrationService {
    pub fn new(
        registration_repo: Arc<dyn RegistrationRepository>,
        event_repo: Arc<dyn EventRepository>,
        settlement: Arc<SettlementEngine>,
        audit: Arc<AuditRecorder>,
        notifications: Arc<NotificationManager>,
    ) -> Self {
        Self {
            registration_repo,
            event_repo,
            settlement,
            audit,
            notifications,
        }
    }

    async fn open_event(&self, event_id: Uuid) -> Result<Event> {
        let event = self.event_repo
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        if !event.is_open_for_registration(Utc::now()) {
            return Err(AppError::BadRequest("Registration is closed for this event".to_string()));
        }

        Ok(event)
    }

    pub async fn register_student(
        &self,
        request: CreateStudentRegistrationRequest,
        actor: &Actor,
    ) -> Result<RegistrationOutcome> {
        request.validate()?;
        let event = self.open_event(request.event_id).await?;

        if self.registration_repo
            .find_student_by_email(event.id, &request.email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Already registered for this event".to_string()));
        }

        let now = Utc::now();
        let mut registration = StudentRegistration {
            id: Uuid::new_v4(),
            event_id: event.id,
            school_id: request.school_id,
            full_name: request.full_name.trim().to_string(),
            email: request.email.trim().to_lowercase(),
            mobile: request.mobile.trim().to_string(),
            school_name: request.school_name.trim().to_string(),
            grade: request.grade.trim().to_string(),
            registration_code: generate_registration_code(RegistrationType::Student),
            status: RegistrationStatus::Confirmed,
            payment_status: RegistrationPaymentStatus::NotRequired,
            payment_id: None,
            registered_at: now,
            updated_at: now,
        };

        if event.fee() == 0 {
            let created = self.registration_repo.create_student(registration, None).await?;
            return self.finish(Registration::Student(created), &event, None, actor).await;
        }

        let initiated = self.settlement
            .quote(&PaymentRequest {
                registration_id: registration.id,
                registration_type: RegistrationType::Student,
                event_id: event.id,
                amount: event.fee(),
                coupon_code: request.coupon_code,
                actor: actor.clone(),
            })
            .await?;

        registration.status = RegistrationStatus::Pending;
        registration.payment_status = RegistrationPaymentStatus::Pending;
        registration.payment_id = Some(initiated.payment.id);

        let created = self.registration_repo
            .create_student(registration, Some(&initiated.payment))
            .await?;

        let payment = self.settlement.record_initiated(&initiated, actor).await?;
        let order = (!initiated.order.is_free).then(|| initiated.order.clone());

        self.finish(Registration::Student(created), &event, Some((payment, order)), actor)
            .await
    }

    pub async fn register_school(
        &self,
        request: CreateSchoolRegistrationRequest,
        actor: &Actor,
    ) -> Result<RegistrationOutcome> {
        request.validate()?;
        let event = self.open_event(request.event_id).await?;

        if self.registration_repo
            .find_school_by_email(event.id, &request.contact_email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Already registered for this event".to_string()));
        }

        let now = Utc::now();
        let mut registration = SchoolRegistration {
            id: Uuid::new_v4(),
            event_id: event.id,
            school_name: request.school_name.trim().to_string(),
            contact_person_name: request.contact_person_name.trim().to_string(),
            contact_email: request.contact_email.trim().to_lowercase(),
            contact_mobile: request.contact_mobile.trim().to_string(),
            city: request.city,
            state: request.state,
            registration_code: generate_registration_code(RegistrationType::School),
            status: RegistrationStatus::Confirmed,
            payment_status: RegistrationPaymentStatus::NotRequired,
            payment_id: None,
            registered_at: now,
            updated_at: now,
        };

        if event.fee() == 0 {
            let created = self.registration_repo.create_school(registration, None).await?;
            return self.finish(Registration::School(created), &event, None, actor).await;
        }

        let initiated = self.settlement
            .quote(&PaymentRequest {
                registration_id: registration.id,
                registration_type: RegistrationType::School,
                event_id: event.id,
                amount: event.fee(),
                coupon_code: request.coupon_code,
                actor: actor.clone(),
            })
            .await?;

        registration.status = RegistrationStatus::Pending;
        registration.payment_status = RegistrationPaymentStatus::Pending;
        registration.payment_id = Some(initiated.payment.id);

        let created = self.registration_repo
            .create_school(registration, Some(&initiated.payment))
            .await?;

        let payment = self.settlement.record_initiated(&initiated, actor).await?;
        let order = (!initiated.order.is_free).then(|| initiated.order.clone());

        self.finish(Registration::School(created), &event, Some((payment, order)), actor)
            .await
    }

    /// Open a fresh payment for a registration whose last attempt failed.
    pub async fn retry_payment(
        &self,
        registration_type: RegistrationType,
        registration_id: Uuid,
        coupon_code: Option<String>,
        actor: &Actor,
    ) -> Result<RegistrationOutcome> {
        let registration = self.get(registration_type, registration_id).await?;

        match registration.payment_status() {
            RegistrationPaymentStatus::Success | RegistrationPaymentStatus::NotRequired => {
                return Err(AppError::Conflict("Registration is already paid".to_string()));
            }
            RegistrationPaymentStatus::Refunded => {
                return Err(AppError::BadRequest("Registration was refunded".to_string()));
            }
            RegistrationPaymentStatus::Pending | RegistrationPaymentStatus::Failed => {}
        }

        let event = self.event_repo
            .find_by_id(registration.event_id())
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        let initiated = self.settlement
            .initiate(PaymentRequest {
                registration_id,
                registration_type,
                event_id: event.id,
                amount: event.fee(),
                coupon_code,
                actor: actor.clone(),
            })
            .await?;

        let registration = self.get(registration_type, registration_id).await?;
        let gateway = self.settlement.gateway();

        Ok(RegistrationOutcome {
            registration,
            order: (!initiated.order.is_free).then(|| initiated.order.clone()),
            payment: Some(initiated.payment),
            gateway: Some(gateway.kind()),
            gateway_key: gateway.public_key(),
        })
    }

    pub async fn get(&self, registration_type: RegistrationType, id: Uuid) -> Result<Registration> {
        self.registration_repo
            .find(registration_type, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} registration not found", registration_type)))
    }

    pub async fn list_students(&self, event_id: Uuid, limit: i64, offset: i64) -> Result<Vec<StudentRegistration>> {
        self.registration_repo.list_students(event_id, limit, offset).await
    }

    async fn finish(
        &self,
        registration: Registration,
        event: &Event,
        payment: Option<(Payment, Option<OrderRef>)>,
        actor: &Actor,
    ) -> Result<RegistrationOutcome> {
        // A zero-amount order settles inside `record_initiated`, which
        // updates the stored registration after it was created.
        let registration = match &payment {
            Some(_) => self.get(registration.registration_type(), registration.id()).await?,
            None => registration,
        };

        tracing::info!(
            "{} registration {} created for event {}",
            registration.registration_type(),
            registration.registration_code(),
            event.slug
        );

        self.audit
            .record(
                NewAuditRecord::new(EVENT_REGISTRATION, "create", STATUS_SUCCESS)
                    .actor(&actor.clone().with_email(registration.contact_email()))
                    .resource(registration.registration_type().as_str(), registration.id())
                    .details(json!({
                        "event_id": event.id,
                        "registration_code": registration.registration_code(),
                        "payment_status": registration.payment_status(),
                    })),
            )
            .await;

        let notification = NotificationEvent::RegistrationReceived {
            registration: registration.clone(),
            event_title: event.title.clone(),
        };
        let deliveries = self.notifications.notify(&notification).await;
        self.audit.deliveries(&notification, &deliveries).await;

        let (payment, order) = match payment {
            Some((payment, order)) => (Some(payment), order),
            None => (None, None),
        };
        let gateway = self.settlement.gateway();
        let checkout = order.is_some();

        Ok(RegistrationOutcome {
            registration,
            payment,
            order,
            gateway: checkout.then(|| gateway.kind()),
            gateway_key: if checkout { gateway.public_key() } else { None },
        })
    }
}
