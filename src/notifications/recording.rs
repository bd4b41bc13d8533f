//! Captures notifications in memory so tests can assert on them.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    domain::{Registration, RegistrationPaymentStatus, RegistrationStatus, StudentRegistration},
    error::{AppError, Result},
    notifications::{NotificationEvent, NotificationSender},
};

#[derive(Default)]
pub struct RecordingSender {
    events: Mutex<Vec<NotificationEvent>>,
    failing: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `send` fail after recording the event.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn payment_confirmations(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, NotificationEvent::PaymentConfirmed { .. }))
            .count()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::External("recording sender is failing".to_string()));
        }
        Ok(())
    }
}

pub fn sample_registration() -> Registration {
    let now = Utc::now();
    Registration::Student(StudentRegistration {
        id: Uuid::new_v4(),
        event_id: Uuid::new_v4(),
        school_id: None,
        full_name: "Asha Rao".to_string(),
        email: "asha@example.com".to_string(),
        mobile: "+919876543210".to_string(),
        school_name: "Delhi Public School".to_string(),
        grade: "9".to_string(),
        registration_code: "STU-TEST0001".to_string(),
        status: RegistrationStatus::Pending,
        payment_status: RegistrationPaymentStatus::Pending,
        payment_id: None,
        registered_at: now,
        updated_at: now,
    })
}
