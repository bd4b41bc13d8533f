use askama::Template;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::{
    config::EmailConfig,
    domain::Registration,
    error::{AppError, Result},
    notifications::{format_amount, NotificationEvent, NotificationSender},
};

#[derive(Template)]
#[template(path = "email/registration.html")]
struct RegistrationEmail<'a> {
    name: &'a str,
    is_school: bool,
    school_name: &'a str,
    event_title: &'a str,
    registration_code: &'a str,
    payment_pending: bool,
}

#[derive(Template)]
#[template(path = "email/payment.html")]
struct PaymentEmail<'a> {
    name: &'a str,
    event_title: &'a str,
    registration_code: &'a str,
    amount_paid: String,
    has_discount: bool,
    discount: String,
    transaction_id: &'a str,
}

/// Rendered subject and HTML body.
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

pub fn render(event: &NotificationEvent) -> Result<RenderedEmail> {
    let registration = event.registration();
    let (is_school, school_name) = match registration {
        Registration::Student(r) => (false, r.school_name.as_str()),
        Registration::School(r) => (true, r.school_name.as_str()),
    };

    let rendered = match event {
        NotificationEvent::RegistrationReceived { event_title, .. } => {
            let html = RegistrationEmail {
                name: registration.contact_name(),
                is_school,
                school_name,
                event_title,
                registration_code: registration.registration_code(),
                payment_pending: registration.status() != crate::domain::RegistrationStatus::Confirmed,
            }
            .render()
            .map_err(|e| AppError::Internal(format!("Email template error: {}", e)))?;

            let subject = if is_school {
                format!("School Registration Confirmed - {}", event_title)
            } else {
                format!("Registration Confirmed - {}", event_title)
            };
            RenderedEmail { subject, html }
        }
        NotificationEvent::PaymentConfirmed { event_title, payment, .. } => {
            let html = PaymentEmail {
                name: registration.contact_name(),
                event_title,
                registration_code: registration.registration_code(),
                amount_paid: format_amount(payment.final_amount),
                has_discount: payment.discount_amount > 0,
                discount: format_amount(payment.discount_amount),
                transaction_id: &payment.transaction_reference,
            }
            .render()
            .map_err(|e| AppError::Internal(format!("Email template error: {}", e)))?;

            RenderedEmail {
                subject: format!("Payment Confirmed - {}", event_title),
                html,
            }
        }
    };

    Ok(rendered)
}

pub struct EmailSender {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailSender {
    pub fn new(config: Option<EmailConfig>) -> Result<Option<Self>> {
        let Some(config) = config.filter(|c| c.enabled) else {
            return Ok(None);
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| AppError::Internal(format!("Invalid SMTP host: {}", e)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        Ok(Some(Self { config, transport }))
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn name(&self) -> &str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        let rendered = render(event)?;
        let to = event.registration().contact_email();

        let message = Message::builder()
            .from(
                format!("{} <{}>", self.config.from_name, self.config.from_email)
                    .parse()
                    .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| AppError::BadRequest(format!("Invalid recipient {}: {}", to, e)))?)
            .subject(rendered.subject)
            .header(ContentType::TEXT_HTML)
            .body(rendered.html)
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::External(format!("SMTP send failed: {}", e)))?;

        tracing::info!("Sent email to {}", to);
        Ok(())
    }
}
