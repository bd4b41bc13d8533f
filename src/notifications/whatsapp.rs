use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    config::WhatsAppConfig,
    error::{AppError, Result},
    notifications::{format_amount, NotificationEvent, NotificationSender},
};

/// Template messages through the Karix WhatsApp Business API.
pub struct WhatsAppSender {
    config: WhatsAppConfig,
    http: reqwest::Client,
}

impl WhatsAppSender {
    pub fn new(config: Option<WhatsAppConfig>) -> Result<Option<Self>> {
        let Some(config) = config.filter(|c| c.enabled) else {
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Some(Self { config, http }))
    }

    /// Template id and positional parameter values for a notification.
    fn template(&self, event: &NotificationEvent) -> (&str, Vec<String>) {
        let registration = event.registration();
        match event {
            NotificationEvent::RegistrationReceived { event_title, .. } => (
                &self.config.registration_template_id,
                vec![
                    registration.contact_name().to_string(),
                    event_title.clone(),
                    registration.registration_code().to_string(),
                ],
            ),
            NotificationEvent::PaymentConfirmed { event_title, payment, .. } => (
                &self.config.payment_template_id,
                vec![
                    registration.contact_name().to_string(),
                    event_title.clone(),
                    format_amount(payment.final_amount),
                    payment.transaction_reference.clone(),
                ],
            ),
        }
    }

    pub fn build_payload(&self, event: &NotificationEvent) -> Value {
        let (template_id, params) = self.template(event);
        let parameter_values: serde_json::Map<String, Value> = params
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), Value::String(v)))
            .collect();

        json!({
            "message": {
                "channel": "WABA",
                "content": {
                    "preview_url": false,
                    "type": "TEMPLATE",
                    "template": {
                        "templateId": template_id,
                        "parameterValues": parameter_values,
                    },
                    "shorten_url": true,
                },
                "recipient": {
                    "to": event.registration().contact_mobile(),
                    "recipient_type": "individual",
                    "reference": {
                        "cust_ref": "Stride Events",
                        "messageTag1": "Event Registration",
                        "conversationId": format!("conv-{}", Utc::now().timestamp()),
                    },
                },
                "sender": {
                    "from": self.config.sender_number,
                },
            },
            "metaData": {
                "version": "v1.0.9",
            },
        })
    }
}

#[async_trait]
impl NotificationSender for WhatsAppSender {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        let url = format!("{}/sendMessage", self.config.api_url.trim_end_matches('/'));

        let response = self.http
            .post(&url)
            .header("Authentication", format!("Bearer {}", self.config.api_key))
            .json(&self.build_payload(event))
            .send()
            .await
            .map_err(|e| AppError::External(format!("Karix request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::External(format!(
                "Karix returned {}",
                response.status()
            )));
        }

        tracing::info!(
            "Sent WhatsApp message to {}",
            event.registration().contact_mobile()
        );
        Ok(())
    }
}
