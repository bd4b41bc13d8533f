use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

use crate::domain::GatewayKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub payments: PaymentConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Base URL of the SSO token validation service. When unset, tokens are
    /// validated locally against `jwt_secret`.
    pub validation_url: Option<String>,
    pub jwt_secret: String,
    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: String,
    #[serde(default = "default_validation_timeout")]
    pub validation_timeout_secs: u64,
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

fn default_validation_timeout() -> u64 {
    5
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            validation_url: None,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_algorithm: default_jwt_algorithm(),
            validation_timeout_secs: default_validation_timeout(),
        }
    }
}

/// Gateway credentials are held here and handed to the adapter
/// constructors; nothing reads them from process state.
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    #[serde(default = "default_payments_enabled")]
    pub enabled: bool,
    #[serde(default = "default_gateway")]
    pub gateway: GatewayKind,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub razorpay: RazorpayConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
}

fn default_payments_enabled() -> bool {
    true
}

fn default_gateway() -> GatewayKind {
    GatewayKind::Razorpay
}

fn default_currency() -> String {
    "INR".to_string()
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            enabled: default_payments_enabled(),
            gateway: default_gateway(),
            currency: default_currency(),
            razorpay: RazorpayConfig::default(),
            stripe: StripeConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RazorpayConfig {
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub key_secret: String,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_razorpay_url")]
    pub base_url: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

fn default_razorpay_url() -> String {
    "https://api.razorpay.com".to_string()
}

fn default_gateway_timeout() -> u64 {
    15
}

impl Default for RazorpayConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            key_secret: String::new(),
            webhook_secret: String::new(),
            base_url: default_razorpay_url(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StripeConfig {
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub publishable_key: String,
    /// Webhooks older than five minutes are rejected by `stripe::Webhook`.
    #[serde(default)]
    pub webhook_secret: String,
    /// Override for the Stripe API base URL (stripe-mock, proxies).
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    pub email: Option<EmailConfig>,
    pub whatsapp: Option<WhatsAppConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Deserialize, Clone)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    #[serde(default = "default_karix_url")]
    pub api_url: String,
    pub api_key: String,
    pub sender_number: String,
    /// Approved Karix template ids, by message kind.
    pub registration_template_id: String,
    pub payment_template_id: String,
}

fn default_karix_url() -> String {
    "https://api.karix.io/v2".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8000)?
            .set_default("server.frontend_url", "http://localhost:5173")?
            .set_default("database.url", "sqlite://stride_events.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("payments.enabled", true)?
            .set_default("payments.gateway", "razorpay")?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with STRIDE__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("STRIDE").separator("__"))

            .build()?;

        config.try_deserialize()
    }

    /// Check that every enabled feature has the credentials it needs.
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.payments.enabled {
            match self.payments.gateway {
                GatewayKind::Razorpay => {
                    let rzp = &self.payments.razorpay;
                    if rzp.key_id.is_empty() || rzp.key_secret.is_empty() {
                        errors.push("Razorpay key_id and key_secret are required when payments.gateway = razorpay".to_string());
                    }
                    if rzp.webhook_secret.is_empty() {
                        errors.push("Razorpay webhook_secret is required when payments.gateway = razorpay".to_string());
                    }
                }
                GatewayKind::Stripe => {
                    let stripe = &self.payments.stripe;
                    if stripe.secret_key.is_empty() {
                        errors.push("Stripe secret_key is required when payments.gateway = stripe".to_string());
                    }
                    if stripe.webhook_secret.is_empty() {
                        errors.push("Stripe webhook_secret is required when payments.gateway = stripe".to_string());
                    }
                }
            }
        }

        if let Some(email) = &self.notifications.email {
            if email.enabled && (email.smtp_host.is_empty() || email.from_email.is_empty()) {
                errors.push("SMTP host and from_email are required when email notifications are enabled".to_string());
            }
        }

        if let Some(whatsapp) = &self.notifications.whatsapp {
            if whatsapp.enabled && (whatsapp.api_key.is_empty() || whatsapp.sender_number.is_empty()) {
                errors.push("Karix api_key and sender_number are required when WhatsApp notifications are enabled".to_string());
            }
        }

        if self.database.url.is_empty() {
            errors.push("database.url is required".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                frontend_url: "http://localhost:5173".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://stride_events.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            auth: AuthConfig::default(),
            payments: PaymentConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}
