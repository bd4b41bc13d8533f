use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    config::AuthConfig,
    error::{AppError, Result},
};

pub const ROLE_ADMIN: &str = "admin";

/// The caller behind a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: String,
    pub tenant_id: Option<String>,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Locally signed tokens: `sub` or `user_id` names the user.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub tenant_id: Option<String>,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    user_id: Option<String>,
    id: Option<String>,
    email: Option<String>,
    name: Option<String>,
    role: Option<String>,
    tenant_id: Option<String>,
}

/// Validates bearer tokens against the SSO service, falling back to local
/// JWT verification when no service is configured or it cannot be reached.
pub struct SsoClient {
    http: reqwest::Client,
    validation_url: Option<String>,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SsoClient {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let algorithm = Algorithm::from_str(&config.jwt_algorithm)
            .map_err(|e| AppError::Internal(format!("Unsupported JWT algorithm {}: {}", config.jwt_algorithm, e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.validation_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            validation_url: config
                .validation_url
                .as_ref()
                .filter(|url| !url.is_empty())
                .map(|url| url.trim_end_matches('/').to_string()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation: Validation::new(algorithm),
        })
    }

    pub async fn validate(&self, token: &str) -> Result<CurrentUser> {
        let Some(base) = &self.validation_url else {
            return self.validate_locally(token);
        };

        let response = match self.http
            .get(format!("{}/validate", base))
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("SSO service unreachable, validating token locally: {}", e);
                return self.validate_locally(token);
            }
        };

        if !response.status().is_success() {
            tracing::debug!("SSO rejected token with {}", response.status());
            return Err(AppError::Unauthorized);
        }

        let body: ValidationResponse = response.json().await.map_err(|e| {
            tracing::error!("Malformed SSO validation response: {}", e);
            AppError::Unauthorized
        })?;

        Ok(CurrentUser {
            id: body.user_id.or(body.id).ok_or(AppError::Unauthorized)?,
            email: body.email,
            name: body.name,
            role: body.role.unwrap_or_else(|| "user".to_string()),
            tenant_id: body.tenant_id,
        })
    }

    fn validate_locally(&self, token: &str) -> Result<CurrentUser> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!("Local token validation failed: {}", e);
                AppError::Unauthorized
            })?
            .claims;

        Ok(CurrentUser {
            id: claims.sub.or(claims.user_id).ok_or(AppError::Unauthorized)?,
            email: claims.email,
            name: claims.name,
            role: claims.role.unwrap_or_else(|| "user".to_string()),
            tenant_id: claims.tenant_id,
        })
    }
}
