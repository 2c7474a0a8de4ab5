//! Google OAuth access tokens for the BigQuery REST API
//!
//! Two sources are supported:
//!
//! - a static bearer token (e.g. from `gcloud auth print-access-token`)
//! - a service-account key, exchanged for a token with a signed RS256 JWT
//!   assertion at the key's `token_uri`
//!
//! Exchanged tokens are cached until one minute before they expire.

use crate::types::{AppError, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_TTL_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The fields of a service-account JSON key that token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            AppError::Configuration(format!("Invalid service account key: {}", e))
        })
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_TTL_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: i64,
}

enum TokenSource {
    Static(String),
    ServiceAccount {
        key: ServiceAccountKey,
        signing_key: EncodingKey,
    },
}

/// Access-token provider for Google APIs.
pub struct GoogleAuth {
    source: TokenSource,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl GoogleAuth {
    /// Use a fixed bearer token.
    pub fn from_static_token(token: impl Into<String>) -> Self {
        Self {
            source: TokenSource::Static(token.into()),
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// Exchange a service-account key for tokens on demand.
    pub fn from_service_account(key: ServiceAccountKey, timeout: Duration) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            AppError::Configuration(format!("Invalid service account private key: {}", e))
        })?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            source: TokenSource::ServiceAccount { key, signing_key },
            http,
            cached: Mutex::new(None),
        })
    }

    /// A valid access token, exchanging a new one when the cached one is
    /// missing or about to expire.
    pub async fn access_token(&self) -> Result<String> {
        let (key, signing_key) = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServiceAccount { key, signing_key } => (key, signing_key),
        };

        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - REFRESH_MARGIN_SECS > now {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.exchange(key, signing_key, now).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn exchange(
        &self,
        key: &ServiceAccountKey,
        signing_key: &EncodingKey,
        now: i64,
    ) -> Result<CachedToken> {
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: BIGQUERY_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();

        let assertion = encode(&header, &claims, signing_key)
            .map_err(|e| AppError::Auth(format!("Failed to sign token assertion: {}", e)))?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| AppError::Warehouse(format!("Token exchange failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Warehouse(format!(
                "Token exchange returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Warehouse(format!("Invalid token response: {}", e)))?;

        tracing::debug!(expires_in = token.expires_in, "obtained Google access token");

        Ok(CachedToken {
            token: token.access_token,
            expires_at: now + token.expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let auth = GoogleAuth::from_static_token("ya29.static");
        assert_eq!(auth.access_token().await.expect("token"), "ya29.static");
    }

    #[test]
    fn test_key_defaults_token_uri() {
        let key = ServiceAccountKey::from_json(
            r#"{"client_email":"svc@p.iam.gserviceaccount.com","private_key":"x"}"#,
        )
        .expect("key");
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
        assert!(key.private_key_id.is_none());
    }

    #[test]
    fn test_bad_private_key_is_configuration_error() {
        let key = ServiceAccountKey {
            client_email: "svc@p.iam.gserviceaccount.com".into(),
            private_key: "not a pem".into(),
            private_key_id: None,
            token_uri: default_token_uri(),
        };
        let result = GoogleAuth::from_service_account(key, Duration::from_secs(5));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}
