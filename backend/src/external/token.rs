//! Service account token acquisition for the remote sensing backend
//!
//! Implements the OAuth 2.0 JWT-bearer grant:
//! - Measure local clock skew against a trusted host
//! - Sign an RS256 assertion with skew-corrected `iat` / `exp`
//! - Exchange it at the token endpoint for a short-lived bearer token
//!
//! The resulting credential is cached process-wide and reused until shortly
//! before it expires.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::clock::{Clock, ClockSkewProbe, SystemClock};
use crate::error::{AppError, AppResult};

/// OAuth 2.0 grant type for signed JWT assertions
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime accepted by the token endpoint
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// A cached token is refreshed this long before it actually expires
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Service account identity used to sign assertions
#[derive(Clone)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Short-lived bearer credential
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the token can still be used at `now`, keeping a safety margin
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Claims of the signed assertion
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl AssertionClaims {
    /// Build claims with `iat` shifted back by the measured skew so they match
    /// the server's notion of "now"
    pub fn new(account: &ServiceAccount, scope: &str, audience: &str, local_now: i64, skew_secs: i64) -> Self {
        let iat = local_now - skew_secs;
        Self {
            iss: account.client_email.clone(),
            scope: scope.to_string(),
            aud: audience.to_string(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        }
    }
}

/// Token endpoint response; both success and error shapes
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Token acquisition settings
#[derive(Debug, Clone)]
pub struct TokenAcquirerConfig {
    pub token_url: String,
    pub scope: String,
}

/// Obtains and caches bearer tokens for the remote sensing backend
pub struct TokenAcquirer {
    http_client: Client,
    account: Option<ServiceAccount>,
    config: TokenAcquirerConfig,
    probe: ClockSkewProbe,
    clock: Arc<dyn Clock>,
    credential: Mutex<Option<Credential>>,
}

impl TokenAcquirer {
    pub fn new(
        http_client: Client,
        account: Option<ServiceAccount>,
        config: TokenAcquirerConfig,
        probe: ClockSkewProbe,
    ) -> Self {
        Self::with_clock(http_client, account, config, probe, Arc::new(SystemClock))
    }

    pub fn with_clock(
        http_client: Client,
        account: Option<ServiceAccount>,
        config: TokenAcquirerConfig,
        probe: ClockSkewProbe,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            account,
            config,
            probe,
            clock,
            credential: Mutex::new(None),
        }
    }

    /// Whether service account credentials were supplied
    pub fn is_configured(&self) -> bool {
        self.account.is_some()
    }

    /// Return a valid access token, acquiring a new one if needed.
    ///
    /// Concurrent callers queue on the credential lock; whoever comes second
    /// finds the token stored by the first and returns it without another
    /// exchange.
    pub async fn access_token(&self) -> AppResult<String> {
        let account = self.account.as_ref().ok_or_else(|| {
            AppError::NotConfigured(
                "service account email and private key must both be set".to_string(),
            )
        })?;

        let mut credential = self.credential.lock().await;
        if let Some(current) = credential.as_ref() {
            if current.is_fresh_at(self.clock.now()) {
                return Ok(current.access_token.clone());
            }
        }

        let fresh = self.acquire(account).await?;
        let token = fresh.access_token.clone();
        *credential = Some(fresh);
        Ok(token)
    }

    /// Drop the cached credential if it is still the `rejected` token, so the
    /// next call performs a fresh exchange. A token another caller already
    /// replaced it with is left alone.
    pub async fn invalidate(&self, rejected: &str) {
        let mut credential = self.credential.lock().await;
        if credential.as_ref().is_some_and(|c| c.access_token == rejected) {
            *credential = None;
            tracing::info!("Cached remote sensing credential invalidated");
        }
    }

    async fn acquire(&self, account: &ServiceAccount) -> AppResult<Credential> {
        let skew = self.probe.measure(self.clock.as_ref()).await;
        let claims = AssertionClaims::new(
            account,
            &self.config.scope,
            &self.config.token_url,
            self.clock.now().timestamp(),
            skew,
        );
        let assertion = sign_assertion(account, &claims)?;

        tracing::debug!(issuer = %account.client_email, skew_secs = skew, "Exchanging service account assertion");

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Token endpoint request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<TokenResponse> = serde_json::from_str(&body).ok();

        let token = parsed.as_ref().and_then(|p| p.access_token.clone());
        match (status.is_success(), token) {
            (true, Some(access_token)) => {
                let expires_in = parsed
                    .and_then(|p| p.expires_in)
                    .unwrap_or(ASSERTION_LIFETIME_SECS);
                tracing::info!(expires_in, "Acquired remote sensing access token");
                Ok(Credential {
                    access_token,
                    expires_at: self.clock.now() + Duration::seconds(expires_in),
                })
            }
            _ => {
                let detail = parsed
                    .and_then(|p| p.error_description.or(p.error))
                    .unwrap_or_else(|| format!("{} - {}", status, body));
                tracing::warn!("Token exchange failed: {}", detail);
                Err(AppError::TokenExchange(detail))
            }
        }
    }
}

/// Sign the assertion with the service account's RSA key
pub fn sign_assertion(account: &ServiceAccount, claims: &AssertionClaims) -> AppResult<String> {
    let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
        .map_err(|e| AppError::Configuration(format!("Invalid service account private key: {}", e)))?;

    encode(&Header::new(Algorithm::RS256), claims, &key)
        .map_err(|e| AppError::Internal(format!("Failed to sign assertion: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> ServiceAccount {
        ServiceAccount {
            client_email: "svc@farm.iam.gserviceaccount.com".to_string(),
            private_key: "not a key".to_string(),
        }
    }

    #[test]
    fn test_claims_apply_skew() {
        let claims = AssertionClaims::new(&account(), "scope", "aud", 1_000_000, 120);
        assert_eq!(claims.iat, 999_880);
        assert_eq!(claims.exp, 999_880 + 3600);
        assert_eq!(claims.iss, "svc@farm.iam.gserviceaccount.com");
    }

    #[test]
    fn test_claims_negative_skew() {
        // Local clock behind the remote one
        let claims = AssertionClaims::new(&account(), "scope", "aud", 1_000_000, -30);
        assert_eq!(claims.iat, 1_000_030);
    }

    #[test]
    fn test_credential_freshness_margin() {
        let now = Utc::now();
        let credential = Credential {
            access_token: "t".to_string(),
            expires_at: now + Duration::seconds(61),
        };
        assert!(credential.is_fresh_at(now));
        assert!(!credential.is_fresh_at(now + Duration::seconds(1)));
    }

    #[test]
    fn test_invalid_key_is_configuration_error() {
        let claims = AssertionClaims::new(&account(), "scope", "aud", 0, 0);
        let err = sign_assertion(&account(), &claims).unwrap_err();
        assert!(err.requires_setup());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let printed = format!("{:?}", account());
        assert!(!printed.contains("not a key"));
    }

    #[tokio::test]
    async fn test_missing_account_is_not_configured() {
        let client = Client::new();
        let acquirer = TokenAcquirer::new(
            client.clone(),
            None,
            TokenAcquirerConfig {
                token_url: "http://127.0.0.1:9/token".to_string(),
                scope: "scope".to_string(),
            },
            ClockSkewProbe::new(client, "http://127.0.0.1:9/", std::time::Duration::from_millis(100)),
        );
        assert!(!acquirer.is_configured());
        let err = acquirer.access_token().await.unwrap_err();
        assert!(matches!(err, AppError::NotConfigured(_)));
    }
}
