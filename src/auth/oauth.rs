//! Google service-account OAuth.
//!
//! Exchanges a signed RS256 assertion for an access token (JWT-bearer
//! grant) and caches it until shortly before expiry.

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use super::TokenError;
use crate::storage::{read_secret, KeyValueStore};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh this long before the upstream expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Source of OAuth bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<SecretString, TokenError>;
}

/// The subset of a service-account JSON file we need.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, TokenError> {
        serde_json::from_str(json)
            .map_err(|e| TokenError::Credentials(format!("invalid service account JSON: {e}")))
    }

    pub fn from_file(path: &str) -> Result<Self, TokenError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| TokenError::Credentials(format!("cannot read {path}: {e}")))?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

// ---------------------------------------------------------------------------
// Service account
// ---------------------------------------------------------------------------

pub struct ServiceAccountTokenSource {
    http: Client,
    key: ServiceAccountKey,
    scopes: Vec<String>,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey, scopes: &[&str]) -> Result<Self, TokenError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TokenError::Exchange(e.to_string()))?;
        Ok(Self {
            http,
            key,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            cache: Mutex::new(None),
        })
    }

    fn assertion(&self) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: self.scopes.join(" "),
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| TokenError::Credentials(format!("invalid private key: {e}")))?;
        encode(&header, &claims, &signing_key).map_err(TokenError::Jwt)
    }

    async fn exchange(&self) -> Result<CachedToken, TokenError> {
        let assertion = self.assertion()?;
        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| TokenError::Exchange(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TokenError::Exchange(format!("token endpoint returned {status}: {body}")));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| TokenError::Exchange(format!("invalid token response: {e}")))?;

        debug!(
            client_email = %self.key.client_email,
            expires_in = body.expires_in,
            "Obtained service account access token"
        );

        Ok(CachedToken {
            token: SecretString::new(body.access_token),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<SecretString, TokenError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }
        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

// ---------------------------------------------------------------------------
// Service account held in remote config
// ---------------------------------------------------------------------------

/// Loads the service account from `remoteConfig/{key}` on first use.
pub struct RemoteConfigTokenSource {
    store: Arc<dyn KeyValueStore>,
    secret_key: String,
    scopes: Vec<&'static str>,
    inner: OnceCell<ServiceAccountTokenSource>,
}

impl RemoteConfigTokenSource {
    pub fn new(store: Arc<dyn KeyValueStore>, secret_key: &str, scopes: &[&'static str]) -> Self {
        Self {
            store,
            secret_key: secret_key.to_string(),
            scopes: scopes.to_vec(),
            inner: OnceCell::new(),
        }
    }

    async fn load(&self) -> Result<ServiceAccountTokenSource, TokenError> {
        let json = read_secret(self.store.as_ref(), &self.secret_key)
            .await
            .map_err(|e| TokenError::Credentials(e.to_string()))?
            .ok_or_else(|| TokenError::Credentials(format!("{} not found", self.secret_key)))?;
        let key = ServiceAccountKey::from_json(json.expose_secret())?;
        ServiceAccountTokenSource::new(key, &self.scopes)
    }
}

#[async_trait]
impl TokenSource for RemoteConfigTokenSource {
    async fn access_token(&self) -> Result<SecretString, TokenError> {
        let source = self.inner.get_or_try_init(|| self.load()).await?;
        source.access_token().await
    }
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

/// A fixed token, for emulators and tests.
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self(SecretString::new(token.to_string()))
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<SecretString, TokenError> {
        Ok(self.0.clone())
    }
}
