//! Firebase ID token verification.
//!
//! Tokens are RS256 JWTs signed with keys published as X.509 certificates
//! at the `securetoken` metadata endpoint. Certificates are cached for the
//! `max-age` the endpoint advertises.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{Caller, IdentityVerifier, TokenError};

pub const GOOGLE_CERTS_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

const DEFAULT_MAX_AGE_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

struct CachedCerts {
    certs: HashMap<String, String>,
    expires_at: Instant,
}

pub struct FirebaseTokenVerifier {
    http: Client,
    project_id: String,
    certs_url: String,
    cache: RwLock<Option<CachedCerts>>,
}

impl FirebaseTokenVerifier {
    pub fn new(project_id: &str) -> Result<Self, TokenError> {
        Self::with_certs_url(project_id, GOOGLE_CERTS_URL)
    }

    pub fn with_certs_url(project_id: &str, certs_url: &str) -> Result<Self, TokenError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TokenError::KeyFetch(e.to_string()))?;
        Ok(Self {
            http,
            project_id: project_id.to_string(),
            certs_url: certs_url.to_string(),
            cache: RwLock::new(None),
        })
    }

    async fn cert(&self, kid: &str) -> Result<String, TokenError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if Instant::now() < cached.expires_at {
                    if let Some(cert) = cached.certs.get(kid) {
                        return Ok(cert.clone());
                    }
                }
            }
        }

        // Unknown kid or stale cache: keys may have rotated.
        let fresh = self.fetch_certs().await?;
        let cert = fresh.certs.get(kid).cloned();
        *self.cache.write().await = Some(fresh);
        cert.ok_or_else(|| TokenError::Invalid(format!("unknown key id {kid}")))
    }

    async fn fetch_certs(&self) -> Result<CachedCerts, TokenError> {
        let resp = self
            .http
            .get(&self.certs_url)
            .send()
            .await
            .map_err(|e| TokenError::KeyFetch(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TokenError::KeyFetch(format!("certs endpoint returned {}", resp.status())));
        }

        let max_age = resp
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_MAX_AGE_SECS);

        let certs: HashMap<String, String> = resp
            .json()
            .await
            .map_err(|e| TokenError::KeyFetch(format!("invalid certs payload: {e}")))?;

        Ok(CachedCerts {
            certs,
            expires_at: Instant::now() + Duration::from_secs(max_age),
        })
    }
}

fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control
        .split(',')
        .find_map(|part| part.trim().strip_prefix("max-age=")?.parse().ok())
}

#[async_trait]
impl IdentityVerifier for FirebaseTokenVerifier {
    async fn verify(&self, id_token: &str) -> Result<Caller, TokenError> {
        let header = decode_header(id_token)?;
        if header.alg != Algorithm::RS256 {
            return Err(TokenError::Invalid(format!("unexpected algorithm {:?}", header.alg)));
        }
        let kid = header
            .kid
            .ok_or_else(|| TokenError::Invalid("missing kid in header".to_string()))?;

        let cert = self.cert(&kid).await?;
        let key = DecodingKey::from_rsa_pem(cert.as_bytes())?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);

        let claims = decode::<IdTokenClaims>(id_token, &key, &validation)?.claims;
        if claims.sub.is_empty() {
            return Err(TokenError::Invalid("empty subject".to_string()));
        }

        Ok(Caller { uid: claims.sub, email: claims.email })
    }
}
