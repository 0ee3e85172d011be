//! Caller identity and outbound credentials.
//!
//! Inbound: callers present a Firebase ID token as a bearer token; an
//! [`IdentityVerifier`] turns it into a [`Caller`]. Outbound: Google APIs
//! are called with service-account access tokens from [`oauth`].

pub mod firebase;
pub mod oauth;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use tracing::debug;

use crate::error::ServiceError;

/// An authenticated end user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub uid: String,
    pub email: Option<String>,
}

impl Caller {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), email: None }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("signing key fetch failed: {0}")]
    KeyFetch(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("token exchange failed: {0}")]
    Exchange(String),
}

/// Verifies an inbound ID token.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<Caller, TokenError>;
}

/// Extract the bearer token from an `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Resolve the caller for a request. Missing or invalid tokens yield `None`;
/// the operations decide whether that is acceptable.
pub async fn authenticate(verifier: &dyn IdentityVerifier, headers: &HeaderMap) -> Option<Caller> {
    let token = bearer_token(headers)?;
    match verifier.verify(token).await {
        Ok(caller) => Some(caller),
        Err(e) => {
            debug!(error = %e, "Rejected ID token");
            None
        }
    }
}

/// The caller, or `Unauthenticated`.
pub fn require_caller(caller: Option<&Caller>) -> Result<&Caller, ServiceError> {
    caller.ok_or(ServiceError::Unauthenticated)
}
