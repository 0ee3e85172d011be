//! Firebase Realtime Database REST client.
//!
//! API: `{database_url}/{path}.json`, GET / PUT / PATCH / DELETE.
//! Auth: OAuth access token as the `access_token` query parameter; omitted
//! when no token source is configured (local emulator).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{segments, KeyValueStore};
use crate::auth::oauth::TokenSource;

/// OAuth scopes the database accepts for admin access.
pub const DATABASE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/firebase.database",
    "https://www.googleapis.com/auth/userinfo.email",
];

pub struct RtdbStore {
    http: Client,
    base_url: String,
    tokens: Option<Arc<dyn TokenSource>>,
}

impl RtdbStore {
    pub fn new(
        database_url: &str,
        tokens: Option<Arc<dyn TokenSource>>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("matchpool/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build database HTTP client")?;
        Ok(Self {
            http,
            base_url: database_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// REST URL for a store path. Each segment is percent-encoded.
    fn url(&self, path: &str) -> String {
        let encoded: Vec<String> = segments(path)
            .into_iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/{}.json", self.base_url, encoded.join("/"))
    }

    async fn authorize(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        match &self.tokens {
            Some(tokens) => {
                let token = tokens
                    .access_token()
                    .await
                    .context("Failed to obtain database access token")?;
                Ok(req.query(&[("access_token", token.expose_secret().as_str())]))
            }
            None => Ok(req),
        }
    }

    async fn send(&self, req: RequestBuilder, op: &str, path: &str) -> Result<reqwest::Response> {
        let resp = self
            .authorize(req)
            .await?
            .send()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Database {op} {path} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Database {op} {path} returned {status}: {body}");
        }
        debug!(op, path, "Database request ok");
        Ok(resp)
    }
}

#[async_trait]
impl KeyValueStore for RtdbStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let resp = self.send(self.http.get(self.url(path)), "GET", path).await?;
        let value: Value = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse database value at {path}"))?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        let req = self.http.put(self.url(path)).json(&value);
        self.send(req, "PUT", path).await?;
        Ok(())
    }

    async fn update(&self, updates: Map<String, Value>) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let req = self.http.patch(self.url("")).json(&updates);
        self.send(req, "PATCH", "/").await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.send(self.http.delete(self.url(path)), "DELETE", path).await?;
        Ok(())
    }
}
