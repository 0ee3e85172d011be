//! API-Football client.
//!
//! API: `https://v3.football.api-sports.io/`
//! Auth: `x-rapidapi-key` header (with `x-rapidapi-host`). Every payload is
//! wrapped as `{"errors": ..., "response": ...}`; quota and parameter
//! problems come back as HTTP 200 with a non-empty `errors`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{ApiFixtureItem, FixtureQuery, FootballApi, UpstreamError};

const API_HOST: &str = "v3.football.api-sports.io";

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    errors: Value,
    response: Option<T>,
}

/// `errors` is `[]` when fine, and an object or non-empty array otherwise.
fn has_errors(errors: &Value) -> bool {
    match errors {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

pub struct ApiFootballClient {
    http: Client,
    base_url: String,
}

impl ApiFootballClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("matchpool/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(UpstreamError::transport)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn send(
        &self,
        key: &SecretString,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Value, UpstreamError> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        debug!(endpoint, ?params, "API-Football request");

        let resp = self
            .http
            .get(&url)
            .header("x-rapidapi-host", API_HOST)
            .header("x-rapidapi-key", key.expose_secret().as_str())
            .query(params)
            .send()
            .await
            .map_err(UpstreamError::transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status: status.as_u16(), body });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| UpstreamError::Decode(e.without_url().to_string()))
    }

    async fn get_response<T: DeserializeOwned>(
        &self,
        key: &SecretString,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, UpstreamError> {
        let payload = self.send(key, endpoint, params).await?;
        let envelope: ApiEnvelope<T> =
            serde_json::from_value(payload).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        if has_errors(&envelope.errors) {
            return Err(UpstreamError::Api(envelope.errors.to_string()));
        }
        Ok(envelope.response)
    }
}

#[async_trait]
impl FootballApi for ApiFootballClient {
    async fn fixtures(
        &self,
        key: &SecretString,
        query: &FixtureQuery,
    ) -> Result<Vec<ApiFixtureItem>, UpstreamError> {
        let items = self
            .get_response::<Vec<ApiFixtureItem>>(key, "fixtures", &query.params())
            .await?;
        Ok(items.unwrap_or_default())
    }

    async fn team_statistics(
        &self,
        key: &SecretString,
        team_id: i64,
        league_id: i64,
        season: i32,
    ) -> Result<Option<Value>, UpstreamError> {
        let params = [
            ("team", team_id.to_string()),
            ("season", season.to_string()),
            ("league", league_id.to_string()),
        ];
        let stats = self.get_response::<Value>(key, "teams/statistics", &params).await?;
        // An empty `response` (`[]` or `{}`) means no statistics.
        Ok(stats.filter(|v| !is_empty_payload(v)))
    }

    async fn head_to_head(
        &self,
        key: &SecretString,
        home_team_id: i64,
        away_team_id: i64,
        last: Option<u32>,
    ) -> Result<Vec<Value>, UpstreamError> {
        let mut params = vec![("h2h", format!("{home_team_id}-{away_team_id}"))];
        if let Some(n) = last {
            params.push(("last", n.to_string()));
        }
        let meetings = self
            .get_response::<Vec<Value>>(key, "fixtures/headtohead", &params)
            .await?;
        Ok(meetings.unwrap_or_default())
    }

    async fn raw(
        &self,
        key: &SecretString,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Value, UpstreamError> {
        let params: Vec<(&str, String)> =
            params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        self.send(key, endpoint, &params).await
    }
}
