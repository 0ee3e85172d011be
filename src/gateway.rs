//! Authenticated proxy to the LLM and football data providers.
//!
//! Mobile clients never hold provider keys. They call these operations
//! with a Firebase ID token; the gateway checks the caller, validates the
//! input, reads the key from remote config and forwards the call.
//!
//! Checks run in a fixed order: caller, then input, then secrets. Nothing
//! reaches a provider until all three pass.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::{require_caller, Caller};
use crate::config::SecretsConfig;
use crate::data::FootballApi;
use crate::error::ServiceError;
use crate::llm::{InlineImage, LlmApi};
use crate::storage::{read_secret, KeyValueStore};

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LlmResponse {
    pub success: bool,
    pub text: String,
    pub usage: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct FootballRequest {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct FootballResponse {
    pub success: bool,
    pub data: Value,
}

/// Decode a callable `data` payload. A missing payload reads as `{}`.
pub fn parse_request<T: DeserializeOwned>(data: Value) -> Result<T, ServiceError> {
    let data = if data.is_null() { Value::Object(Map::new()) } else { data };
    serde_json::from_value(data)
        .map_err(|e| ServiceError::invalid_argument(format!("Malformed request: {e}")))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate an inline image. Accepts a bare base64 payload or a
/// `data:<mime>;base64,<payload>` URL, whose mime type wins.
pub fn parse_image(raw: &str, mime_type: Option<&str>) -> Result<InlineImage, ServiceError> {
    let (url_mime, payload) = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| ServiceError::invalid_argument("Malformed data URL"))?;
            let mime = header.strip_suffix(";base64").ok_or_else(|| {
                ServiceError::invalid_argument("Only base64 data URLs are supported")
            })?;
            (Some(mime.to_string()), payload)
        }
        None => (None, raw),
    };

    let data: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if data.is_empty() {
        return Err(ServiceError::invalid_argument("Image payload is empty"));
    }
    BASE64
        .decode(data.as_bytes())
        .map_err(|_| ServiceError::invalid_argument("Image is not valid base64"))?;

    let mime_type = url_mime
        .filter(|m| !m.is_empty())
        .or_else(|| mime_type.filter(|m| !m.trim().is_empty()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());

    Ok(InlineImage { mime_type, data })
}

/// Relative provider path, leading slashes dropped.
pub fn validate_endpoint(raw: &str) -> Result<String, ServiceError> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(ServiceError::invalid_argument("endpoint is required"));
    }
    if endpoint.contains("://") || endpoint.starts_with("//") {
        return Err(ServiceError::invalid_argument("endpoint must be a relative path"));
    }
    if endpoint.split(['/', '?']).any(|seg| seg == "..") {
        return Err(ServiceError::invalid_argument("endpoint must not contain '..'"));
    }
    Ok(endpoint.trim_start_matches('/').to_string())
}

/// Query parameters as strings. Nulls are dropped; nested values rejected.
pub fn stringify_params(params: Map<String, Value>) -> Result<BTreeMap<String, String>, ServiceError> {
    let mut out = BTreeMap::new();
    for (name, value) in params {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(ServiceError::invalid_argument(format!(
                    "Parameter '{name}' must be a scalar"
                )))
            }
        };
        out.insert(name, text);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct ProxyGateway {
    store: Arc<dyn KeyValueStore>,
    llm: Arc<dyn LlmApi>,
    football: Arc<dyn FootballApi>,
    secrets: SecretsConfig,
}

impl ProxyGateway {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        llm: Arc<dyn LlmApi>,
        football: Arc<dyn FootballApi>,
        secrets: SecretsConfig,
    ) -> Self {
        Self { store, llm, football, secrets }
    }

    async fn secret(&self, name: &str) -> Result<SecretString, ServiceError> {
        match read_secret(self.store.as_ref(), name).await {
            Ok(Some(key)) => Ok(key),
            Ok(None) => {
                error!(secret = name, "Secret missing from remote config");
                Err(ServiceError::internal(format!("{name} is not configured")))
            }
            Err(e) => {
                error!(secret = name, error = %e, "Secret lookup failed");
                Err(ServiceError::internal("Could not load server configuration"))
            }
        }
    }

    /// Forward a prompt (and optional image) to the LLM.
    pub async fn call_llm(&self, caller: Option<&Caller>, data: Value) -> Result<LlmResponse, ServiceError> {
        let caller = require_caller(caller)?;
        let req: LlmRequest = parse_request(data)?;

        let prompt = req
            .prompt
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ServiceError::invalid_argument("prompt is required"))?;
        let image = match req.image_base64.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(parse_image(raw, req.mime_type.as_deref())?),
            None => None,
        };

        let key = self.secret(&self.secrets.gemini_key).await?;

        info!(
            uid = %caller.uid,
            model = self.llm.model_name(),
            prompt_chars = prompt.chars().count(),
            has_image = image.is_some(),
            "LLM proxy call"
        );
        let completion = self
            .llm
            .generate(&key, &prompt, image.as_ref())
            .await
            .map_err(|e| {
                error!(uid = %caller.uid, error = %e, "LLM call failed");
                ServiceError::internal(format!("LLM call failed: {e}"))
            })?;

        Ok(LlmResponse { success: true, text: completion.text, usage: completion.usage })
    }

    /// Forward a GET to the football data provider.
    pub async fn call_football(
        &self,
        caller: Option<&Caller>,
        data: Value,
    ) -> Result<FootballResponse, ServiceError> {
        let caller = require_caller(caller)?;
        let req: FootballRequest = parse_request(data)?;

        let endpoint = validate_endpoint(req.endpoint.as_deref().unwrap_or_default())?;
        let params = stringify_params(req.params.unwrap_or_default())?;

        let key = self.secret(&self.secrets.football_key).await?;

        info!(uid = %caller.uid, %endpoint, ?params, "Football proxy call");
        let payload = self.football.raw(&key, &endpoint, &params).await.map_err(|e| {
            error!(uid = %caller.uid, %endpoint, error = %e, "Football call failed");
            ServiceError::internal(format!("Football API call failed: {e}"))
        })?;

        Ok(FootballResponse { success: true, data: payload })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
