//! Google Gemini integration.
//!
//! Calls `models/{model}:generateContent` on the Generative Language API.
//! The key travels in the query string, so every transport error is
//! stripped of its URL before it goes anywhere.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Completion, InlineImage, LlmApi, LlmError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const TEMPERATURE: f32 = 0.7;
const TOP_K: u32 = 40;
const TOP_P: f32 = 0.95;
const MAX_OUTPUT_TOKENS: u32 = 2048;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.without_url().to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

fn build_request<'a>(prompt: &'a str, image: Option<&'a InlineImage>) -> GenerateRequest<'a> {
    let mut parts = vec![Part::Text { text: prompt }];
    if let Some(img) = image {
        parts.push(Part::Inline {
            inline_data: InlineData { mime_type: &img.mime_type, data: &img.data },
        });
    }
    GenerateRequest {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            top_k: TOP_K,
            top_p: TOP_P,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
    }
}

/// Text of the first candidate, parts joined.
fn first_candidate_text(body: &GenerateResponse) -> Option<String> {
    let parts = &body.candidates.first()?.content.as_ref()?.parts;
    let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl LlmApi for GeminiClient {
    async fn generate(
        &self,
        key: &SecretString,
        prompt: &str,
        image: Option<&InlineImage>,
    ) -> Result<Completion, LlmError> {
        let request = build_request(prompt, image);
        debug!(model = %self.model, has_image = image.is_some(), "Gemini request");

        let resp = self
            .http
            .post(self.endpoint())
            .query(&[("key", key.expose_secret().as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&raw)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(raw);
            warn!(status = %status, error = %message, "Gemini API error");
            return Err(LlmError::Status { status: status.as_u16(), message });
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.without_url().to_string()))?;

        let text = first_candidate_text(&body).ok_or(LlmError::Empty)?;
        Ok(Completion {
            text,
            usage: body.usage_metadata.unwrap_or(Value::Null),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
