//! LLM integration for the client-facing prompt proxy.
//!
//! Defines the [`LlmApi`] trait and the Gemini implementation. The proxy
//! forwards a prompt (and optionally one inline image) and hands back the
//! first candidate's text plus the provider's usage block untouched.

pub mod gemini;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;

/// A base64 image sent alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64 payload, already validated.
    pub data: String,
}

/// Generated text plus the provider's usage accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Provider usage block as returned, `Null` when absent.
    pub usage: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("no candidate text in response")]
    Empty,
}

/// Abstraction over text generation providers.
#[async_trait]
pub trait LlmApi: Send + Sync {
    async fn generate(
        &self,
        key: &SecretString,
        prompt: &str,
        image: Option<&InlineImage>,
    ) -> Result<Completion, LlmError>;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}
