//! Model transport.
//!
//! The [`ModelClient`] trait decouples the step loop from the chat endpoint.
//! Tests use scripted clients that replay predetermined turns.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::types::Message;
use crate::io::config::ModelConfig;

/// One model turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    /// Raw response text; empty when the model returned no content.
    pub content: String,
    /// Reasoning trace, empty when the provider returned none.
    pub reasoning: String,
}

/// Abstraction over chat-completion backends.
pub trait ModelClient {
    /// Request one turn over the whole conversation.
    fn complete(&self, conversation: &[Message]) -> Result<ModelReply>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (OpenRouter by default).
pub struct OpenRouterClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    config: ModelConfig,
}

impl OpenRouterClient {
    /// Build a client, reading the bearer key from `config.api_key_env`.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("read API key from ${}", config.api_key_env))?;
        if api_key.trim().is_empty() {
            bail!("${} is empty", config.api_key_env);
        }
        Self::new(config, api_key)
    }

    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            config: config.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<ReasoningRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct ReasoningRequest<'a> {
    effort: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    /// Providers send `null` as well as omitting the field.
    #[serde(default)]
    reasoning_details: Option<Vec<ReasoningDetail>>,
}

#[derive(Debug, Deserialize)]
struct ReasoningDetail {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

impl ModelClient for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.config.model, messages = conversation.len()))]
    fn complete(&self, conversation: &[Message]) -> Result<ModelReply> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: conversation,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            reasoning: self
                .config
                .reasoning_effort
                .as_deref()
                .map(|effort| ReasoningRequest { effort }),
        };

        debug!(endpoint = %self.endpoint, "sending completion request");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .context("send completion request")?;

        let status = response.status();
        let body = response.text().context("read completion response")?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "completion request failed");
            return Err(anyhow!(
                "completion request failed with status {}: {}",
                status.as_u16(),
                body.trim()
            ));
        }
        parse_completion(&body)
    }
}

/// Extract the turn text and reasoning trace from a chat-completions body.
///
/// A `null` content is an empty turn. Reasoning comes from
/// `reasoning_details` (`reasoning.text` and `reasoning.summary` entries,
/// joined by blank lines), falling back to the plain `reasoning` field.
pub fn parse_completion(body: &str) -> Result<ModelReply> {
    let response: ChatResponse =
        serde_json::from_str(body).context("parse completion response")?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("completion response has no choices"))?;
    let message = choice.message;

    let parts: Vec<String> = message
        .reasoning_details
        .unwrap_or_default()
        .into_iter()
        .filter_map(|detail| match detail.kind.as_deref() {
            Some("reasoning.text") => detail.text,
            Some("reasoning.summary") => detail.summary,
            _ => None,
        })
        .collect();
    let reasoning = if parts.is_empty() {
        message.reasoning.unwrap_or_default()
    } else {
        parts.join("\n\n")
    };

    Ok(ModelReply {
        content: message.content.unwrap_or_default(),
        reasoning: reasoning.trim().to_string(),
    })
}
