//! Anthropic Claude API integration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use framing_core::config::{ApiKey, EvalConfig};
use framing_core::error::{FramingError, ModelError, Result};
use framing_core::message::{AIContent, Message, UsageMetadata};
use framing_core::model::{CallOptions, ChatModel, ChatResult};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

// ---------------------------------------------------------------------------
// Anthropic Messages API request/response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    pub content: Vec<AnthropicResponseContent>,
    pub usage: AnthropicUsage,
}

/// Only text blocks matter here; anything else (tool use, thinking) is
/// skipped rather than failing the decode.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicResponseContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicError {
    pub error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicErrorDetail {
    pub message: String,
}

// ---------------------------------------------------------------------------
// ClaudeChatModel
// ---------------------------------------------------------------------------

pub struct ClaudeChatModel {
    api_key: ApiKey,
    model_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl ClaudeChatModel {
    pub fn new(api_key: ApiKey, model_id: impl Into<String>) -> Self {
        Self {
            api_key,
            model_id: model_id.into(),
            base_url: DEFAULT_BASE_URL.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build a model for the configured identifier.
    pub fn from_config(api_key: ApiKey, config: &EvalConfig) -> Self {
        Self::new(api_key, config.model.clone())
    }

    /// Point the client at a different host (proxies, mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    pub fn build_request(&self, messages: &[Message], options: &CallOptions) -> AnthropicRequest {
        let mut api_messages: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            match msg {
                Message::User { content } => {
                    api_messages.push(AnthropicMessage {
                        role: "user".into(),
                        content: content.clone(),
                    });
                }
                Message::AI(ai) => {
                    api_messages.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: ai.content.clone(),
                    });
                }
            }
        }

        AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: api_messages,
            temperature: options.temperature,
            stop_sequences: if options.stop.is_empty() {
                None
            } else {
                Some(options.stop.clone())
            },
        }
    }
}

/// Map a non-success HTTP status and body to a typed model error.
pub fn status_error(status: u16, body: &str, retry_after: Option<u64>) -> ModelError {
    let error_msg = serde_json::from_str::<AnthropicError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    match status {
        401 => ModelError::Auth(error_msg),
        429 => ModelError::RateLimited {
            retry_after_secs: retry_after,
        },
        _ => ModelError::ApiRequest(format!("HTTP {status}: {error_msg}")),
    }
}

/// Concatenate the text blocks of a response.
pub fn response_text(response: &AnthropicResponse) -> Result<String> {
    let text_parts: Vec<&str> = response
        .content
        .iter()
        .filter_map(|block| match block {
            AnthropicResponseContent::Text { text } => Some(text.as_str()),
            AnthropicResponseContent::Other => None,
        })
        .collect();

    if text_parts.is_empty() {
        return Err(FramingError::Model(ModelError::InvalidResponse(
            "response contained no text content".into(),
        )));
    }
    Ok(text_parts.join(""))
}

#[async_trait]
impl ChatModel for ClaudeChatModel {
    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<ChatResult> {
        let request_body = self.build_request(messages, options);
        tracing::debug!(
            model = %request_body.model,
            max_tokens = request_body.max_tokens,
            "sending Anthropic messages request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| FramingError::Model(ModelError::ApiRequest(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            return Err(FramingError::Model(status_error(
                status.as_u16(),
                &body,
                retry_after,
            )));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| FramingError::Model(ModelError::InvalidResponse(e.to_string())))?;

        let text = response_text(&api_response)?;

        let usage = UsageMetadata {
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
            total_tokens: api_response.usage.input_tokens + api_response.usage.output_tokens,
        };

        Ok(ChatResult {
            message: Message::AI(AIContent {
                content: text,
                usage: Some(usage.clone()),
            }),
            usage: Some(usage),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
