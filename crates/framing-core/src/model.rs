use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{Message, UsageMetadata};

/// Options controlling a ChatModel invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallOptions {
    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 1.0 for Anthropic models).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// Result of a chat model generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    /// The generated message.
    pub message: Message,

    /// Token usage metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
}

/// Trait for chat language models.
///
/// This is the only capability the evaluator needs from a text-generation
/// service: submit messages, get text back or a typed failure. Vendor
/// adapters live in `framing-llm`; tests substitute in-memory fakes.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a response for the given messages.
    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<ChatResult>;

    /// Return the model name/identifier.
    fn model_name(&self) -> &str;
}
