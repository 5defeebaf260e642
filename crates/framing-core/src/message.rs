use serde::{Deserialize, Serialize};

/// Metadata about token usage from a model call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Content of an AI message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AIContent {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
}

/// A chat message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "user")]
    User { content: String },

    #[serde(rename = "ai")]
    AI(AIContent),
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Message::AI(AIContent {
            content: content.into(),
            usage: None,
        })
    }

    /// Extract the text content from any message variant.
    pub fn content(&self) -> &str {
        match self {
            Message::User { content } => content,
            Message::AI(ai) => &ai.content,
        }
    }
}
