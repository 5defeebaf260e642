use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use framing_core::error::{FramingError, Result};
use framing_core::model::ChatResult;

use crate::pairs::PromptPair;

/// Prefix stored in place of a response when the call failed.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Which phrasing of a pair was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingType {
    Neutral,
    Invested,
}

impl FramingType {
    /// Order in which the two framings of a pair are submitted.
    pub const ORDER: [FramingType; 2] = [FramingType::Neutral, FramingType::Invested];

    pub fn as_str(&self) -> &'static str {
        match self {
            FramingType::Neutral => "neutral",
            FramingType::Invested => "invested",
        }
    }
}

impl fmt::Display for FramingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The observed outcome of one call. Field order is the column order of
/// the CSV artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub prompt_id: String,
    pub category: String,
    pub base_question: String,
    pub framing_type: FramingType,
    /// Exact text sent to the model.
    pub full_prompt: String,
    /// Model text, or `ERROR: <description>` when the call failed.
    pub response: String,
    /// When this particular call was issued.
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "model")]
    pub model_identifier: String,
}

impl ResultRecord {
    /// Build the record for one call from its outcome. Failures become the
    /// error marker; nothing is dropped.
    pub fn from_outcome(
        pair: &PromptPair,
        framing: FramingType,
        timestamp: DateTime<Utc>,
        model_identifier: &str,
        outcome: &Result<ChatResult>,
    ) -> Self {
        let response = match outcome {
            Ok(result) => result.message.content().to_string(),
            Err(err) => error_marker(err),
        };
        Self {
            prompt_id: pair.id.clone(),
            category: pair.category.clone(),
            base_question: pair.base_question.clone(),
            framing_type: framing,
            full_prompt: pair.framing(framing).to_string(),
            response,
            timestamp,
            model_identifier: model_identifier.to_string(),
        }
    }

    /// Whether the stored response carries the error marker. A model reply
    /// that itself begins with `ERROR:` is indistinguishable here; the
    /// runner counts failures from call outcomes instead.
    pub fn is_error(&self) -> bool {
        self.response.starts_with(ERROR_PREFIX.trim_end())
    }
}

pub fn error_marker(err: &FramingError) -> String {
    format!("{ERROR_PREFIX}{err}")
}
