use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use framing_core::error::{Result, SourceError};

use crate::record::FramingType;

/// Top-level key holding the array of pairs.
pub const PAIRS_KEY: &str = "prompt_pairs";

/// Fields every pair object must carry as non-empty strings.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "id",
    "category",
    "base_question",
    "neutral_framing",
    "invested_framing",
];

/// One experimental unit: a base question asked two ways.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPair {
    /// Unique identifier, stable across runs.
    pub id: String,
    /// Label grouping pairs by hypothesis type.
    pub category: String,
    /// The underlying question, for display and grouping.
    pub base_question: String,
    /// Prompt text for the neutral condition.
    pub neutral_framing: String,
    /// Prompt text for the emotionally invested condition.
    pub invested_framing: String,
}

impl PromptPair {
    /// Prompt text sent for the given framing.
    pub fn framing(&self, framing: FramingType) -> &str {
        match framing {
            FramingType::Neutral => &self.neutral_framing,
            FramingType::Invested => &self.invested_framing,
        }
    }
}

/// An ordered collection of prompt pairs, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPairSet {
    pub prompt_pairs: Vec<PromptPair>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Format::Yaml
            }
            _ => Format::Json,
        }
    }
}

impl PromptPairSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pair(&mut self, pair: PromptPair) -> &mut Self {
        self.prompt_pairs.push(pair);
        self
    }

    pub fn len(&self) -> usize {
        self.prompt_pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_pairs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PromptPair> {
        self.prompt_pairs.iter()
    }

    /// Load and validate pairs from a JSON or YAML file (chosen by extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let set = match Format::from_path(path) {
            Format::Json => parse_json(&text, path)?,
            Format::Yaml => parse_yaml(&text, path)?,
        };
        tracing::info!(path = %path.display(), pairs = set.len(), "loaded prompt pairs");
        Ok(set)
    }

    /// Parse and validate from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        parse_json(json, Path::new("<inline>"))
    }

    /// Parse and validate from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        parse_yaml(yaml, Path::new("<inline>"))
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<'a> IntoIterator for &'a PromptPairSet {
    type Item = &'a PromptPair;
    type IntoIter = std::slice::Iter<'a, PromptPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.prompt_pairs.iter()
    }
}

/// Load the ordered pair sequence from `path`. Fails on the first invalid
/// record; a partially valid source yields nothing.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<PromptPair>> {
    Ok(PromptPairSet::load(path)?.prompt_pairs)
}

fn malformed(origin: &Path, message: impl Into<String>) -> SourceError {
    SourceError::Malformed {
        path: origin.to_path_buf(),
        message: message.into(),
    }
}

fn parse_json(text: &str, origin: &Path) -> Result<PromptPairSet> {
    let value: Value = serde_json::from_str(text).map_err(|e| malformed(origin, e.to_string()))?;
    from_value(value, origin)
}

fn parse_yaml(text: &str, origin: &Path) -> Result<PromptPairSet> {
    let value: Value = serde_yaml::from_str(text).map_err(|e| malformed(origin, e.to_string()))?;
    from_value(value, origin)
}

fn from_value(value: Value, origin: &Path) -> Result<PromptPairSet> {
    validate(&value, origin)?;
    serde_json::from_value(value).map_err(|e| malformed(origin, e.to_string()).into())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Structural checks with field-level diagnostics, run before the typed
/// decode so errors name the offending pair.
fn validate(value: &Value, origin: &Path) -> std::result::Result<(), SourceError> {
    let pairs = value
        .get(PAIRS_KEY)
        .ok_or_else(|| malformed(origin, format!("missing top-level key '{PAIRS_KEY}'")))?
        .as_array()
        .ok_or_else(|| malformed(origin, format!("'{PAIRS_KEY}' must be an array")))?;

    let mut seen: HashSet<&str> = HashSet::new();
    for (index, item) in pairs.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| malformed(origin, format!("pair #{index} is not an object")))?;

        let label = match obj.get("id").and_then(Value::as_str) {
            Some(id) if !id.trim().is_empty() => format!("'{id}'"),
            _ => format!("#{index}"),
        };

        for field in REQUIRED_FIELDS {
            match obj.get(field) {
                None | Some(Value::Null) => {
                    return Err(SourceError::MissingField {
                        field: field.into(),
                        pair: label,
                    });
                }
                Some(Value::String(s)) if s.trim().is_empty() => {
                    return Err(SourceError::InvalidField {
                        field: field.into(),
                        pair: label,
                        reason: "must not be empty".into(),
                    });
                }
                Some(Value::String(_)) => {}
                Some(other) => {
                    return Err(SourceError::InvalidField {
                        field: field.into(),
                        pair: label,
                        reason: format!("expected a string, found {}", json_type(other)),
                    });
                }
            }
        }

        // Checked above: id is a non-empty string.
        if let Some(id) = obj.get("id").and_then(Value::as_str) {
            if !seen.insert(id) {
                return Err(SourceError::DuplicateId(id.into()));
            }
        }
    }
    Ok(())
}
