use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::model::CallOptions;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_OUTPUT_DIR: &str = "results";
pub const DEFAULT_API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Configuration for one evaluation run.
///
/// Built once at startup and handed to the model adapter and the runner;
/// nothing below the binary reads the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Model identifier sent to the service and recorded on every result.
    pub model: String,

    /// Output-length budget for each call.
    pub max_tokens: u32,

    /// Sampling temperature; the service default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Directory receiving the JSON and CSV artifacts.
    pub output_dir: PathBuf,

    /// Environment variable holding the service credential.
    pub api_key_var: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            api_key_var: DEFAULT_API_KEY_VAR.into(),
        }
    }
}

impl EvalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_api_key_var(mut self, var: impl Into<String>) -> Self {
        self.api_key_var = var.into();
        self
    }

    /// Reject values the service would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model identifier is empty".into()).into());
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens must be greater than 0".into()).into());
        }
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigError::Invalid(format!(
                    "temperature {t} is outside 0.0..=1.0"
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Per-call options derived from this configuration.
    pub fn call_options(&self) -> CallOptions {
        CallOptions {
            max_tokens: Some(self.max_tokens),
            temperature: self.temperature,
            stop: Vec::new(),
        }
    }
}

/// A resolved service credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Resolve the credential named `var` through `lookup`.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; tests pass a closure
    /// over a fixed map. Blank values count as missing.
    pub fn resolve<F>(var: &str, lookup: F) -> Result<Self>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        match lookup(var) {
            Some(key) if !key.trim().is_empty() => {
                tracing::debug!(var, "resolved API credential");
                Ok(Self(key.trim().to_string()))
            }
            _ => Err(ConfigError::MissingCredential { var: var.into() }.into()),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}
