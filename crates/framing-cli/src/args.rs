use std::path::PathBuf;

use clap::Parser;

use framing_core::config::{
    DEFAULT_API_KEY_VAR, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_OUTPUT_DIR, EvalConfig,
};

/// Probe whether a model answers differently when the same question is
/// asked neutrally or with emotional investment.
#[derive(Debug, Parser)]
#[command(name = "framing", version, about)]
pub struct Cli {
    /// JSON or YAML file with a top-level `prompt_pairs` array.
    #[arg(long, env = "FRAMING_PROMPTS", default_value = "prompt_pairs.json")]
    pub prompts: PathBuf,

    /// Directory receiving evaluation_<stamp>.json and .csv.
    #[arg(long, env = "FRAMING_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Model identifier sent to the service.
    #[arg(long, env = "FRAMING_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Output-token budget per call.
    #[arg(long, env = "FRAMING_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Sampling temperature (service default when omitted).
    #[arg(long, env = "FRAMING_TEMPERATURE")]
    pub temperature: Option<f64>,

    /// Environment variable holding the API key.
    #[arg(long, default_value = DEFAULT_API_KEY_VAR)]
    pub api_key_env: String,

    /// Override the service base URL.
    #[arg(long, env = "FRAMING_BASE_URL")]
    pub base_url: Option<String>,
}

impl Cli {
    pub fn eval_config(&self) -> EvalConfig {
        let mut config = EvalConfig::new()
            .with_model(self.model.clone())
            .with_max_tokens(self.max_tokens)
            .with_output_dir(self.output_dir.clone())
            .with_api_key_var(self.api_key_env.clone());
        if let Some(t) = self.temperature {
            config = config.with_temperature(t);
        }
        config
    }
}
