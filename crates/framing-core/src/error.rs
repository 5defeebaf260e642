use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the framing evaluator.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Prompt source error: {0}")]
    Source(#[from] SourceError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no API key found: set {var} in the environment or a .env file")]
    MissingCredential { var: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures while loading prompt pairs. All of these abort before any
/// model call is made.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed prompt source {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("missing required field '{field}' in pair {pair}")]
    MissingField { field: String, pair: String },

    #[error("invalid field '{field}' in pair {pair}: {reason}")]
    InvalidField {
        field: String,
        pair: String,
        reason: String,
    },

    #[error("duplicate pair id '{0}'")]
    DuplicateId(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("API request failed: {0}")]
    ApiRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {message}")]
    Csv { path: PathBuf, message: String },

    #[error("JSON error in {path}: {message}")]
    Json { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, FramingError>;
