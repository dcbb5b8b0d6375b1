//! Error types for the evaluation harness.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while evaluating, recording or reporting runs.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The dataset file is missing, malformed or empty.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// The answer generator failed for a question.
    #[error("Answer generation failed: {0}")]
    Generation(String),

    /// A judge response could not be turned into a score.
    #[error("Failed to parse judge response: {0}")]
    JudgeParse(String),

    /// Writing or reading a rationale document failed.
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// The tracking store cannot be used.
    #[error("Tracking store unavailable at '{path}': {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    /// Caller passed an argument that violates an input constraint.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No experiment with the given name or id.
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    /// No run with the given id.
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// A write was attempted on a run that has already ended.
    #[error("Run {0} is sealed and accepts no further writes")]
    RunSealed(String),

    /// A param was re-logged with a different value.
    #[error("Param '{key}' on run {run_id} is already set to '{existing}'")]
    ParamConflict {
        run_id: String,
        key: String,
        existing: String,
    },

    /// A score outside `[0, 1]` or not finite.
    #[error("Score for '{key}' must be a finite value in [0, 1], got {value}")]
    InvalidScore { key: String, value: f64 },

    /// A report asked for a metric that is not in the table.
    #[error("Unknown metric '{0}'")]
    UnknownMetric(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for EvalError {
    fn from(err: reqwest::Error) -> Self {
        EvalError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}
