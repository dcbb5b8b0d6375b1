//! Configuration for the evaluation harness.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{EvalError, Result};
use crate::tracking::RationaleMode;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Prefix shared by every experiment this harness writes.
pub const EXPERIMENT_PREFIX: &str = "eval_";

/// LLM configuration (used by the judge and the direct generator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-mini")
    pub model: String,

    /// Maximum tokens for response (optional)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation (optional)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Parameters of the configuration sweep a batch belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSettings {
    /// Prompt version of the chain under test; names the experiment.
    pub prompt_version: String,
    /// Chunk size the chain's index was built with.
    pub chunk_size: u32,
    /// Chunk overlap the chain's index was built with.
    pub chunk_overlap: u32,
    /// Question/answer dataset to evaluate.
    pub dataset_path: PathBuf,
    /// Criteria to score, by name. Empty means the default set.
    #[serde(default)]
    pub criteria: Vec<String>,
    /// Where rationales are stored.
    #[serde(default)]
    pub rationale_mode: RationaleMode,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            prompt_version: "v1_asistente_geotecnia".to_string(),
            chunk_size: 512,
            chunk_overlap: 50,
            dataset_path: PathBuf::from("data/eval_dataset.json"),
            criteria: Vec::new(),
            rationale_mode: RationaleMode::default(),
        }
    }
}

impl EvalSettings {
    /// Experiment name for this configuration, `eval_<prompt_version>`.
    pub fn experiment_name(&self) -> String {
        format!("{}{}", EXPERIMENT_PREFIX, self.prompt_version)
    }
}

/// Location of the file-backed tracking store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub root: PathBuf,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("mlruns"),
        }
    }
}

/// Answer generator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// URL of the chain's `invoke` endpoint. When unset the LLM answers directly.
    pub endpoint: Option<String>,
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM settings
    pub llm: LlmConfig,
    /// Evaluation sweep settings
    pub eval: EvalSettings,
    /// Tracking store settings
    pub tracking: TrackingConfig,
    /// Generator settings
    pub generator: GeneratorConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    eval: Option<EvalFileSection>,
    tracking: Option<TrackingFileSection>,
    generator: Option<GeneratorConfig>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EvalFileSection {
    prompt_version: Option<String>,
    chunk_size: Option<u32>,
    chunk_overlap: Option<u32>,
    dataset_path: Option<PathBuf>,
    criteria: Option<Vec<String>>,
    rationale_mode: Option<RationaleMode>,
}

#[derive(Debug, Deserialize)]
struct TrackingFileSection {
    root: Option<PathBuf>,
}

/// Read an environment variable and parse it, failing loudly on bad values.
fn env_parsed<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| EvalError::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (PROMPT_VERSION, CHUNK_SIZE, LLM_API_KEY, ...)
    /// 2. Config file (~/.config/rag-eval/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from the process environment.
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }
        if let Ok(api_key) = env::var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(max_tokens) = env_parsed("LLM_MAX_TOKENS")? {
            self.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = env_parsed("LLM_TEMPERATURE")? {
            self.llm.temperature = temperature;
        }
        if let Some(timeout) = env_parsed("LLM_TIMEOUT_SECS")? {
            self.llm.timeout_secs = timeout;
        }

        if let Ok(prompt_version) = env::var("PROMPT_VERSION") {
            self.eval.prompt_version = prompt_version;
        }
        if let Some(chunk_size) = env_parsed("CHUNK_SIZE")? {
            self.eval.chunk_size = chunk_size;
        }
        if let Some(chunk_overlap) = env_parsed("CHUNK_OVERLAP")? {
            self.eval.chunk_overlap = chunk_overlap;
        }
        if let Ok(path) = env::var("EVAL_DATASET") {
            self.eval.dataset_path = PathBuf::from(path);
        }
        if let Ok(criteria) = env::var("EVAL_CRITERIA") {
            self.eval.criteria = criteria
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(mode) = env_parsed("RATIONALE_MODE")? {
            self.eval.rationale_mode = mode;
        }

        if let Ok(root) = env::var("TRACKING_DIR") {
            self.tracking.root = PathBuf::from(root);
        }
        if let Ok(endpoint) = env::var("CHAIN_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.generator.endpoint = Some(endpoint);
            }
        }

        Ok(())
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML configuration document on top of the defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                config.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(eval) = file_config.eval {
            if let Some(prompt_version) = eval.prompt_version {
                config.eval.prompt_version = prompt_version;
            }
            if let Some(chunk_size) = eval.chunk_size {
                config.eval.chunk_size = chunk_size;
            }
            if let Some(chunk_overlap) = eval.chunk_overlap {
                config.eval.chunk_overlap = chunk_overlap;
            }
            if let Some(dataset_path) = eval.dataset_path {
                config.eval.dataset_path = dataset_path;
            }
            if let Some(criteria) = eval.criteria {
                config.eval.criteria = criteria;
            }
            if let Some(mode) = eval.rationale_mode {
                config.eval.rationale_mode = mode;
            }
        }

        if let Some(tracking) = file_config.tracking {
            if let Some(root) = tracking.root {
                config.tracking.root = root;
            }
        }

        if let Some(generator) = file_config.generator {
            config.generator = generator;
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-eval")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate the LLM settings needed to call the judge.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(EvalError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(EvalError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(EvalError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        self.validate_eval()
    }

    /// Validate the sweep parameters only (no LLM needed, e.g. for reports).
    pub fn validate_eval(&self) -> Result<()> {
        if self.eval.prompt_version.trim().is_empty() {
            return Err(EvalError::Config("PROMPT_VERSION must not be empty".to_string()));
        }

        if self.eval.chunk_size == 0 {
            return Err(EvalError::Config("CHUNK_SIZE must be positive".to_string()));
        }

        if self.eval.chunk_overlap >= self.eval.chunk_size {
            return Err(EvalError::Config(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.eval.chunk_overlap, self.eval.chunk_size
            )));
        }

        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
