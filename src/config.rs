use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::CitypulseError;
use crate::retrieval::Strategy;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub citypulse: CitypulseConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Data locations
#[derive(Debug, Clone, Deserialize)]
pub struct CitypulseConfig {
    /// Graph definition file (.json / .yaml / .yml).
    pub graph_path: PathBuf,
    /// Folder holding one file per corpus.
    pub corpus_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Reasoning oracle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            temperature: 0.0,
        }
    }
}

/// Local embedding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default)]
    pub min_score: f32,
    /// Strategy for corpora not listed in `strategies`.
    #[serde(default = "default_strategy")]
    pub default_strategy: Strategy,
    /// Corpus name → strategy.
    #[serde(default)]
    pub strategies: HashMap<String, Strategy>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            min_score: 0.0,
            default_strategy: default_strategy(),
            strategies: HashMap::new(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Ticks run at the same time by `run_ticks`.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_vehicle_corpus")]
    pub vehicle_corpus: String,
    #[serde(default = "default_case_corpus")]
    pub case_corpus: String,
    #[serde(default = "default_policy_corpus")]
    pub policy_corpus: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            vehicle_corpus: default_vehicle_corpus(),
            case_corpus: default_case_corpus(),
            policy_corpus: default_policy_corpus(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> usize {
    3
}

fn default_dimensions() -> usize {
    384
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_k() -> usize {
    3
}

fn default_strategy() -> Strategy {
    Strategy::Dense
}

fn default_concurrency() -> usize {
    4
}

fn default_vehicle_corpus() -> String {
    "incident_cases".to_string()
}

fn default_case_corpus() -> String {
    "incident_cases".to_string()
}

fn default_policy_corpus() -> String {
    "policies".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in CITYPULSE_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("CITYPULSE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::load_from(&config_path)
    }

    /// Load and validate a specific config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&config_str)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Paths are checked when the graph and corpora are loaded, and the API key
    /// only when an oracle is built, so offline commands work without either.
    fn validate(&self) -> Result<()> {
        if self.oracle.provider != "openai" {
            anyhow::bail!(
                "oracle.provider '{}' is not supported (expected \"openai\")",
                self.oracle.provider
            );
        }

        if self.oracle.timeout_ms == 0 {
            anyhow::bail!("oracle.timeout_ms must be greater than 0");
        }

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        if self.retrieval.default_k == 0 {
            anyhow::bail!("retrieval.default_k must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            anyhow::bail!("retrieval.min_score must be between 0.0 and 1.0");
        }

        if self.pipeline.concurrency == 0 {
            anyhow::bail!("pipeline.concurrency must be greater than 0");
        }

        Ok(())
    }

    /// Read the oracle API key from the configured environment variable.
    pub fn oracle_api_key(&self) -> crate::Result<String> {
        std::env::var(&self.oracle.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                CitypulseError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                    self.oracle.api_key_env
                ))
            })
    }

    pub fn graph_path(&self) -> &Path {
        &self.citypulse.graph_path
    }

    pub fn corpus_dir(&self) -> &Path {
        &self.citypulse.corpus_dir
    }

    pub fn oracle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.oracle.timeout_ms)
    }
}
