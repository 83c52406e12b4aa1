//! Configuration structures and loading.

use crate::error::{ConfigError, ConfigResult};
use crate::paths::AppPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Smallest accepted embedding batch size.
pub const MIN_EMBEDDING_BATCH_SIZE: usize = 15;
/// Largest accepted embedding batch size.
pub const MAX_EMBEDDING_BATCH_SIZE: usize = 40;
/// Targets may use at most this percentage of the provider's hard limits.
pub const MAX_LIMIT_PERCENT: u64 = 70;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Load configuration from the default location, then apply `RAGLINE_*` overrides.
    pub fn load() -> ConfigResult<Self> {
        let paths = AppPaths::new().ok_or(ConfigError::NoConfigDir)?;
        let mut config = Self::load_from(&paths.config_file)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let contents = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Create a default config file with comments.
    pub fn create_default_file(path: &Path) -> ConfigResult<()> {
        let default_config = Self::default_config_string();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, default_config)?;
        Ok(())
    }

    /// Generate a default config file with helpful comments.
    pub fn default_config_string() -> String {
        r#"# Ragline Configuration
# Concurrent document ingestion for retrieval-augmented chat

[general]
# Data directory for the ledger database and run reports
# data_dir = "~/.local/share/ragline"

# Seconds to wait for a busy database before giving up
db_timeout_seconds = 10

# Log file, relative to the data directory unless absolute ("" disables)
log_file = "ragline.log"

[embedding]
# Provider: "openai" (any OpenAI-compatible endpoint) or "ollama"
provider = "openai"

# Embedding model name
model = "text-embedding-3-small"

# Override the provider endpoint
# base_url = "https://api.openai.com/v1"

# Environment variable holding the API key
api_key_env = "OPENAI_API_KEY"

# Request timeout in seconds
timeout_seconds = 30

[ingest]
# Characters per chunk and characters shared by consecutive chunks
chunk_size = 1024
chunk_overlap = 200

# Chunks per embedding request (15-40)
embedding_batch_size = 20

# Worker threads
workers = 5

# Attempts per embedding request
max_retries = 5

# Files producing fewer chunks are reported as suspicious
min_chunks_per_file = 5

# Re-ingest documents that are already registered
force_reindex = false

# Seconds before another run's unfinished claim on a document may be taken over
stale_claim_seconds = 900

[rate_limit]
# Provider hard limits
rpm_limit = 5000
tpm_limit = 5000000

# Targets enforced by the pipeline (at most 70% of the limits)
rpm_target = 2850
tpm_target = 2850000
"#
        .to_string()
    }

    /// Apply `RAGLINE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ingest = &mut self.ingest;
        override_value(&lookup, "RAGLINE_CHUNK_SIZE", &mut ingest.chunk_size)?;
        override_value(&lookup, "RAGLINE_CHUNK_OVERLAP", &mut ingest.chunk_overlap)?;
        override_value(&lookup, "RAGLINE_EMBEDDING_BATCH_SIZE", &mut ingest.embedding_batch_size)?;
        override_value(&lookup, "RAGLINE_WORKERS", &mut ingest.workers)?;
        override_value(&lookup, "RAGLINE_MAX_RETRIES", &mut ingest.max_retries)?;
        override_value(&lookup, "RAGLINE_MIN_CHUNKS_PER_FILE", &mut ingest.min_chunks_per_file)?;
        override_value(&lookup, "RAGLINE_FORCE_REINDEX", &mut ingest.force_reindex)?;
        override_value(&lookup, "RAGLINE_STALE_CLAIM_SECONDS", &mut ingest.stale_claim_seconds)?;

        let rate = &mut self.rate_limit;
        override_value(&lookup, "RAGLINE_RPM_TARGET", &mut rate.rpm_target)?;
        override_value(&lookup, "RAGLINE_TPM_TARGET", &mut rate.tpm_target)?;

        if let Some(model) = lookup("RAGLINE_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(log_file) = lookup("RAGLINE_LOG_FILE") {
            self.general.log_file = Some(log_file);
        }
        Ok(())
    }

    /// Check option ranges and cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        let ingest = &self.ingest;
        if ingest.chunk_size == 0 {
            return Err(ConfigError::Invalid("ingest.chunk_size must be positive".into()));
        }
        if ingest.chunk_overlap >= ingest.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                ingest.chunk_overlap, ingest.chunk_size
            )));
        }
        if !(MIN_EMBEDDING_BATCH_SIZE..=MAX_EMBEDDING_BATCH_SIZE).contains(&ingest.embedding_batch_size) {
            return Err(ConfigError::Invalid(format!(
                "ingest.embedding_batch_size must be between {} and {}, got {}",
                MIN_EMBEDDING_BATCH_SIZE, MAX_EMBEDDING_BATCH_SIZE, ingest.embedding_batch_size
            )));
        }
        if ingest.workers == 0 {
            return Err(ConfigError::Invalid("ingest.workers must be at least 1".into()));
        }
        if ingest.max_retries == 0 {
            return Err(ConfigError::Invalid("ingest.max_retries must be at least 1".into()));
        }

        let rate = &self.rate_limit;
        if rate.rpm_target == 0 || rate.tpm_target == 0 {
            return Err(ConfigError::Invalid("rate_limit targets must be positive".into()));
        }
        if u64::from(rate.rpm_target) * 100 > u64::from(rate.rpm_limit) * MAX_LIMIT_PERCENT {
            return Err(ConfigError::Invalid(format!(
                "rate_limit.rpm_target ({}) exceeds 70% of rpm_limit ({})",
                rate.rpm_target, rate.rpm_limit
            )));
        }
        if rate.tpm_target.saturating_mul(100) > rate.tpm_limit.saturating_mul(MAX_LIMIT_PERCENT) {
            return Err(ConfigError::Invalid(format!(
                "rate_limit.tpm_target ({}) exceeds 70% of tpm_limit ({})",
                rate.tpm_target, rate.tpm_limit
            )));
        }

        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Invalid("embedding.model must not be empty".into()));
        }
        Ok(())
    }

    /// Resolve application paths, honoring `general.data_dir`.
    pub fn paths(&self) -> ConfigResult<AppPaths> {
        let paths = AppPaths::new().ok_or(ConfigError::NoConfigDir)?;
        Ok(match &self.general.data_dir {
            Some(dir) => paths.with_data_dir(dir),
            None => paths,
        })
    }

    /// Where the log file goes, or `None` when file logging is disabled.
    ///
    /// A relative `general.log_file` is placed under the data directory.
    pub fn log_file_path(&self) -> ConfigResult<Option<PathBuf>> {
        let name = match self.general.log_file.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => return Ok(None),
        };

        let path = PathBuf::from(shellexpand::tilde(name).into_owned());
        if path.is_absolute() {
            return Ok(Some(path));
        }
        Ok(Some(self.paths()?.data_dir.join(path)))
    }
}

fn override_value<T, F>(lookup: &F, var: &str, slot: &mut T) -> ConfigResult<()>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(var) {
        let parsed = raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidOverride {
            var: var.to_string(),
            value: raw.clone(),
        })?;
        debug!("Config override {}={}", var, raw);
        *slot = parsed;
    }
    Ok(())
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub data_dir: Option<String>,
    pub db_timeout_seconds: u64,
    pub log_file: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            db_timeout_seconds: 10,
            log_file: Some("ragline.log".to_string()),
        }
    }
}

/// Which embedding API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    OpenAi,
    Ollama,
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingProvider::OpenAi => "openai",
            EmbeddingProvider::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            EmbeddingProvider::OpenAi => "https://api.openai.com/v1",
            EmbeddingProvider::Ollama => "http://localhost:11434",
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key_env: String,
    pub timeout_seconds: u64,
}

impl EmbeddingConfig {
    /// Endpoint base, without a trailing slash.
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            model: "text-embedding-3-small".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_batch_size: usize,
    pub workers: usize,
    pub max_retries: u32,
    pub min_chunks_per_file: usize,
    pub force_reindex: bool,
    pub stale_claim_seconds: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 200,
            embedding_batch_size: 20,
            workers: 5,
            max_retries: 5,
            min_chunks_per_file: 5,
            force_reindex: false,
            stale_claim_seconds: 900,
        }
    }
}

/// Request and token budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub rpm_limit: u32,
    pub tpm_limit: u64,
    pub rpm_target: u32,
    pub tpm_target: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rpm_limit: 5000,
            tpm_limit: 5_000_000,
            rpm_target: 2850,
            tpm_target: 2_850_000,
        }
    }
}
