use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::chunk::{ChunkOptions, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_OVERLAP_SIZE};
use crate::models::ProviderSlot;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
    #[serde(default = "default_true")]
    pub preserve_paragraphs: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            overlap_size: DEFAULT_OVERLAP_SIZE,
            preserve_paragraphs: true,
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions {
            max_chunk_size: self.max_chunk_size,
            overlap_size: self.overlap_size,
            preserve_paragraphs: self.preserve_paragraphs,
        }
    }
}

fn default_max_chunk_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}
fn default_overlap_size() -> usize {
    DEFAULT_OVERLAP_SIZE
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 10_000,
            exponential_backoff: true,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_max_retry_delay_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    /// Chunks in flight at once. `1` processes strictly in index order.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub user_prompt: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            system_prompt: None,
            user_prompt: None,
        }
    }
}

fn default_concurrency() -> usize {
    1
}

/// Transport settings for one provider slot.
#[derive(Debug, Deserialize, Clone)]
pub struct CommandProviderConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    pub main: Option<CommandProviderConfig>,
    pub backup1: Option<CommandProviderConfig>,
    pub backup2: Option<CommandProviderConfig>,
}

impl ProvidersConfig {
    pub fn get(&self, slot: ProviderSlot) -> Option<&CommandProviderConfig> {
        match slot {
            ProviderSlot::Main => self.main.as_ref(),
            ProviderSlot::Backup1 => self.backup1.as_ref(),
            ProviderSlot::Backup2 => self.backup2.as_ref(),
        }
    }

    /// Configured slots in fallback order.
    pub fn configured(&self) -> impl Iterator<Item = (ProviderSlot, &CommandProviderConfig)> {
        ProviderSlot::ALL
            .into_iter()
            .filter_map(move |slot| self.get(slot).map(|cfg| (slot, cfg)))
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Emit log lines as JSON instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.max_chunk_size == 0 {
        bail!("chunking.max_chunk_size must be > 0");
    }

    // Validate retry
    if config.retry.max_retries == 0 {
        bail!("retry.max_retries must be >= 1");
    }
    if config.retry.retry_delay_ms > config.retry.max_retry_delay_ms {
        bail!("retry.retry_delay_ms must not exceed retry.max_retry_delay_ms");
    }

    // Validate processing
    if config.processing.concurrency == 0 {
        bail!("processing.concurrency must be >= 1");
    }

    // Validate providers
    for (slot, provider) in config.providers.configured() {
        if provider.command.trim().is_empty() {
            bail!("providers.{}.command must not be empty", slot);
        }
        if provider.timeout_secs == 0 {
            bail!("providers.{}.timeout_secs must be > 0", slot);
        }
    }

    Ok(())
}
