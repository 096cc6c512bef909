use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_PROTOCOL_VERSION: u64 = 63;
pub const DEFAULT_BLOOM_SECTION_SIZE: u64 = 4096;
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

fn default_protocol_version() -> u64 {
    DEFAULT_PROTOCOL_VERSION
}

fn default_bloom_section_size() -> u64 {
    DEFAULT_BLOOM_SECTION_SIZE
}

fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}

/// Configuration for the [crate::Backend], as read from YAML.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    pub chain_id: u64,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u64,
    #[serde(default = "default_bloom_section_size")]
    pub bloom_section_size: u64,
    /// Capacity of channels made by [crate::EventFeeds::channel].
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub chain_id: NonZeroU64,
    pub protocol_version: u64,
    pub bloom_section_size: NonZeroU64,
    pub subscriber_buffer: NonZeroUsize,
}

fn nonzero_u64(field: &'static str, value: u64) -> Result<NonZeroU64, ConfigError> {
    NonZeroU64::new(value).ok_or(ConfigError::InvalidNonZero { field, value })
}

fn nonzero_usize(field: &'static str, value: usize) -> Result<NonZeroUsize, ConfigError> {
    NonZeroUsize::new(value).ok_or(ConfigError::InvalidNonZero {
        field,
        value: value as u64,
    })
}

impl Config {
    /// Defaults for everything except the chain id.
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            bloom_section_size: DEFAULT_BLOOM_SECTION_SIZE,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        Ok(ValidatedConfig {
            chain_id: nonzero_u64("chain_id", self.chain_id)?,
            protocol_version: self.protocol_version,
            bloom_section_size: nonzero_u64("bloom_section_size", self.bloom_section_size)?,
            subscriber_buffer: nonzero_usize("subscriber_buffer", self.subscriber_buffer)?,
        })
    }

    pub fn load_validated(path: impl AsRef<Path>) -> anyhow::Result<ValidatedConfig> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        let config: Config =
            serde_yaml::from_str(&contents).context("Could not parse config file")?;
        let config = config.validate().context("Invalid config")?;
        tracing::info!(
            chain_id = config.chain_id.get(),
            protocol_version = config.protocol_version,
            subscriber_buffer = config.subscriber_buffer.get(),
            "loaded config"
        );
        Ok(config)
    }
}
