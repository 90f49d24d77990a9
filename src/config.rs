// ABOUTME: Configuration loading for the tapeview CLI.
// ABOUTME: Reads TAPEVIEW_* environment variables; command-line flags override them.

use std::num::NonZeroUsize;
use std::str::FromStr;

use clap::ValueEnum;
use tapeview_core::cache::DEFAULT_CAPACITY;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TAPEVIEW_CACHE_CAPACITY must be a positive integer, got {0:?}")]
    InvalidCacheCapacity(String),

    #[error("TAPEVIEW_OUTPUT must be one of text, json, yaml; got {0:?}")]
    InvalidOutput(String),
}

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            _ => Err(ConfigError::InvalidOutput(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TapeviewConfig {
    pub cache_capacity: NonZeroUsize,
    pub output: OutputFormat,
}

impl TapeviewConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - TAPEVIEW_CACHE_CAPACITY: view stacks kept in the LRU cache (default: 64)
    /// - TAPEVIEW_OUTPUT: text, json, or yaml (default: text)
    pub fn from_env() -> Result<Self, ConfigError> {
        let cache_capacity = match std::env::var("TAPEVIEW_CACHE_CAPACITY") {
            Ok(raw) => raw
                .trim()
                .parse::<NonZeroUsize>()
                .map_err(|_| ConfigError::InvalidCacheCapacity(raw))?,
            Err(_) => NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        };

        let output = match std::env::var("TAPEVIEW_OUTPUT") {
            Ok(raw) if !raw.is_empty() => raw.parse()?,
            _ => OutputFormat::default(),
        };

        Ok(Self {
            cache_capacity,
            output,
        })
    }
}
