//! Configuration for retry escalation and chunked runs.

use std::collections::BTreeMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::chunker::DEFAULT_MAX_CHARS;
use crate::error::ConfigError;

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Cheapest model; the end of every fallback chain.
pub const DEFAULT_FALLBACK_MODEL: &str = "gpt-4o-mini";

/// Retry and fallback settings.
///
/// Built once (usually via [`RetryConfig::from_env`]) and handed to the
/// policy and executor; nothing here is read from globals at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum generation attempts per job row.
    ///
    /// Default: 2, which only ever reaches the first rung of the ladder
    /// (prompt hardening). Raise to 3 or 4 for chunk shrinking and model
    /// fallback.
    pub max_retries: u32,

    /// Multiplier applied to the chunk size on the shrink rung.
    ///
    /// Default: 0.6.
    pub chunk_reduction_factor: f64,

    /// Character budget per chunk.
    ///
    /// Default: 8000.
    pub default_chunk_size: usize,

    /// Model for first attempts.
    pub default_model: String,

    /// Terminal low-cost model.
    ///
    /// Unknown models fall back here, and it falls back to itself.
    pub fallback_model: String,

    /// Designated fallback per model.
    #[serde(default)]
    pub fallbacks: BTreeMap<String, String>,

    /// Chunks of one job run concurrently by [`JobRunner`](crate::pipeline::JobRunner).
    ///
    /// Default: 1 (sequential).
    pub chunk_concurrency: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let fallbacks = [
            ("gpt-4-turbo", "gpt-4o"),
            ("gpt-4o", DEFAULT_FALLBACK_MODEL),
            ("gpt-4.1", "gpt-4.1-mini"),
            ("gpt-4.1-mini", DEFAULT_FALLBACK_MODEL),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        Self {
            max_retries: 2,
            chunk_reduction_factor: 0.6,
            default_chunk_size: DEFAULT_MAX_CHARS,
            default_model: DEFAULT_MODEL.to_string(),
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
            fallbacks,
            chunk_concurrency: 1,
        }
    }
}

impl RetryConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Reads a `.env` file if present. Unset variables keep their defaults:
    /// - `GENERATION_MAX_RETRIES`
    /// - `GENERATION_CHUNK_REDUCTION`
    /// - `GENERATION_CHUNK_SIZE`
    /// - `GENERATION_CHUNK_CONCURRENCY`
    /// - `GENERATION_DEFAULT_MODEL`
    /// - `GENERATION_FALLBACK_MODEL`
    /// - `GENERATION_MODEL_FALLBACKS` (`model=fallback,model=fallback`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("GENERATION_MAX_RETRIES") {
            config.max_retries = parse(&value, "GENERATION_MAX_RETRIES")?;
        }
        if let Some(value) = lookup("GENERATION_CHUNK_REDUCTION") {
            config.chunk_reduction_factor = parse(&value, "GENERATION_CHUNK_REDUCTION")?;
        }
        if let Some(value) = lookup("GENERATION_CHUNK_SIZE") {
            config.default_chunk_size = parse(&value, "GENERATION_CHUNK_SIZE")?;
        }
        if let Some(value) = lookup("GENERATION_CHUNK_CONCURRENCY") {
            config.chunk_concurrency = parse(&value, "GENERATION_CHUNK_CONCURRENCY")?;
        }
        if let Some(value) = lookup("GENERATION_DEFAULT_MODEL") {
            config.default_model = value;
        }
        if let Some(value) = lookup("GENERATION_FALLBACK_MODEL") {
            config.fallback_model = value;
        }
        if let Some(value) = lookup("GENERATION_MODEL_FALLBACKS") {
            config.fallbacks = parse_fallbacks(&value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.chunk_reduction_factor > 0.0 && self.chunk_reduction_factor <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "chunk_reduction_factor must be in (0, 1], got {}",
                self.chunk_reduction_factor
            )));
        }
        if self.default_chunk_size == 0 {
            return Err(ConfigError::Invalid("default_chunk_size must be > 0".into()));
        }
        if self.chunk_concurrency == 0 {
            return Err(ConfigError::Invalid("chunk_concurrency must be > 0".into()));
        }
        Ok(())
    }

    /// Designated fallback for `model`.
    pub fn fallback_for(&self, model: &str) -> &str {
        self.fallbacks
            .get(model)
            .map(String::as_str)
            .unwrap_or(self.fallback_model.as_str())
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the chunk reduction factor.
    pub fn with_chunk_reduction_factor(mut self, factor: f64) -> Self {
        self.chunk_reduction_factor = factor;
        self
    }

    /// Set the default chunk size.
    pub fn with_default_chunk_size(mut self, size: usize) -> Self {
        self.default_chunk_size = size;
        self
    }

    /// Set the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the terminal fallback model.
    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = model.into();
        self
    }

    /// Add or replace one fallback edge.
    pub fn with_fallback(mut self, model: impl Into<String>, fallback: impl Into<String>) -> Self {
        self.fallbacks.insert(model.into(), fallback.into());
        self
    }

    /// Set chunk concurrency.
    pub fn with_chunk_concurrency(mut self, concurrency: usize) -> Self {
        self.chunk_concurrency = concurrency;
        self
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn parse_fallbacks(value: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
                Ok((from.trim().to_string(), to.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidValue {
                key: "GENERATION_MODEL_FALLBACKS",
                value: pair.to_string(),
            }),
        })
        .collect()
}
