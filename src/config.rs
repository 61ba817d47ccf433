//! Tunable security parameters.
//!
//! Defaults are safe; values can be loaded from a serde source or overridden
//! from environment variables. `validate()` refuses anything that would
//! silently weaken the lock or break the record format.

use std::env;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Lowest PBKDF2 iteration count accepted for locking an identity.
pub const MIN_PBKDF2_ITERATIONS: u32 = 250_000;

/// Default PBKDF2 iteration count.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 310_000;

/// Ceiling for a single file chunk (64 MiB).
pub const MAX_FILE_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Consecutive media decrypt failures before a health signal is raised.
pub const DEFAULT_MEDIA_FAILURE_THRESHOLD: u32 = 25;

/// Configuration for the encryption core.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct E2eeConfig {
    /// PBKDF2-HMAC-SHA256 iterations used when locking an identity.
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,

    /// Plaintext bytes per encrypted file record.
    #[serde(default = "default_file_chunk_size")]
    pub file_chunk_size: usize,

    /// Consecutive incoming-frame failures that mark a media session unhealthy.
    #[serde(default = "default_media_failure_threshold")]
    pub media_failure_threshold: u32,
}

fn default_pbkdf2_iterations() -> u32 {
    DEFAULT_PBKDF2_ITERATIONS
}

fn default_file_chunk_size() -> usize {
    MAX_FILE_CHUNK_SIZE
}

fn default_media_failure_threshold() -> u32 {
    DEFAULT_MEDIA_FAILURE_THRESHOLD
}

impl Default for E2eeConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: default_pbkdf2_iterations(),
            file_chunk_size: default_file_chunk_size(),
            media_failure_threshold: default_media_failure_threshold(),
        }
    }
}

impl E2eeConfig {
    /// Load defaults, then apply `MURMUR_*` environment overrides.
    ///
    /// Unparseable values are rejected rather than ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = read_env("MURMUR_PBKDF2_ITERATIONS")? {
            config.pbkdf2_iterations = v;
        }
        if let Some(v) = read_env("MURMUR_FILE_CHUNK_SIZE")? {
            config.file_chunk_size = v;
        }
        if let Some(v) = read_env("MURMUR_MEDIA_FAILURE_THRESHOLD")? {
            config.media_failure_threshold = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON document (missing fields take defaults).
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value against its safe range.
    pub fn validate(&self) -> Result<()> {
        if self.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(Error::InvalidConfig(format!(
                "pbkdf2_iterations {} is below the minimum of {}",
                self.pbkdf2_iterations, MIN_PBKDF2_ITERATIONS
            )));
        }
        if self.file_chunk_size == 0 || self.file_chunk_size > MAX_FILE_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "file_chunk_size must be in 1..={}, got {}",
                MAX_FILE_CHUNK_SIZE, self.file_chunk_size
            )));
        }
        if self.media_failure_threshold == 0 {
            return Err(Error::InvalidConfig(
                "media_failure_threshold must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("{} is not a valid number: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}
