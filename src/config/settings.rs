//! Configuration settings for request signing and verification.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::{ApiSecurityError, ApiSecurityResult};
use crate::keys::{KeyPair, SharedKey};
use crate::nonce::{MemoryCache, NonceLedger};

/// Smallest nonce accepted in configuration.
const MIN_NONCE_LENGTH: usize = 8;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub nonce: NonceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Key file locations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysConfig {
    /// Path to the PEM public key used to verify signatures.
    pub public_key: Option<PathBuf>,
    /// Path to the PEM private key used to sign requests.
    pub private_key: Option<PathBuf>,
    /// Path to the shared secret used for HMACs.
    pub shared_key: Option<PathBuf>,
}

/// Nonce configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NonceConfig {
    /// Number of random bytes per nonce.
    #[serde(default = "default_nonce_length")]
    pub byte_length: usize,
    /// How long consumed and issued nonces are remembered, in seconds.
    #[serde(default = "default_nonce_ttl")]
    pub ttl_seconds: u64,
    /// Interval between sweeps of expired nonces, in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_nonce_length() -> usize {
    crate::nonce::DEFAULT_NONCE_LENGTH
}

fn default_nonce_ttl() -> u64 {
    3600
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            byte_length: default_nonce_length(),
            ttl_seconds: default_nonce_ttl(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> ApiSecurityResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ApiSecurityError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        let settings = Self::parse(&content).map_err(|e| match e {
            ApiSecurityError::Config { message } => ApiSecurityError::Config {
                message: format!("{} ({})", message, path.display()),
            },
            other => other,
        })?;

        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    pub fn parse(content: &str) -> ApiSecurityResult<Self> {
        let settings: Settings = toml::from_str(content).map_err(|e| ApiSecurityError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    fn validate(&self) -> ApiSecurityResult<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ApiSecurityError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        // Validate log format
        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(ApiSecurityError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        if self.nonce.byte_length < MIN_NONCE_LENGTH {
            return Err(ApiSecurityError::Config {
                message: format!(
                    "Nonce length {} is too short, minimum is {} bytes",
                    self.nonce.byte_length, MIN_NONCE_LENGTH
                ),
            });
        }

        if self.nonce.ttl_seconds == 0 {
            return Err(ApiSecurityError::Config {
                message: "Nonce TTL must be greater than zero".to_string(),
            });
        }

        if self.nonce.cleanup_interval_seconds == 0 {
            return Err(ApiSecurityError::Config {
                message: "Nonce cleanup interval must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Load the configured RSA keys, if any are configured.
    pub fn key_pair(&self) -> ApiSecurityResult<Option<KeyPair>> {
        let public = self.keys.public_key.as_deref();
        let private = self.keys.private_key.as_deref();
        if public.is_none() && private.is_none() {
            return Ok(None);
        }
        KeyPair::load(public, private).map(Some)
    }

    /// Load only the configured public key, for verification.
    ///
    /// The private key file is not read, so its permissions do not matter.
    pub fn verifying_key(&self) -> ApiSecurityResult<Option<KeyPair>> {
        self.keys
            .public_key
            .as_deref()
            .map(|path| KeyPair::load(Some(path), None))
            .transpose()
    }

    /// Load only the configured private key, for signing.
    pub fn signing_key(&self) -> ApiSecurityResult<Option<KeyPair>> {
        self.keys
            .private_key
            .as_deref()
            .map(|path| KeyPair::load(None, Some(path)))
            .transpose()
    }

    /// Load the configured shared key, if one is configured.
    pub fn shared_key(&self) -> ApiSecurityResult<Option<SharedKey>> {
        self.keys
            .shared_key
            .as_deref()
            .map(SharedKey::load)
            .transpose()
    }

    /// Build an in-memory nonce cache using the configured TTL.
    pub fn memory_cache(&self) -> Arc<MemoryCache> {
        Arc::new(MemoryCache::new(Duration::from_secs(self.nonce.ttl_seconds)))
    }

    /// Build a ledger over a fresh in-memory cache.
    pub fn memory_ledger(&self) -> NonceLedger {
        NonceLedger::with_cache(self.memory_cache())
    }

    /// Interval between background sweeps of expired nonces.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.nonce.cleanup_interval_seconds)
    }

    /// Start sweeping `cache` at the configured interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_cache_cleanup(&self, cache: &Arc<MemoryCache>) -> JoinHandle<()> {
        cache.start_cleanup_task(self.cleanup_interval())
    }
}
