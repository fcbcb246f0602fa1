//! Configuration management with environment variable support.
//!
//! This module provides [`Config`] for loading and validating datapack
//! settings from JSON files and environment variables.
//!
//! ## Environment Variables
//!
//! - `DATAPACK_KEY_PATH`: Override key ring file path
//! - `DATAPACK_PASSPHRASE_PATH`: Override passphrase file path
//! - `DATAPACK_COMPRESSION`: Override compression kind (`.tar.gz`, `.zip`, ...)
//! - `DATAPACK_CONFIG`: Override config file path
//!
//! `DATAPACK_PASSPHRASE` is read separately by
//! [`Passphrase::resolve`](crate::key_manager::Passphrase::resolve).

use crate::format::CompressionKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable names for configuration overrides
pub const ENV_KEY_PATH: &str = "DATAPACK_KEY_PATH";
pub const ENV_PASSPHRASE_PATH: &str = "DATAPACK_PASSPHRASE_PATH";
pub const ENV_COMPRESSION: &str = "DATAPACK_COMPRESSION";
pub const ENV_CONFIG_PATH: &str = "DATAPACK_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Armored key ring: public for packing, private for unpacking.
    pub key_path: Option<PathBuf>,
    pub passphrase_path: Option<PathBuf>,
    /// Compression override, in the same spelling as the file suffix.
    pub compression: Option<String>,
}

/// Whether `path` sits under a directory that is commonly served or shared.
pub fn in_public_directory(path: &Path) -> bool {
    path.parent()
        .map(|parent| parent.to_string_lossy().to_lowercase())
        .map_or(false, |parent| {
            parent.contains("public") || parent.contains("www") || parent.contains("htdocs")
        })
}

/// Warn when secret material is read from a public-looking location.
pub fn warn_if_public(path: &Path, what: &str) {
    if in_public_directory(path) {
        warn!(
            path = %path.display(),
            "{} appears to be in a public directory - this is a security risk", what
        );
    }
}

impl Config {
    fn read_file(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&s).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Load config with environment variable overrides
    /// Priority: ENV vars > config file > defaults
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(ENV_CONFIG_PATH).map(PathBuf::from));

        let mut config = match config_path {
            Some(ref p) if p.exists() => {
                info!(path = %p.display(), "loading config from file");
                Self::read_file(p)?
            }
            Some(ref p) => {
                warn!(path = %p.display(), "config file not found, using defaults");
                Config::default()
            }
            None => {
                debug!("using default configuration");
                Config::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to config
    fn apply_env_overrides(&mut self) {
        if let Some(key_path) = env::var_os(ENV_KEY_PATH) {
            debug!(key_path = ?key_path, "overriding key_path from environment");
            self.key_path = Some(key_path.into());
        }

        if let Some(passphrase_path) = env::var_os(ENV_PASSPHRASE_PATH) {
            debug!(passphrase_path = ?passphrase_path, "overriding passphrase_path from environment");
            self.passphrase_path = Some(passphrase_path.into());
        }

        if let Ok(compression) = env::var(ENV_COMPRESSION) {
            debug!(compression = %compression, "overriding compression from environment");
            self.compression = Some(compression);
        }
    }

    /// Command line flags take precedence over everything loaded so far.
    pub fn with_overrides(
        mut self,
        key_path: Option<PathBuf>,
        passphrase_path: Option<PathBuf>,
        compression: Option<String>,
    ) -> Result<Self> {
        if key_path.is_some() {
            self.key_path = key_path;
        }
        if passphrase_path.is_some() {
            self.passphrase_path = passphrase_path;
        }
        if compression.is_some() {
            self.compression = compression;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if let Some(ref compression) = self.compression {
            CompressionKind::parse_override(compression)
                .with_context(|| format!("invalid compression setting {:?}", compression))?;
        }

        if let Some(ref key_path) = self.key_path {
            if key_path.as_os_str().is_empty() {
                anyhow::bail!("key_path cannot be empty");
            }
            // public keys for packing may live anywhere; private keys are
            // checked where they are loaded
        }

        if let Some(ref passphrase_path) = self.passphrase_path {
            if passphrase_path.as_os_str().is_empty() {
                anyhow::bail!("passphrase_path cannot be empty");
            }
            warn_if_public(passphrase_path, "passphrase file");
        }

        Ok(())
    }
}
