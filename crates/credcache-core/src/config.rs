//! credcache configuration
//!
//! Configuration file: ~/.config/credcache/config.yaml
//!
//! Every field is optional. A missing file means defaults everywhere.

use crate::paths::Paths;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Encrypted key store (defaults to <data>/keys.json)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Credentials file merged by the `creds` output (defaults to ~/.aws/credentials)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,

    /// Output format used when `get` is not given one
    #[serde(default = "default_output")]
    pub default_output: String,

    /// Profile written by the `creds` output when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
}

fn default_output() -> String {
    "env".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Paths::new().config_file())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::with_defaults());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {:?}", path))?;
        Ok(config)
    }

    /// Write configuration to a path, refusing to replace an existing file unless forced
    pub fn save_to(&self, path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!("Config already exists at {:?} (use --force to overwrite)", path);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        Ok(())
    }

    /// Defaults as if an empty file had been read
    pub fn with_defaults() -> Self {
        Self {
            default_output: default_output(),
            ..Self::default()
        }
    }

    /// Resolved store path
    pub fn store_path(&self, paths: &Paths) -> PathBuf {
        self.store_path
            .as_deref()
            .map(|p| paths.expand(p))
            .unwrap_or_else(|| paths.store_file())
    }

    /// Resolved credentials file path
    pub fn credentials_file(&self, paths: &Paths) -> PathBuf {
        self.credentials_file
            .as_deref()
            .map(|p| paths.expand(p))
            .unwrap_or_else(|| paths.aws_credentials_file())
    }
}
