//! Standard paths used by credcache

use std::path::{Path, PathBuf};

/// Standard credcache paths
pub struct Paths {
    /// Data directory (~/.local/share/credcache)
    pub data: PathBuf,
    /// Config directory (~/.config/credcache)
    pub config: PathBuf,
    /// User home directory
    pub home: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("credcache");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("credcache");

        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        Self { data, config, home }
    }

    /// Default location of the encrypted key store
    pub fn store_file(&self) -> PathBuf {
        self.data.join("keys.json")
    }

    /// Default location of the config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.yaml")
    }

    /// The AWS shared credentials file (~/.aws/credentials)
    pub fn aws_credentials_file(&self) -> PathBuf {
        self.home.join(".aws").join("credentials")
    }

    /// Expand a leading `~` against the home directory
    pub fn expand(&self, path: &Path) -> PathBuf {
        match path.strip_prefix("~") {
            Ok(rest) => self.home.join(rest),
            Err(_) => path.to_path_buf(),
        }
    }
}
