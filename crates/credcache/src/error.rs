//! Vault error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the vault and its collaborators
#[derive(Error, Debug)]
pub enum VaultError {
    /// Wrong password or corrupted ciphertext
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Key store I/O error at {path:?}: {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key store at {path:?} is unreadable: {source}")]
    StoreFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to render output: {0}")]
    Render(#[source] serde_json::Error),

    #[error("The {0} profile already exists in the credentials file. Pass -f to force overwrite.")]
    ProfileExists(String),

    #[error("Credentials file error at {path:?}: {source}")]
    CredentialsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, VaultError>;
