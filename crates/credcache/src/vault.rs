//! Vault - the API the CLI talks to
//!
//! A `Vault` is an explicit handle on one store file and one credentials
//! file. Every call loads the store, does its work and saves before
//! returning; nothing is cached between calls.

use chrono::{DateTime, Utc};
use credcache_core::{Config, Paths};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::cipher::Cipher;
use crate::error::Result;
use crate::render::{self, OutputFormat};
use crate::store::{KeyStore, SealedFields, StoredRecord};
use crate::sweep;

/// Plaintext credentials handed to `add_key`
#[derive(Clone)]
pub struct NewCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
    pub issuing_account: String,
    pub issuing_role: String,
    pub expires_at: DateTime<Utc>,
}

/// A decrypted, unexpired credential set
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
    pub issuing_account: String,
    pub issuing_role: String,
    pub is_iam: bool,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    /// The three fields an external consumer needs, nothing else
    pub fn output_key(&self) -> OutputKey {
        OutputKey {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            session_token: self.session_token.clone(),
        }
    }
}

/// Never prints secret material.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("issuing_account", &self.issuing_account)
            .field("issuing_role", &self.issuing_role)
            .field("is_iam", &self.is_iam)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Credentials stripped down for rendering
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputKey {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
}

/// Result of a fetch: the keys that decrypted, and how many matching
/// records did not
#[derive(Debug, Default)]
pub struct FetchReport {
    pub keys: Vec<Credentials>,
    pub rejected: usize,
}

impl FetchReport {
    /// Records exist but none opened with the given password
    pub fn password_rejected(&self) -> bool {
        self.keys.is_empty() && self.rejected > 0
    }
}

pub struct Vault {
    store_path: PathBuf,
    credentials_file: PathBuf,
}

impl Vault {
    pub fn new(store_path: impl Into<PathBuf>, credentials_file: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            credentials_file: credentials_file.into(),
        }
    }

    /// Vault at the locations named by the config, falling back to defaults
    pub fn from_config(config: &Config, paths: &Paths) -> Self {
        Self::new(config.store_path(paths), config.credentials_file(paths))
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn credentials_file(&self) -> &Path {
        &self.credentials_file
    }

    /// Encrypt and cache a credential set. Identical sets may be added
    /// more than once.
    pub fn add_key(&self, creds: &NewCredentials, password: &str, is_iam: bool) -> Result<()> {
        let mut store = KeyStore::load(&self.store_path)?;
        let cipher = Cipher::new(password)?;

        let fields = SealedFields {
            access_key: cipher.encrypt(&creds.access_key)?,
            secret_key: cipher.encrypt(&creds.secret_key)?,
            session_token: cipher.encrypt(&creds.session_token)?,
            issuing_account: cipher.encrypt(&creds.issuing_account)?,
            issuing_role: cipher.encrypt(&creds.issuing_role)?,
        };
        let record_id = store.insert(fields, is_iam, creds.expires_at.timestamp_millis());

        if let Err(e) = store.save() {
            error!(path = %self.store_path.display(), error = %e, "failed to save new credentials");
            return Err(e);
        }

        debug!(record_id, is_iam, expires_at = %creds.expires_at, "cached credentials");
        Ok(())
    }

    /// All unexpired credentials of one kind that open with `password`,
    /// soonest-expiring first
    pub fn get_keys(&self, password: &str, is_iam: bool) -> Result<Vec<Credentials>> {
        Ok(self.fetch(password, is_iam)?.keys)
    }

    pub fn fetch(&self, password: &str, is_iam: bool) -> Result<FetchReport> {
        self.fetch_at(password, is_iam, Utc::now())
    }

    /// Sweep records expired at `now`, then decrypt the ones of the
    /// requested kind. A record that fails to decrypt is counted and
    /// skipped.
    pub fn fetch_at(&self, password: &str, is_iam: bool, now: DateTime<Utc>) -> Result<FetchReport> {
        let mut store = KeyStore::load(&self.store_path)?;
        sweep::sweep(&mut store, now);

        let cipher = Cipher::new(password)?;
        let mut report = FetchReport::default();

        for record in store.records().iter().filter(|r| r.is_iam == is_iam) {
            match open_record(&cipher, record) {
                Ok(creds) => report.keys.push(creds),
                Err(e) => {
                    warn!(record_id = record.id(), error = %e, "skipping record that did not decrypt");
                    report.rejected += 1;
                }
            }
        }

        Ok(report)
    }

    /// Render one credential set in `format`. The `creds` format writes
    /// the vault's credentials file.
    pub fn get_key_output(
        &self,
        format: OutputFormat,
        key: &Credentials,
        profile: Option<&str>,
        force: bool,
    ) -> Result<String> {
        render::render(format, key, profile, force, &self.credentials_file)
    }
}

fn open_record(cipher: &Cipher, record: &StoredRecord) -> Result<Credentials> {
    let fields = &record.fields;
    Ok(Credentials {
        access_key: cipher.decrypt(&fields.access_key)?,
        secret_key: cipher.decrypt(&fields.secret_key)?,
        session_token: cipher.decrypt(&fields.session_token)?,
        issuing_account: cipher.decrypt(&fields.issuing_account)?,
        issuing_role: cipher.decrypt(&fields.issuing_role)?,
        is_iam: record.is_iam,
        expires_at: DateTime::from_timestamp_millis(record.expires_at)
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    })
}
