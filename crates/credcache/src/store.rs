//! Record store - the on-disk table of encrypted credential records
//!
//! The whole table lives in one JSON file that is read in full on `load`
//! and rewritten in full on `save`. Records are kept ordered by expiry,
//! which doubles as the expiry index: expired records always form a prefix.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, VaultError};

/// The five secret fields of a record, each hex ciphertext
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedFields {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
    pub issuing_account: String,
    pub issuing_role: String,
}

/// One persisted credential record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    /// Assigned by the store, never reused
    id: u64,
    #[serde(flatten)]
    pub fields: SealedFields,
    #[serde(rename = "isIAM")]
    pub is_iam: bool,
    /// Expiry as epoch milliseconds
    pub expires_at: i64,
}

impl StoredRecord {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    #[serde(default = "first_id")]
    next_id: u64,
    #[serde(default)]
    records: Vec<StoredRecord>,
}

fn first_id() -> u64 {
    1
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            next_id: first_id(),
            records: Vec::new(),
        }
    }
}

/// In-memory view of the store file
pub struct KeyStore {
    path: PathBuf,
    data: StoreFile,
}

impl KeyStore {
    /// Load the store at `path`. A missing or empty file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => StoreFile::default(),
            Ok(content) => {
                serde_json::from_str(&content).map_err(|source| VaultError::StoreFormat {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no key store yet, starting empty");
                StoreFile::default()
            }
            Err(source) => {
                return Err(VaultError::StoreIo {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut store = Self {
            path: path.to_path_buf(),
            data,
        };
        store.reindex();
        Ok(store)
    }

    /// Restore ordering and the id counter after reading a file that may
    /// have been edited by hand.
    fn reindex(&mut self) {
        self.data.records.sort_by_key(|r| r.expires_at);
        if let Some(max_id) = self.data.records.iter().map(|r| r.id).max() {
            self.data.next_id = self.data.next_id.max(max_id.saturating_add(1));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, ascending by expiry
    pub fn records(&self) -> &[StoredRecord] {
        &self.data.records
    }

    pub fn len(&self) -> usize {
        self.data.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.records.is_empty()
    }

    /// Insert a record, assigning it a fresh id. Records with equal expiry
    /// keep insertion order.
    pub fn insert(&mut self, fields: SealedFields, is_iam: bool, expires_at: i64) -> u64 {
        let id = self.data.next_id;
        self.data.next_id += 1;

        let at = self
            .data
            .records
            .partition_point(|r| r.expires_at <= expires_at);
        self.data.records.insert(
            at,
            StoredRecord {
                id,
                fields,
                is_iam,
                expires_at,
            },
        );
        id
    }

    /// Remove every record matching `predicate`, returning how many went
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&StoredRecord) -> bool,
    {
        let before = self.data.records.len();
        self.data.records.retain(|r| !predicate(r));
        before - self.data.records.len()
    }

    /// Rewrite the store file. Writes a sibling temp file first and renames
    /// it into place, so a failure leaves the previous file intact.
    pub fn save(&self) -> Result<()> {
        let io_err = |source: std::io::Error| VaultError::StoreIo {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(io_err)?;
                set_mode(parent, 0o700).map_err(io_err)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.data)
            .map_err(|source| VaultError::StoreFormat {
                path: self.path.clone(),
                source,
            })?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, json).map_err(io_err)?;
        set_mode(&tmp_path, 0o600).map_err(io_err)?;
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;

        debug!(path = %self.path.display(), records = self.len(), "saved key store");
        Ok(())
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sealed(tag: &str) -> SealedFields {
        SealedFields {
            access_key: format!("{tag}-ak"),
            ..SealedFields::default()
        }
    }

    #[test]
    fn test_load_missing_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = KeyStore::load(&tmp.path().join("keys.json")).unwrap();
        assert!(store.is_empty());
        assert!(!tmp.path().join("keys.json").exists());
    }

    #[test]
    fn test_insert_keeps_expiry_order() {
        let tmp = TempDir::new().unwrap();
        let mut store = KeyStore::load(&tmp.path().join("keys.json")).unwrap();

        store.insert(sealed("c"), false, 300);
        store.insert(sealed("a"), false, 100);
        store.insert(sealed("b1"), false, 200);
        store.insert(sealed("b2"), false, 200);

        let order: Vec<_> = store
            .records()
            .iter()
            .map(|r| r.fields.access_key.as_str())
            .collect();
        assert_eq!(order, vec!["a-ak", "b1-ak", "b2-ak", "c-ak"]);
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("keys.json");

        let mut store = KeyStore::load(&path).unwrap();
        let id = store.insert(sealed("x"), true, 42);
        store.save().unwrap();

        let reloaded = KeyStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        let record = &reloaded.records()[0];
        assert_eq!(record.id(), id);
        assert!(record.is_iam);
        assert_eq!(record.expires_at, 42);
        assert_eq!(record.fields, sealed("x"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_ids_never_reused() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys.json");

        let mut store = KeyStore::load(&path).unwrap();
        let first = store.insert(sealed("a"), false, 1);
        let second = store.insert(sealed("b"), false, 2);
        assert_ne!(first, second);

        assert_eq!(store.remove_where(|_| true), 2);
        store.save().unwrap();

        let mut store = KeyStore::load(&path).unwrap();
        let third = store.insert(sealed("c"), false, 3);
        assert!(third > second);
    }

    #[test]
    fn test_remove_where() {
        let tmp = TempDir::new().unwrap();
        let mut store = KeyStore::load(&tmp.path().join("keys.json")).unwrap();
        store.insert(sealed("a"), false, 10);
        store.insert(sealed("b"), false, 20);
        store.insert(sealed("c"), false, 30);

        let removed = store.remove_where(|r| r.expires_at <= 20);
        assert_eq!(removed, 2);
        assert_eq!(store.records()[0].fields.access_key, "c-ak");
    }

    #[test]
    fn test_corrupt_file_is_reported_and_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys.json");
        fs::write(&path, "{ not json").unwrap();

        let err = KeyStore::load(&path).err().unwrap();
        assert!(matches!(err, VaultError::StoreFormat { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_hand_edited_file_is_reindexed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys.json");
        fs::write(
            &path,
            r#"{"records":[
                {"id":7,"accessKey":"b","secretKey":"","sessionToken":"","issuingAccount":"","issuingRole":"","isIAM":false,"expiresAt":20},
                {"id":3,"accessKey":"a","secretKey":"","sessionToken":"","issuingAccount":"","issuingRole":"","isIAM":false,"expiresAt":10}
            ]}"#,
        )
        .unwrap();

        let mut store = KeyStore::load(&path).unwrap();
        assert_eq!(store.records()[0].fields.access_key, "a");
        assert_eq!(store.insert(sealed("c"), false, 30), 8);
    }

    #[test]
    fn test_failed_save_keeps_previous_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys.json");

        let mut store = KeyStore::load(&path).unwrap();
        store.insert(sealed("a"), false, 1);
        store.save().unwrap();
        let before = fs::read_to_string(&path).unwrap();

        // A directory in the temp file's place makes the write fail.
        fs::create_dir(path.with_extension("tmp")).unwrap();
        store.insert(sealed("b"), false, 2);

        let err = store.save().unwrap_err();
        assert!(matches!(err, VaultError::StoreIo { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
        assert_eq!(KeyStore::load(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_max_id_does_not_overflow() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys.json");
        fs::write(
            &path,
            format!(
                r#"{{"records":[{{"id":{},"accessKey":"a","secretKey":"","sessionToken":"","issuingAccount":"","issuingRole":"","isIAM":false,"expiresAt":10}}]}}"#,
                u64::MAX
            ),
        )
        .unwrap();

        let store = KeyStore::load(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].id(), u64::MAX);
    }

    #[cfg(unix)]
    #[test]
    fn test_store_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys.json");
        let mut store = KeyStore::load(&path).unwrap();
        store.insert(sealed("a"), false, 1);
        store.save().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
