//! Field cipher - AES-256-GCM under a password-derived key
//!
//! The key is Argon2id over the password with a fixed, domain-separated
//! salt, so the same password reproduces the same key on every run. There
//! is no per-record salt and no random nonce: the 96-bit
//! nonce is synthesized from the key and the plaintext, which makes the
//! scheme deterministic (equal plaintexts under one password give equal
//! ciphertexts). GCM's tag makes a wrong password fail loudly instead of
//! yielding garbage.
//!
//! Ciphertext layout (hex encoded): `nonce(12) || ciphertext || tag(16)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};

use crate::error::{Result, VaultError};

const KEY_SIZE: usize = 32;

/// Fixed Argon2id salt. Constant so stored records stay readable across runs.
const KDF_SALT: &[u8] = b"credcache-vault-key-v1";
/// Argon2id memory cost in KiB, iterations and lanes.
const KDF_MEMORY_KIB: u32 = 19_456;
const KDF_ITERATIONS: u32 = 2;
const KDF_PARALLELISM: u32 = 1;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Domain separator for synthetic nonces.
const NONCE_INFO: &[u8] = b"credcache-field-nonce-v1";

/// A cipher bound to one password.
///
/// Deriving once and reusing the instance keeps a fetch of many records
/// from hashing the password per field.
pub struct Cipher {
    key: [u8; KEY_SIZE],
    aead: Aes256Gcm,
}

impl Cipher {
    pub fn new(password: &str) -> Result<Self> {
        let key = derive_key(password)?;
        let aead = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        Ok(Self { key, aead })
    }

    /// Encrypt one field. Empty input encrypts like any other string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes = self.synthetic_nonce(plaintext.as_bytes());
        let sealed = self
            .aead
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(hex::encode(out))
    }

    /// Decrypt one field. An empty ciphertext is the empty string.
    pub fn decrypt(&self, ciphertext_hex: &str) -> Result<String> {
        if ciphertext_hex.is_empty() {
            return Ok(String::new());
        }

        let raw = hex::decode(ciphertext_hex)
            .map_err(|e| VaultError::Decryption(format!("invalid hex: {e}")))?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(VaultError::Decryption("ciphertext too short".to_string()));
        }

        let (nonce_bytes, sealed) = raw.split_at(NONCE_SIZE);
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| VaultError::Decryption("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| VaultError::Decryption(format!("invalid UTF-8: {e}")))
    }

    fn synthetic_nonce(&self, plaintext: &[u8]) -> [u8; NONCE_SIZE] {
        let digest = Sha256::new()
            .chain_update(NONCE_INFO)
            .chain_update(self.key)
            .chain_update(plaintext)
            .finalize();
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&digest[..NONCE_SIZE]);
        nonce
    }
}

fn derive_key(password: &str) -> Result<[u8; KEY_SIZE]> {
    let params = argon2::Params::new(
        KDF_MEMORY_KIB,
        KDF_ITERATIONS,
        KDF_PARALLELISM,
        Some(KEY_SIZE),
    )
    .map_err(|e| VaultError::Encryption(format!("invalid Argon2id parameters: {e}")))?;
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.as_bytes(), KDF_SALT, &mut key)
        .map_err(|e| VaultError::Encryption(format!("Argon2id key derivation failed: {e}")))?;
    Ok(key)
}

/// Encrypt a single field under `password`.
pub fn encrypt(plaintext: &str, password: &str) -> Result<String> {
    Cipher::new(password)?.encrypt(plaintext)
}

/// Decrypt a single field under `password`.
pub fn decrypt(ciphertext_hex: &str, password: &str) -> Result<String> {
    Cipher::new(password)?.decrypt(ciphertext_hex)
}
