//! Credential vault: password secrets encrypted at rest.
//!
//! Each password-authenticated location owns exactly one credential
//! file containing an AES-256-GCM blob. The cipher is keyed by a
//! 32-byte device-local key file created lazily on first use, so
//! credential files are only decryptable on the device that wrote
//! them. Confidentiality is guaranteed at rest only: the secret is in
//! the clear while held in process memory or handed to an SMB/SSH
//! client.
//!
//! Blob layout: 4-byte magic, 1-byte format version, 12-byte nonce,
//! then ciphertext with the 16-byte GCM tag appended. The tag means a
//! truncated or tampered file fails decryption outright rather than
//! yielding a partial secret.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

/// Magic prefix identifying a vault blob.
const MAGIC: &[u8; 4] = b"NLCV";

/// Current blob format version.
const FORMAT_VERSION: u8 = 1;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Device key length in bytes (AES-256).
const KEY_LEN: usize = 32;

/// Maximum credential file size (64KB). Secrets are short strings.
const MAX_BLOB_SIZE: u64 = 64 * 1024;

/// Errors from vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Encrypting or writing a credential failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Reading, authenticating, or decoding a credential failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Device key material could not be loaded or created.
    #[error("vault key unavailable: {0}")]
    Key(String),
}

/// Encrypts and decrypts credential files with a device-local key.
#[derive(Debug, Clone)]
pub struct CredentialVault {
    key_path: PathBuf,
}

impl CredentialVault {
    /// Creates a vault backed by the given key file. The key file is
    /// created with fresh random material the first time it is needed.
    #[must_use]
    pub fn new(key_path: PathBuf) -> Self {
        assert!(!key_path.as_os_str().is_empty(), "key path must not be empty");
        Self { key_path }
    }

    /// Returns the device key file path.
    #[must_use]
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Encrypts `secret` and writes the blob to `path`.
    pub fn encrypt(&self, secret: &str, path: &Path) -> Result<(), VaultError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, secret.as_bytes())
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(MAGIC.len() + 1 + NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(MAGIC);
        blob.push(FORMAT_VERSION);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| VaultError::Encryption(format!("cannot create {}: {e}", parent.display())))?;
        }
        fs::write(path, &blob)
            .map_err(|e| VaultError::Encryption(format!("cannot write {}: {e}", path.display())))?;
        restrict_permissions(path);

        tracing::debug!(path = %path.display(), "credential written");
        Ok(())
    }

    /// Reads and decrypts the blob at `path`, returning the secret.
    pub fn decrypt(&self, path: &Path) -> Result<String, VaultError> {
        let metadata = fs::metadata(path)
            .map_err(|e| VaultError::Decryption(format!("cannot read {}: {e}", path.display())))?;
        if metadata.len() > MAX_BLOB_SIZE {
            return Err(VaultError::Decryption(format!(
                "credential file too large ({} bytes)",
                metadata.len()
            )));
        }

        let blob = fs::read(path)
            .map_err(|e| VaultError::Decryption(format!("cannot read {}: {e}", path.display())))?;

        let header_len = MAGIC.len() + 1 + NONCE_LEN;
        if blob.len() < header_len || &blob[..MAGIC.len()] != MAGIC {
            return Err(VaultError::Decryption("not a credential file".to_string()));
        }
        let version = blob[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(VaultError::Decryption(format!(
                "unsupported credential format version {version}"
            )));
        }

        let cipher = self.cipher()?;
        let nonce = Nonce::from_slice(&blob[MAGIC.len() + 1..header_len]);
        let plaintext = cipher
            .decrypt(nonce, &blob[header_len..])
            .map_err(|_| VaultError::Decryption("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| VaultError::Decryption("secret is not valid UTF-8".to_string()))
    }

    /// Deletes the credential file at `path`. Missing files are not an
    /// error: the end state (no credential) is the same.
    pub fn remove(&self, path: &Path) -> Result<(), VaultError> {
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "credential removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::Encryption(format!(
                "cannot remove {}: {e}",
                path.display()
            ))),
        }
    }

    /// Builds the cipher from the device key, creating the key file
    /// if this is the first use.
    fn cipher(&self) -> Result<Aes256Gcm, VaultError> {
        let key_bytes = self.load_or_create_key()?;
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Aes256Gcm::new(key))
    }

    fn load_or_create_key(&self) -> Result<[u8; KEY_LEN], VaultError> {
        if self.key_path.exists() {
            let bytes = fs::read(&self.key_path)
                .map_err(|e| VaultError::Key(format!("cannot read key file: {e}")))?;
            let key: [u8; KEY_LEN] = bytes
                .try_into()
                .map_err(|_| VaultError::Key("key file has wrong length".to_string()))?;
            return Ok(key);
        }

        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);

        if let Some(parent) = self.key_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| VaultError::Key(format!("cannot create key directory: {e}")))?;
        }
        fs::write(&self.key_path, key)
            .map_err(|e| VaultError::Key(format!("cannot write key file: {e}")))?;
        restrict_permissions(&self.key_path);

        tracing::info!(path = %self.key_path.display(), "generated device vault key");
        Ok(key)
    }
}

fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
