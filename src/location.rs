//! Location data model.
//!
//! A [`Location`] is a configured remote destination (SMB share or SSH
//! host) playing a named role such as `route_sync` or `device_backup`.
//! Protocol-specific fields live in the [`Endpoint`] enum so that
//! invalid combinations (an SMB share with a `key_path`, an SSH key
//! host with a `credential_file`) cannot be constructed, while the
//! serialized form stays the flat JSON object the config file uses.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
const LOCATION_ID_LEN: usize = 16;

/// A configured remote destination usable for backup or sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Deterministic identifier derived from the stable fields.
    pub location_id: String,
    /// Role this location plays (e.g. `route_sync`, `device_backup`).
    ///
    /// An open string key: the registry keeps at most one location per
    /// distinct value but never interprets it.
    #[serde(rename = "type")]
    pub role: String,
    /// Human-readable name.
    pub label: String,
    /// Hostname or IP address of the remote server.
    pub server: String,
    /// Username for authentication.
    pub username: String,
    /// Protocol-specific fields, flattened into the same JSON object.
    #[serde(flatten)]
    pub endpoint: Endpoint,
}

/// Protocol-specific part of a [`Location`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum Endpoint {
    /// An SMB share. Always password-authenticated.
    Smb(SmbEndpoint),
    /// An SSH host, authenticated by password or key file.
    Ssh(SshEndpoint),
}

/// SMB share coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmbEndpoint {
    /// Share name on the server.
    pub share: String,
    /// Path within the share.
    pub path: String,
    /// Encrypted credential file for the share password.
    pub credential_file: PathBuf,
}

/// SSH host coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshEndpoint {
    /// SSH port (22 unless overridden).
    pub port: u16,
    /// Remote path used by the backup engine.
    pub path: String,
    /// Authentication method, flattened into the same JSON object.
    #[serde(flatten)]
    pub auth: SshAuth,
}

/// SSH authentication method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "auth_type", rename_all = "lowercase")]
pub enum SshAuth {
    /// Password authentication via an encrypted credential file.
    Password {
        /// Encrypted credential file holding the password.
        credential_file: PathBuf,
    },
    /// Key authentication via an existing private key file.
    Key {
        /// Path to the private key.
        key_path: PathBuf,
    },
}

impl Location {
    /// Returns the protocol key (`smb` or `ssh`).
    #[must_use]
    pub fn protocol(&self) -> &'static str {
        match self.endpoint {
            Endpoint::Smb(_) => "smb",
            Endpoint::Ssh(_) => "ssh",
        }
    }

    /// Returns the remote path used by the backup engine.
    #[must_use]
    pub fn path(&self) -> &str {
        match &self.endpoint {
            Endpoint::Smb(smb) => &smb.path,
            Endpoint::Ssh(ssh) => &ssh.path,
        }
    }

    /// Returns the encrypted credential file, if this location is
    /// password-authenticated.
    #[must_use]
    pub fn credential_file(&self) -> Option<&Path> {
        match &self.endpoint {
            Endpoint::Smb(smb) => Some(&smb.credential_file),
            Endpoint::Ssh(ssh) => match &ssh.auth {
                SshAuth::Password { credential_file } => Some(credential_file),
                SshAuth::Key { .. } => None,
            },
        }
    }

    /// Returns the label, falling back to the server name when the
    /// label is empty.
    #[must_use]
    pub fn display(&self) -> &str {
        if self.label.is_empty() {
            &self.server
        } else {
            &self.label
        }
    }

    /// Returns the share name (smb) or port (ssh) as the
    /// share-or-port discriminator used in identifiers and credential
    /// file names.
    #[must_use]
    pub fn share_or_port(&self) -> String {
        match &self.endpoint {
            Endpoint::Smb(smb) => smb.share.clone(),
            Endpoint::Ssh(ssh) => ssh.port.to_string(),
        }
    }

    /// Returns a `server:port` / `//server/share` style connection
    /// string for display in menus.
    #[must_use]
    pub fn connection_string(&self) -> String {
        match &self.endpoint {
            Endpoint::Smb(smb) => format!("//{}/{}", self.server, smb.share),
            Endpoint::Ssh(ssh) if ssh.port == 22 => self.server.clone(),
            Endpoint::Ssh(ssh) => format!("{}:{}", self.server, ssh.port),
        }
    }
}

/// Computes the deterministic location identifier.
///
/// Pure function over the stable identifying fields: same inputs always
/// produce the same id. The id is used for lookup only; uniqueness in
/// the store is keyed on the role.
#[must_use]
pub fn location_id(server: &str, share_or_port: &str, label: &str, role: &str) -> String {
    let mut hasher = Sha256::new();
    // Field separator prevents ("ab","c") colliding with ("a","bc").
    hasher.update(server.as_bytes());
    hasher.update([0x1f]);
    hasher.update(share_or_port.as_bytes());
    hasher.update([0x1f]);
    hasher.update(label.as_bytes());
    hasher.update([0x1f]);
    hasher.update(role.as_bytes());
    let digest = hasher.finalize();
    let mut id = hex::encode(digest);
    id.truncate(LOCATION_ID_LEN);
    id
}
