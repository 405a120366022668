//! Connectivity prober.
//!
//! Verifies that a configured location is actually reachable and
//! usable before the backup engine commits to it. All operations are
//! synchronous and blocking, bounded by a fixed connect timeout; the
//! prober never retries internally (that is the retry helper's job).

mod smb;
mod ssh;

use std::time::Duration;

use thiserror::Error;

use crate::location::{Endpoint, Location, SshAuth, SshEndpoint};
use crate::vault::{CredentialVault, VaultError};

pub use smb::SmbClient;

/// Default connect timeout for probe operations.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from probe operations. The variant names the stage that
/// failed; the message carries the client's diagnostic text so an
/// operator can act on it.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// TCP connection to the remote host failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection attempt exceeded the configured timeout.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// SSH handshake failed.
    #[error("SSH handshake failed: {0}")]
    Handshake(String),

    /// Authentication was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The remote no-op or listing command failed.
    #[error("remote command failed: {0}")]
    Command(String),

    /// The SMB client reported an error.
    #[error("smb client error: {0}")]
    Client(String),

    /// The location's credential could not be decrypted.
    #[error(transparent)]
    Credential(#[from] VaultError),
}

/// Protocol-abstracted reachability and artifact checks.
#[derive(Debug)]
pub struct Prober {
    vault: CredentialVault,
    smb: SmbClient,
    connect_timeout: Duration,
}

impl Prober {
    /// Creates a prober reading secrets from `vault`, with the default
    /// connect timeout.
    #[must_use]
    pub fn new(vault: CredentialVault) -> Self {
        Self::with_timeout(vault, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Creates a prober with an explicit connect timeout.
    #[must_use]
    pub fn with_timeout(vault: CredentialVault, connect_timeout: Duration) -> Self {
        Self {
            vault,
            smb: SmbClient::new(connect_timeout),
            connect_timeout,
        }
    }

    /// Tests that the location is reachable and its credentials work.
    ///
    /// `Ok(())` means the remote no-op (SSH) or trivial listing (SMB)
    /// completed successfully within the timeout; the error otherwise
    /// names the failing stage and carries the remote diagnostic.
    pub fn test(&self, location: &Location) -> Result<(), ProbeError> {
        tracing::debug!(
            role = %location.role,
            target = %location.connection_string(),
            "probing location"
        );
        match &location.endpoint {
            Endpoint::Smb(smb) => {
                let password = self.vault.decrypt(&smb.credential_file)?;
                self.smb
                    .list(&location.server, &smb.share, &location.username, &password)
            }
            Endpoint::Ssh(ssh) => {
                let session = self.ssh_session(location, ssh)?;
                ssh::run_noop(&session)
            }
        }
    }

    /// Checks whether a previously produced backup artifact exists at
    /// `remote_path`. Used by callers deciding skip-vs-overwrite.
    ///
    /// "Absent" is distinguished from "could not check": the former is
    /// `Ok(false)`, the latter an error.
    pub fn artifact_exists(
        &self,
        location: &Location,
        remote_path: &str,
    ) -> Result<bool, ProbeError> {
        match &location.endpoint {
            Endpoint::Smb(smb) => {
                let password = self.vault.decrypt(&smb.credential_file)?;
                self.smb.exists(
                    &location.server,
                    &smb.share,
                    &location.username,
                    &password,
                    remote_path,
                )
            }
            Endpoint::Ssh(ssh) => {
                let session = self.ssh_session(location, ssh)?;
                ssh::remote_path_exists(&session, remote_path)
            }
        }
    }

    /// Opens an authenticated SSH session for the location, decrypting
    /// the password credential when needed.
    fn ssh_session(
        &self,
        location: &Location,
        ssh: &SshEndpoint,
    ) -> Result<ssh2::Session, ProbeError> {
        let session =
            ssh::handshake(&location.server, ssh.port, self.connect_timeout)?;
        match &ssh.auth {
            SshAuth::Password { credential_file } => {
                let password = self.vault.decrypt(credential_file)?;
                ssh::auth_password(&session, &location.username, &password)?;
            }
            SshAuth::Key { key_path } => {
                ssh::auth_key(&session, &location.username, key_path)?;
            }
        }
        Ok(session)
    }
}
