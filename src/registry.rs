//! Location registry: CRUD over the store with singleton-per-role
//! enforcement and credential lifecycle management.
//!
//! The registry owns the ordering guarantees around credentials: a new
//! credential file is written before the store references it, and a
//! replaced location's credential is deleted only after the store swap,
//! so the store never points at a credential that does not exist.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::location::{
    Endpoint, Location, SmbEndpoint, SshAuth, SshEndpoint, location_id,
};
use crate::paths::RegistryPaths;
use crate::store::{ConfigStore, StoreError};
use crate::vault::{CredentialVault, VaultError};

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A location with this role already exists and `replace` was not
    /// requested. State is unchanged.
    #[error("a location with type {0:?} already exists")]
    ConflictExists(String),

    /// No location matches the requested role or id.
    #[error("no location with type or id {0:?}")]
    NotFound(String),

    /// Config store failure. The store is never left partially
    /// written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Credential vault failure.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Input for [`LocationRegistry::add`]: everything the caller knows
/// about a new location, with the password still in the clear. The
/// registry derives the id and the credential file path.
#[derive(Debug, Clone)]
pub struct NewLocation {
    /// Role slot this location fills.
    pub role: String,
    /// Human-readable name.
    pub label: String,
    /// Hostname or IP address.
    pub server: String,
    /// Username for authentication.
    pub username: String,
    /// Protocol-specific fields.
    pub endpoint: NewEndpoint,
}

/// Protocol-specific part of a [`NewLocation`].
#[derive(Debug, Clone)]
pub enum NewEndpoint {
    /// SMB share; always password-authenticated.
    Smb {
        /// Share name on the server.
        share: String,
        /// Path within the share.
        path: String,
        /// Share password, encrypted by the registry on add.
        password: String,
    },
    /// SSH host.
    Ssh {
        /// SSH port.
        port: u16,
        /// Remote path used by the backup engine.
        path: String,
        /// Authentication method.
        auth: NewSshAuth,
    },
}

/// SSH authentication input.
#[derive(Debug, Clone)]
pub enum NewSshAuth {
    /// Password, encrypted by the registry on add.
    Password(String),
    /// Path to an existing private key; nothing to encrypt.
    Key(PathBuf),
}

/// Result of [`LocationRegistry::resolve`].
#[derive(Debug, Clone)]
pub enum Resolved {
    /// A specific role was requested and found.
    Single(Location),
    /// No role was given: the full list, for the caller to present a
    /// choice.
    Choices(Vec<Location>),
}

/// Persisted registry of remote locations.
#[derive(Debug)]
pub struct LocationRegistry {
    store: ConfigStore,
    vault: CredentialVault,
    credentials_dir: PathBuf,
}

impl LocationRegistry {
    /// Opens (and if necessary initializes) the registry at the given
    /// paths.
    pub fn open(paths: RegistryPaths) -> Result<Self, RegistryError> {
        let store = ConfigStore::new(paths.store_path);
        store.init()?;

        std::fs::create_dir_all(&paths.credentials_dir).map_err(StoreError::Io)?;

        Ok(Self {
            store,
            vault: CredentialVault::new(paths.key_path),
            credentials_dir: paths.credentials_dir,
        })
    }

    /// Returns the vault, for collaborators (the prober) that need to
    /// read secrets.
    #[must_use]
    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// Adds a location in the role slot `new.role`.
    ///
    /// If a location with that role already exists, fails with
    /// [`RegistryError::ConflictExists`] unless `replace` is true. The
    /// interactive "replace existing?" confirmation is the caller's
    /// concern and feeds this flag.
    pub fn add(&self, new: NewLocation, replace: bool) -> Result<Location, RegistryError> {
        let previous = self.store.read()?.get_by_role(&new.role).cloned();
        if previous.is_some() && !replace {
            return Err(RegistryError::ConflictExists(new.role));
        }

        let (location, secret) = self.build_location(new);

        // When the replacement reuses the old credential path (same
        // protocol/role/server/share), encrypting in place would
        // destroy the old secret before the store swap. Stage the new
        // blob beside it and commit by rename only after the swap, so
        // a failed swap leaves the store and the old credential
        // untouched.
        let reuses_old_path = location.credential_file().is_some()
            && previous.as_ref().and_then(|old| old.credential_file())
                == location.credential_file();
        let staging = if reuses_old_path && secret.is_some() {
            location
                .credential_file()
                .map(|cred| cred.with_extension("cred.new"))
        } else {
            None
        };

        // Credential first: the store must never reference a file that
        // was not durably written.
        let mut written: Option<&Path> = None;
        if let Some(secret) = secret {
            let target = staging.as_deref().unwrap_or_else(|| {
                location
                    .credential_file()
                    .expect("password endpoint always has a credential file")
            });
            self.vault.encrypt(&secret, target)?;
            written = Some(target);
        }

        let replaced = match self.store.replace(|set| set.insert(location.clone())) {
            Ok(replaced) => replaced,
            Err(e) => {
                // Roll back exactly what this call wrote (the staged
                // blob, or the fresh credential) so a failed add
                // leaves no stray files and no missing old ones.
                if let Some(target) = written {
                    let _ = self.vault.remove(target);
                }
                return Err(e.into());
            }
        };

        // Commit the staged blob over the old path. Until the rename
        // lands, the referenced path still holds the old, valid blob.
        if let Some(staging) = &staging {
            let cred = location
                .credential_file()
                .expect("staging implies a credential file");
            std::fs::rename(staging, cred).map_err(|e| {
                VaultError::Encryption(format!(
                    "cannot commit credential {}: {e}",
                    cred.display()
                ))
            })?;
        }

        // Old credential goes last, once nothing references it. Skip
        // when the replacement reuses the same file.
        if let Some(old) = replaced {
            if let Some(old_cred) = old.credential_file() {
                if location.credential_file() != Some(old_cred) {
                    if let Err(e) = self.vault.remove(old_cred) {
                        tracing::warn!(
                            path = %old_cred.display(),
                            error = %e,
                            "could not remove replaced credential"
                        );
                    }
                }
            }
            tracing::info!(role = %location.role, server = %location.server, "location replaced");
        } else {
            tracing::info!(role = %location.role, server = %location.server, "location added");
        }

        Ok(location)
    }

    /// Removes the location in role slot `role` along with its
    /// credential file, if any.
    pub fn remove(&self, role: &str) -> Result<(), RegistryError> {
        let existing = self
            .store
            .read()?
            .get_by_role(role)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(role.to_string()))?;

        self.store.replace(|set| set.remove_role(role))?;

        if let Some(cred) = existing.credential_file() {
            self.vault.remove(cred)?;
        }

        tracing::info!(role, "location removed");
        Ok(())
    }

    /// Returns the location in role slot `role`.
    pub fn get(&self, role: &str) -> Result<Location, RegistryError> {
        self.store
            .read()?
            .get_by_role(role)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(role.to_string()))
    }

    /// Returns the location with the given id.
    pub fn get_by_id(&self, id: &str) -> Result<Location, RegistryError> {
        self.store
            .read()?
            .get_by_id(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Returns all locations. Small cardinality; order carries no
    /// significance.
    pub fn list(&self) -> Result<Vec<Location>, RegistryError> {
        Ok(self.store.read()?.into_vec())
    }

    /// Resolves a destination for the backup engine: a specific role,
    /// or the full list when no role is given so the caller can
    /// present a choice.
    pub fn resolve(&self, role: Option<&str>) -> Result<Resolved, RegistryError> {
        match role {
            Some(role) => self.get(role).map(Resolved::Single),
            None => self.list().map(Resolved::Choices),
        }
    }

    /// Builds the full location record from the caller's input,
    /// deriving the id and credential file path. Returns the location
    /// together with the secret still to be encrypted, if any.
    fn build_location(&self, new: NewLocation) -> (Location, Option<String>) {
        let (endpoint, secret) = match new.endpoint {
            NewEndpoint::Smb { share, path, password } => {
                let credential_file =
                    self.credential_path("smb", &new.role, &new.server, &share);
                (
                    Endpoint::Smb(SmbEndpoint {
                        share,
                        path,
                        credential_file,
                    }),
                    Some(password),
                )
            }
            NewEndpoint::Ssh { port, path, auth } => {
                let (auth, secret) = match auth {
                    NewSshAuth::Password(password) => (
                        SshAuth::Password {
                            credential_file: self.credential_path(
                                "ssh",
                                &new.role,
                                &new.server,
                                &port.to_string(),
                            ),
                        },
                        Some(password),
                    ),
                    NewSshAuth::Key(key_path) => (SshAuth::Key { key_path }, None),
                };
                (Endpoint::Ssh(SshEndpoint { port, path, auth }), secret)
            }
        };

        let mut location = Location {
            location_id: String::new(),
            role: new.role,
            label: new.label,
            server: new.server,
            username: new.username,
            endpoint,
        };
        location.location_id = location_id(
            &location.server,
            &location.share_or_port(),
            &location.label,
            &location.role,
        );
        (location, secret)
    }

    /// Deterministic credential file path from the identifying fields.
    fn credential_path(
        &self,
        protocol: &str,
        role: &str,
        server: &str,
        share_or_port: &str,
    ) -> PathBuf {
        self.credentials_dir
            .join(format!("{protocol}_{role}_{server}_{share_or_port}.cred"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn open_registry(dir: &std::path::Path) -> LocationRegistry {
        LocationRegistry::open(RegistryPaths::under(dir)).unwrap()
    }

    fn smb_input(role: &str, server: &str, password: &str) -> NewLocation {
        NewLocation {
            role: role.to_string(),
            label: "NAS".to_string(),
            server: server.to_string(),
            username: "u".to_string(),
            endpoint: NewEndpoint::Smb {
                share: "backups".to_string(),
                path: "routes".to_string(),
                password: password.to_string(),
            },
        }
    }

    fn ssh_key_input(role: &str, server: &str) -> NewLocation {
        NewLocation {
            role: role.to_string(),
            label: "workdir".to_string(),
            server: server.to_string(),
            username: "comma".to_string(),
            endpoint: NewEndpoint::Ssh {
                port: 22,
                path: "/data/backups".to_string(),
                auth: NewSshAuth::Key("/home/comma/.ssh/github".into()),
            },
        }
    }

    #[test]
    fn add_smb_creates_credential() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        let loc = registry.add(smb_input("route_sync", "nas.local", "hunter2"), false).unwrap();

        let cred = loc.credential_file().unwrap();
        assert!(cred.exists());
        assert_eq!(registry.vault().decrypt(cred).unwrap(), "hunter2");
        assert_eq!(registry.get("route_sync").unwrap(), loc);
    }

    #[test]
    fn add_ssh_key_needs_no_credential() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        let loc = registry.add(ssh_key_input("device_backup", "192.168.1.10"), false).unwrap();

        assert!(loc.credential_file().is_none());
        assert_eq!(loc.protocol(), "ssh");
        // Credentials directory stays empty for key auth.
        assert_eq!(std::fs::read_dir(dir.path().join("credentials")).unwrap().count(), 0);
    }

    #[test]
    fn second_add_without_replace_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        let first = registry.add(smb_input("route_sync", "nas.local", "hunter2"), false).unwrap();
        let err = registry
            .add(smb_input("route_sync", "other.local", "newpass"), false)
            .unwrap_err();

        assert!(matches!(err, RegistryError::ConflictExists(_)));
        // Store unchanged: same location, same credential content.
        assert_eq!(registry.get("route_sync").unwrap(), first);
        let cred = first.credential_file().unwrap();
        assert_eq!(registry.vault().decrypt(cred).unwrap(), "hunter2");
    }

    #[test]
    fn replace_swaps_location_and_credential() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        let old = registry.add(smb_input("route_sync", "nas.local", "hunter2"), false).unwrap();
        let new = registry.add(smb_input("route_sync", "nas2.local", "swordfish"), true).unwrap();

        let locations = registry.list().unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].server, "nas2.local");

        assert!(!old.credential_file().unwrap().exists());
        let cred = new.credential_file().unwrap();
        assert!(cred.exists());
        assert_eq!(registry.vault().decrypt(cred).unwrap(), "swordfish");
    }

    #[test]
    fn replace_with_same_coordinates_keeps_credential() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        registry.add(smb_input("route_sync", "nas.local", "hunter2"), false).unwrap();
        // Same server/share: the credential path is identical and the
        // file must survive the swap with the new secret.
        let new = registry.add(smb_input("route_sync", "nas.local", "newpass"), true).unwrap();

        let cred = new.credential_file().unwrap();
        assert!(cred.exists());
        assert_eq!(registry.vault().decrypt(cred).unwrap(), "newpass");
        // The staged blob was committed, not left beside the file.
        assert_eq!(
            std::fs::read_dir(dir.path().join("credentials")).unwrap().count(),
            1
        );
    }

    #[test]
    fn failed_store_swap_preserves_credential_on_same_path_replace() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        let old = registry.add(smb_input("route_sync", "nas.local", "hunter2"), false).unwrap();

        // Occupy the store's temp path with a directory so the atomic
        // write cannot land.
        std::fs::create_dir_all(dir.path().join("locations.tmp")).unwrap();

        let err = registry
            .add(smb_input("route_sync", "nas.local", "newpass"), true)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Store(_)));

        // The aborted replace left no partial mutation: the store
        // still holds the old location and its credential file still
        // decrypts to the old secret.
        let current = registry.get("route_sync").unwrap();
        assert_eq!(current, old);
        let cred = current.credential_file().unwrap();
        assert!(cred.exists());
        assert_eq!(registry.vault().decrypt(cred).unwrap(), "hunter2");

        // No staged blob survives the rollback.
        assert_eq!(
            std::fs::read_dir(dir.path().join("credentials")).unwrap().count(),
            1
        );
    }

    #[test]
    fn failed_store_swap_removes_fresh_credential_on_new_add() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        std::fs::create_dir_all(dir.path().join("locations.tmp")).unwrap();

        let err = registry
            .add(smb_input("route_sync", "nas.local", "hunter2"), false)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Store(_)));

        // A failed first add leaves no stray credential files.
        assert_eq!(
            std::fs::read_dir(dir.path().join("credentials")).unwrap().count(),
            0
        );
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn replace_across_roles_is_independent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        registry.add(smb_input("route_sync", "nas.local", "a"), false).unwrap();
        registry.add(ssh_key_input("device_backup", "192.168.1.10"), false).unwrap();

        assert_eq!(registry.list().unwrap().len(), 2);
    }

    #[test]
    fn remove_deletes_location_and_credential() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        let loc = registry.add(smb_input("route_sync", "nas.local", "hunter2"), false).unwrap();
        let cred = loc.credential_file().unwrap().to_path_buf();

        registry.remove("route_sync").unwrap();

        assert!(!cred.exists());
        assert!(matches!(registry.get("route_sync"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn remove_missing_role_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        let before = std::fs::read_dir(dir.path()).unwrap().flatten().count();
        let err = registry.remove("route_sync").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));

        // No files created or deleted by the failed remove.
        let after = std::fs::read_dir(dir.path()).unwrap().flatten().count();
        assert_eq!(before, after);
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn get_by_id_matches_get_by_role() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        let loc = registry.add(ssh_key_input("device_backup", "192.168.1.10"), false).unwrap();
        assert_eq!(registry.get_by_id(&loc.location_id).unwrap(), loc);
    }

    #[test]
    fn resolve_single_and_choices() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());

        registry.add(smb_input("route_sync", "nas.local", "a"), false).unwrap();
        registry.add(ssh_key_input("device_backup", "192.168.1.10"), false).unwrap();

        match registry.resolve(Some("route_sync")).unwrap() {
            Resolved::Single(loc) => assert_eq!(loc.role, "route_sync"),
            Resolved::Choices(_) => panic!("expected a single location"),
        }
        match registry.resolve(None).unwrap() {
            Resolved::Choices(all) => assert_eq!(all.len(), 2),
            Resolved::Single(_) => panic!("expected the full list"),
        }
    }
}
