//! Durable JSON store for the location list.
//!
//! The store file is a single JSON document `{"locations": [...]}`.
//! All mutation goes through [`ConfigStore::replace`], which rewrites
//! the whole document via a temp file + rename so a reader never
//! observes a partially written state. There is no file locking:
//! concurrent writers from independent processes race last-writer-wins
//! (readers still only ever see a fully formed document).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::Location;

/// Maximum store file size (1MB). The location list is tiny; anything
/// larger is a corrupt or foreign file.
const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Errors from config store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Store file does not exist.
    #[error("config store not found at {0}")]
    NotFound(PathBuf),

    /// Store file exists but is not valid JSON of the expected shape.
    /// Fatal to the session: no auto-repair is attempted.
    #[error("config store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// File too large to be a plausible store document.
    #[error("config store file too large (max {MAX_FILE_SIZE} bytes)")]
    FileTooLarge,
}

/// The persisted root document: an ordered collection of locations.
///
/// Order carries no significance; consumers must not rely on position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationSet {
    locations: Vec<Location>,
}

impl LocationSet {
    /// Returns the number of locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Returns true if there are no locations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Returns an iterator over all locations.
    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }

    /// Returns the location with the given role, if any.
    #[must_use]
    pub fn get_by_role(&self, role: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.role == role)
    }

    /// Returns the location with the given id, if any.
    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.location_id == id)
    }

    /// Removes and returns the location with the given role.
    pub fn remove_role(&mut self, role: &str) -> Option<Location> {
        let idx = self.locations.iter().position(|l| l.role == role)?;
        Some(self.locations.remove(idx))
    }

    /// Inserts a location, replacing any existing one with the same
    /// role. Returns the replaced location, if any.
    pub fn insert(&mut self, location: Location) -> Option<Location> {
        let old = self.remove_role(&location.role);
        self.locations.push(location);
        old
    }

    /// Consumes the set, returning the locations.
    #[must_use]
    pub fn into_vec(self) -> Vec<Location> {
        self.locations
    }
}

/// JSON-backed config store with atomic full-document replacement.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Creates a store handle for the given file path. No I/O happens
    /// until [`init`](Self::init), [`read`](Self::read) or
    /// [`replace`](Self::replace) is called.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        assert!(!path.as_os_str().is_empty(), "store path must not be empty");
        Self { path }
    }

    /// Returns the store file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensures the containing directory exists and creates an empty
    /// store file if none is present. Idempotent.
    pub fn init(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "creating empty config store");
            self.write_atomic(&LocationSet::default())?;
        }
        Ok(())
    }

    /// Loads and parses the store document.
    pub fn read(&self) -> Result<LocationSet, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NotFound(self.path.clone()));
        }

        let metadata = fs::metadata(&self.path)?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(StoreError::FileTooLarge);
        }

        let content = fs::read_to_string(&self.path)?;
        let set = serde_json::from_str(&content)?;
        Ok(set)
    }

    /// Loads the current state, applies `transform`, and atomically
    /// writes the result back. Returns the transform's output.
    pub fn replace<R>(
        &self,
        transform: impl FnOnce(&mut LocationSet) -> R,
    ) -> Result<R, StoreError> {
        let mut set = self.read()?;
        let out = transform(&mut set);
        self.write_atomic(&set)?;
        Ok(out)
    }

    /// Writes the full document to a temp path, then renames it over
    /// the store file.
    fn write_atomic(&self, set: &LocationSet) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(set)?;
        let temp_path = self.path.with_extension("tmp");

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.flush()?;
        }

        fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&self.path, perms);
        }

        Ok(())
    }
}
