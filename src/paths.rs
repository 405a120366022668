//! Filesystem layout for the registry.
//!
//! All paths are explicit configuration injected at construction; there
//! is no process-wide mutable state.

use std::path::PathBuf;

/// Paths used by the registry: the store document, the credentials
/// directory, and the device vault key.
#[derive(Debug, Clone)]
pub struct RegistryPaths {
    /// JSON store document.
    pub store_path: PathBuf,
    /// Directory holding encrypted credential files.
    pub credentials_dir: PathBuf,
    /// Device-local vault key file.
    pub key_path: PathBuf,
}

impl RegistryPaths {
    /// Default root directory: `~/.netloc`.
    #[must_use]
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".netloc")
    }

    /// Standard layout under an arbitrary root directory.
    #[must_use]
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            store_path: root.join("locations.json"),
            credentials_dir: root.join("credentials"),
            key_path: root.join("vault.key"),
        }
    }
}

impl Default for RegistryPaths {
    fn default() -> Self {
        Self::under(Self::default_root())
    }
}
