//! netloc
//!
//! Device-side registry of remote storage destinations (SMB shares and
//! SSH hosts) used for backup and synchronization, with encrypted
//! credentials and protocol-abstracted connectivity probing.
//!
//! # Architecture
//!
//! - **Store Module**: durable JSON document of locations with atomic
//!   full-document replacement
//! - **Vault Module**: AES-256-GCM credential files keyed by a
//!   device-local key
//! - **Registry Module**: CRUD with one location per role slot and a
//!   1:1 credential lifecycle
//! - **Probe Module**: blocking SMB/SSH reachability and artifact
//!   checks
//! - **Retry Module**: fixed-delay retry wrapper gated on network
//!   reachability
//!
//! # Usage
//!
//! ```no_run
//! use netloc::{LocationRegistry, RegistryPaths};
//!
//! let registry = LocationRegistry::open(RegistryPaths::default())?;
//! for location in registry.list()? {
//!     println!("{}: {}", location.role, location.connection_string());
//! }
//! # Ok::<(), netloc::RegistryError>(())
//! ```

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod location;
pub mod logging;
pub mod paths;
pub mod probe;
pub mod registry;
pub mod retry;
pub mod store;
pub mod vault;

// Re-export main types
pub use location::{Endpoint, Location, SmbEndpoint, SshAuth, SshEndpoint, location_id};
pub use paths::RegistryPaths;
pub use probe::{ProbeError, Prober};
pub use registry::{
    LocationRegistry, NewEndpoint, NewLocation, NewSshAuth, RegistryError, Resolved,
};
pub use retry::{RetryError, RetryPolicy, check_connectivity, with_retry};
pub use store::{ConfigStore, LocationSet, StoreError};
pub use vault::{CredentialVault, VaultError};
