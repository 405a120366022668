//! Integration tests for the location registry end to end:
//! add/replace/remove across store, vault, and credential files, plus
//! the JSON document a caller (menu layer, backup engine) would see on
//! disk.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;

use netloc::{
    LocationRegistry, NewEndpoint, NewLocation, NewSshAuth, RegistryError, RegistryPaths,
    Resolved,
};
use pretty_assertions::assert_eq;

fn open(dir: &Path) -> LocationRegistry {
    LocationRegistry::open(RegistryPaths::under(dir)).unwrap()
}

fn ssh_backup_input() -> NewLocation {
    NewLocation {
        role: "device_backup".to_string(),
        label: "workbench".to_string(),
        server: "192.168.1.10".to_string(),
        username: "comma".to_string(),
        endpoint: NewEndpoint::Ssh {
            port: 22,
            path: "/data/backups".to_string(),
            auth: NewSshAuth::Key("/home/comma/.ssh/github".into()),
        },
    }
}

fn smb_sync_input(password: &str) -> NewLocation {
    NewLocation {
        role: "route_sync".to_string(),
        label: "NAS".to_string(),
        server: "nas.local".to_string(),
        username: "u".to_string(),
        endpoint: NewEndpoint::Smb {
            share: "backups".to_string(),
            path: "routes".to_string(),
            password: password.to_string(),
        },
    }
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn ssh_key_location_lands_in_store() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());

    let added = registry.add(ssh_backup_input(), false).unwrap();

    let all = registry.list().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0], added);
    assert_eq!(added.protocol(), "ssh");
    assert!(added.credential_file().is_none());

    // The persisted document has the flat wire shape.
    let content = fs::read_to_string(dir.path().join("locations.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&content).unwrap();
    let entry = &doc["locations"][0];
    assert_eq!(entry["type"], "device_backup");
    assert_eq!(entry["protocol"], "ssh");
    assert_eq!(entry["auth_type"], "key");
    assert_eq!(entry["key_path"], "/home/comma/.ssh/github");
    assert_eq!(entry["port"], 22);
}

#[test]
fn smb_location_creates_decryptable_credential() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());

    let added = registry.add(smb_sync_input("hunter2"), false).unwrap();

    let cred = added.credential_file().unwrap();
    assert!(cred.exists());
    assert_eq!(registry.vault().decrypt(cred).unwrap(), "hunter2");
}

#[test]
fn remove_on_empty_store_is_not_found_and_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());

    let creds_dir = dir.path().join("credentials");
    assert_eq!(fs::read_dir(&creds_dir).unwrap().count(), 0);

    let err = registry.remove("route_sync").unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
    assert_eq!(fs::read_dir(&creds_dir).unwrap().count(), 0);
    assert!(registry.list().unwrap().is_empty());
}

// ============================================================================
// Lifecycle across registry instances
// ============================================================================

#[test]
fn registry_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let added = {
        let registry = open(dir.path());
        registry.add(smb_sync_input("hunter2"), false).unwrap()
    };

    let reopened = open(dir.path());
    assert_eq!(reopened.get("route_sync").unwrap(), added);
    assert_eq!(
        reopened.vault().decrypt(added.credential_file().unwrap()).unwrap(),
        "hunter2"
    );
}

#[test]
fn replace_then_remove_leaves_clean_tree() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());

    registry.add(smb_sync_input("first"), false).unwrap();
    let mut second = smb_sync_input("second");
    second.server = "nas2.local".to_string();
    registry.add(second, true).unwrap();
    registry.add(ssh_backup_input(), false).unwrap();

    registry.remove("route_sync").unwrap();
    registry.remove("device_backup").unwrap();

    assert!(registry.list().unwrap().is_empty());
    assert_eq!(fs::read_dir(dir.path().join("credentials")).unwrap().count(), 0);
}

#[test]
fn conflict_does_not_disturb_existing_credential() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());

    let first = registry.add(smb_sync_input("hunter2"), false).unwrap();
    assert!(matches!(
        registry.add(smb_sync_input("other"), false),
        Err(RegistryError::ConflictExists(_))
    ));

    assert_eq!(
        registry.vault().decrypt(first.credential_file().unwrap()).unwrap(),
        "hunter2"
    );
    assert_eq!(fs::read_dir(dir.path().join("credentials")).unwrap().count(), 1);
}

// ============================================================================
// Resolution for the backup engine
// ============================================================================

#[test]
fn resolve_feeds_menu_and_engine() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());

    registry.add(ssh_backup_input(), false).unwrap();
    registry.add(smb_sync_input("hunter2"), false).unwrap();

    match registry.resolve(Some("device_backup")).unwrap() {
        Resolved::Single(loc) => assert_eq!(loc.server, "192.168.1.10"),
        Resolved::Choices(_) => panic!("expected a single location"),
    }

    match registry.resolve(None).unwrap() {
        Resolved::Choices(all) => {
            let mut roles: Vec<_> = all.iter().map(|l| l.role.as_str()).collect();
            roles.sort_unstable();
            assert_eq!(roles, ["device_backup", "route_sync"]);
        }
        Resolved::Single(_) => panic!("expected the full list"),
    }

    assert!(matches!(
        registry.resolve(Some("ssh_backup")),
        Err(RegistryError::NotFound(_))
    ));
}

#[test]
fn ids_are_stable_across_adds() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());

    let first = registry.add(ssh_backup_input(), false).unwrap();
    registry.remove("device_backup").unwrap();
    let second = registry.add(ssh_backup_input(), false).unwrap();

    assert_eq!(first.location_id, second.location_id);
    assert_eq!(registry.get_by_id(&second.location_id).unwrap(), second);
}
