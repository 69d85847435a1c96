//! Config file layout and atomic-write integration tests.

use assert_fs::prelude::*;
use orgreg_core::config::{self, PublishPolicy, RegistryConfig};
use orgreg_core::{Address, ConfigError};
use predicates::prelude::predicate;
use std::fs;

#[test]
fn save_writes_yaml_under_orgreg_root() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut cfg = RegistryConfig::default();
    cfg.policy.publishers = PublishPolicy::OwnerOrMember;
    cfg.caller = Some(Address([0x42; 20]));

    config::save_at(home.path(), &cfg).expect("save");

    home.child(".orgreg/config.yaml")
        .assert(predicate::path::exists())
        .assert(predicate::str::contains("publishers: owner_or_member"))
        .assert(predicate::str::contains("0x4242"));
    home.child(".orgreg/config.yaml.tmp")
        .assert(predicate::path::missing());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = config::config_path_at(home.path());
        let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
    }
}

#[test]
fn configured_ledger_dir_overrides_default() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let elsewhere = home.child("data/ledger");
    home.child(".orgreg/config.yaml")
        .write_str(&format!("ledger_dir: {}\nsnapshot_every: 0\n", elsewhere.path().display()))
        .expect("write config");

    let cfg = config::load_at(home.path()).expect("load");
    assert_eq!(cfg.ledger_dir_at(home.path()), elsewhere.path());
    assert_eq!(cfg.snapshot_every, 0);
}

#[test]
fn malformed_caller_is_a_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".orgreg/config.yaml")
        .write_str("caller: not-an-address\n")
        .expect("write config");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[test]
fn wrong_shape_is_a_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".orgreg/config.yaml")
        .write_str("- a list, not a mapping\n")
        .expect("write config");

    assert!(matches!(
        config::load_at(home.path()),
        Err(ConfigError::Parse { .. })
    ));
}
