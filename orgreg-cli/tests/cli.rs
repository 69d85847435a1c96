use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

fn orgreg_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("orgreg"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn run_ok(home: &Path, args: &[&str]) -> String {
    let assert = orgreg_cmd(home).args(args).assert().success();
    String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8")
}

fn seed(home: &Path) {
    run_ok(home, &["--as", ALICE, "org", "create", "acme", "--name", "Acme", "-m", BOB]);
    run_ok(
        home,
        &[
            "--as", ALICE, "service", "create", "acme", "search", "--metadata", "ipfs://search",
            "--tag", "ml", "--tag", "text",
        ],
    );
}

#[test]
fn mutation_without_caller_is_refused() {
    let home = TempDir::new().expect("home");
    orgreg_cmd(home.path())
        .args(["org", "create", "acme", "--name", "Acme"])
        .assert()
        .failure()
        .stderr(contains("no caller address"));
}

#[test]
fn create_and_discover_by_tag() {
    let home = TempDir::new().expect("home");
    seed(home.path());

    let stdout = run_ok(home.path(), &["tags", "services", "ml"]);
    assert!(stdout.contains("acme") && stdout.contains("search"), "{stdout}");

    let stdout = run_ok(home.path(), &["tags", "services"]);
    let tags: Vec<&str> = stdout.lines().collect();
    assert_eq!(tags, vec!["ml", "text"]);

    orgreg_cmd(home.path())
        .args(["tags", "repos", "ml"])
        .assert()
        .success()
        .stdout(contains("No repo tagged ml."));
}

#[test]
fn org_show_json_reflects_members_and_services() {
    let home = TempDir::new().expect("home");
    seed(home.path());

    let stdout = run_ok(home.path(), &["--json", "org", "show", "acme"]);
    let org: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    assert_eq!(org["name"], "Acme");
    assert_eq!(org["owner"], ALICE);
    assert_eq!(org["members"][0], BOB);
    assert_eq!(org["service_ids"].as_array().map(Vec::len), Some(1));
}

#[test]
fn non_owner_mutation_is_rejected_and_state_survives() {
    let home = TempDir::new().expect("home");
    seed(home.path());

    orgreg_cmd(home.path())
        .args(["--as", BOB, "org", "delete", "acme"])
        .assert()
        .failure()
        .stderr(contains("not authorized"));

    orgreg_cmd(home.path())
        .args(["org", "list"])
        .assert()
        .success()
        .stdout(contains("Acme"));
}

#[test]
fn cascade_delete_reports_every_event() {
    let home = TempDir::new().expect("home");
    seed(home.path());
    run_ok(
        home.path(),
        &["--as", ALICE, "repo", "create", "acme", "types", "--uri", "ipfs://types"],
    );

    let stdout = run_ok(home.path(), &["--as", ALICE, "org", "delete", "acme"]);
    assert!(stdout.contains("ServiceDeleted org=acme service=search"), "{stdout}");
    assert!(stdout.contains("TypeRepositoryDeleted org=acme repo=types"), "{stdout}");
    assert!(stdout.contains("OrganizationDeleted org=acme"), "{stdout}");

    orgreg_cmd(home.path())
        .args(["tags", "services", "ml"])
        .assert()
        .success()
        .stdout(contains("No service tagged ml."));
}

#[test]
fn events_and_compaction_survive_restart() {
    let home = TempDir::new().expect("home");
    seed(home.path());

    let stdout = run_ok(home.path(), &["--json", "events", "--from", "2"]);
    let entries: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    assert_eq!(entries.as_array().map(Vec::len), Some(1));
    assert_eq!(entries[0]["command"]["op"], "create_service_registration");

    orgreg_cmd(home.path())
        .arg("compact")
        .assert()
        .success()
        .stdout(contains("snapshot at seq 2"));

    orgreg_cmd(home.path())
        .args(["service", "show", "acme", "search"])
        .assert()
        .success()
        .stdout(contains("ipfs://search"));
}

#[test]
fn config_init_sets_default_caller() {
    let home = TempDir::new().expect("home");
    orgreg_cmd(home.path())
        .args(["config", "init", "--caller", ALICE])
        .assert()
        .success()
        .stdout(contains("config.yaml"));

    orgreg_cmd(home.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(contains("--force"));

    run_ok(home.path(), &["org", "create", "acme", "--name", "Acme"]);
    orgreg_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains(ALICE).and(contains("publishers: owner")));
}

#[test]
fn malformed_id_is_a_usage_error() {
    let home = TempDir::new().expect("home");
    orgreg_cmd(home.path())
        .args([
            "--as",
            ALICE,
            "org",
            "create",
            "an-organization-label-longer-than-32-bytes",
            "--name",
            "x",
        ])
        .assert()
        .failure()
        .stderr(contains("must be 1 to 32 bytes"));
}

#[test]
fn missing_entities_are_reported() {
    let home = TempDir::new().expect("home");
    orgreg_cmd(home.path())
        .args(["org", "show", "ghost"])
        .assert()
        .failure()
        .stderr(contains("organization ghost not found"));

    orgreg_cmd(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(contains("\"running\": false"));
}

#[test]
fn every_interface_set_is_supported_and_invalid_is_not() {
    let home = TempDir::new().expect("home");
    let stdout = run_ok(home.path(), &["--json", "interface"]);
    let rows: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    let rows = rows.as_array().expect("array");
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|row| row["supported"] == true));

    orgreg_cmd(home.path())
        .args(["interface", "0xffffffff"])
        .assert()
        .success()
        .stdout(contains("0xffffffff: no"));
}

#[test]
fn held_ledger_is_reported_busy() {
    let home = TempDir::new().expect("home");
    let dir = orgreg_core::RegistryConfig::default().ledger_dir_at(home.path());
    let held = orgreg_ledger::Ledger::open_at(&dir, orgreg_core::Policy::default()).expect("hold");

    orgreg_cmd(home.path())
        .args(["--as", ALICE, "org", "create", "acme", "--name", "Acme"])
        .assert()
        .failure()
        .stderr(contains("ledger busy"));

    drop(held);
    run_ok(home.path(), &["--as", ALICE, "org", "create", "acme", "--name", "Acme"]);
}
