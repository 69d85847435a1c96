//! Ledger replay, compaction and tamper-detection integration tests.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use orgreg_core::{Address, Command, OrgId, Policy, Registry, ServiceId, Tag};
use orgreg_ledger::{Ledger, LedgerError, LEDGER_FILE, SNAPSHOT_FILE};
use tempfile::TempDir;

const A: Address = Address([0xaa; 20]);
const B: Address = Address([0xbb; 20]);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn org(label: &str) -> OrgId {
    OrgId::from_label(label).expect("org")
}

fn script() -> Vec<(Address, Command)> {
    vec![
        (A, Command::CreateOrganization { org_id: org("alpha"), name: "alpha".into(), members: vec![B] }),
        (B, Command::CreateOrganization { org_id: org("beta"), name: "beta".into(), members: vec![] }),
        (
            A,
            Command::CreateServiceRegistration {
                org_id: org("alpha"),
                service_id: ServiceId::from_label("search").unwrap(),
                metadata_uri: "ipfs://search".into(),
                tags: vec![Tag::from_label("ml").unwrap(), Tag::from_label("text").unwrap()],
            },
        ),
        (
            A,
            Command::RemoveTagsFromServiceRegistration {
                org_id: org("alpha"),
                service_id: ServiceId::from_label("search").unwrap(),
                tags: vec![Tag::from_label("text").unwrap()],
            },
        ),
        (A, Command::ChangeOrganizationOwner { org_id: org("alpha"), new_owner: B }),
        (B, Command::DeleteOrganization { org_id: org("beta") }),
    ]
}

fn run(dir: &Path, ops: &[(Address, Command)], compact_after: Option<usize>) -> Registry {
    let (mut ledger, mut registry) = Ledger::open_at(dir, Policy::default()).expect("open");
    for (i, (caller, command)) in ops.iter().enumerate() {
        ledger.apply(&mut registry, *caller, command).expect("apply");
        if compact_after == Some(i + 1) {
            ledger.compact(&registry).expect("compact");
        }
    }
    registry
}

// ---------------------------------------------------------------------------
// 1. Replay
// ---------------------------------------------------------------------------

#[test]
fn reopen_reproduces_identical_state() {
    init_logging();
    let dir = TempDir::new().expect("tempdir");
    let live = run(dir.path(), &script(), None);

    let (ledger, replayed) = Ledger::open_at(dir.path(), Policy::default()).expect("reopen");
    assert_eq!(replayed.state(), live.state());
    assert_eq!(replayed.seq(), 6);
    assert_eq!(ledger.head_seq(), 6);
    replayed.state().check_invariants().expect("invariants");
}

#[test]
fn snapshot_plus_tail_equals_full_replay() {
    init_logging();
    let full = TempDir::new().expect("tempdir");
    let compacted = TempDir::new().expect("tempdir");
    run(full.path(), &script(), None);
    run(compacted.path(), &script(), Some(3));

    assert!(compacted.path().join(SNAPSHOT_FILE).exists());
    let (_, from_full) = Ledger::open_at(full.path(), Policy::default()).unwrap();
    let (tail_ledger, from_snapshot) = Ledger::open_at(compacted.path(), Policy::default()).unwrap();

    assert_eq!(from_snapshot.state(), from_full.state());
    assert_eq!(from_snapshot.seq(), from_full.seq());
    let tail = tail_ledger.entries_from(0).unwrap();
    assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4, 5, 6]);
}

#[test]
fn events_are_readable_from_a_sequence_number() {
    let dir = TempDir::new().expect("tempdir");
    run(dir.path(), &script(), None);
    let (ledger, _) = Ledger::open_at(dir.path(), Policy::default()).unwrap();

    let entries = ledger.entries_from(5).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].caller, A);
    assert_eq!(entries[1].command.name(), "delete_organization");
    assert_eq!(entries[1].events.len(), 1);
}

// ---------------------------------------------------------------------------
// 2. Damage handling
// ---------------------------------------------------------------------------

#[test]
fn tampered_entry_breaks_digest_chain() {
    init_logging();
    let dir = TempDir::new().expect("tempdir");
    run(dir.path(), &script(), None);

    let path = dir.path().join(LEDGER_FILE);
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains(r#""name":"alpha""#));
    fs::write(&path, contents.replacen(r#""name":"alpha""#, r#""name":"omega""#, 1)).unwrap();

    let err = Ledger::open_at(dir.path(), Policy::default()).unwrap_err();
    match err {
        LedgerError::Corrupt { line, reason, .. } => {
            assert_eq!(line, 1);
            assert!(reason.contains("digest"), "got: {reason}");
        }
        other => panic!("expected Corrupt, got: {other}"),
    }
}

#[test]
fn dropped_entry_is_detected() {
    let dir = TempDir::new().expect("tempdir");
    run(dir.path(), &script(), None);

    let path = dir.path().join(LEDGER_FILE);
    let contents = fs::read_to_string(&path).unwrap();
    let without_first: String = contents.split_inclusive('\n').skip(1).collect();
    fs::write(&path, without_first).unwrap();

    let err = Ledger::open_at(dir.path(), Policy::default()).unwrap_err();
    assert!(err.to_string().contains("expected seq 1, found 2"), "got: {err}");
}

#[test]
fn torn_trailing_line_is_discarded_and_appends_continue() {
    init_logging();
    let dir = TempDir::new().expect("tempdir");
    run(dir.path(), &script()[..2], None);

    let path = dir.path().join(LEDGER_FILE);
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(br#"{"seq":3,"at":"2024-"#).unwrap();
    drop(file);

    let (mut ledger, mut registry) = Ledger::open_at(dir.path(), Policy::default()).expect("open");
    assert_eq!(ledger.head_seq(), 2);
    let (caller, command) = &script()[2];
    ledger.apply(&mut registry, *caller, command).expect("append after torn line");
    drop(ledger);

    let (ledger, reopened) = Ledger::open_at(dir.path(), Policy::default()).expect("reopen");
    assert_eq!(ledger.head_seq(), 3);
    assert_eq!(reopened.state(), registry.state());
}

#[test]
fn torn_line_cut_inside_a_multibyte_name_is_discarded() {
    init_logging();
    let dir = TempDir::new().expect("tempdir");
    let cafe = Command::CreateOrganization {
        org_id: org("cafe"),
        name: "Café".into(),
        members: vec![],
    };
    run(dir.path(), &[(A, cafe)], None);

    let path = dir.path().join(LEDGER_FILE);
    let line = fs::read(&path).unwrap();
    let accent = line
        .windows(2)
        .position(|pair| pair == "é".as_bytes())
        .expect("name written as raw UTF-8");
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&line[..accent + 1]).unwrap();
    drop(file);

    let (ledger, registry) = Ledger::open_at(dir.path(), Policy::default()).expect("open");
    assert_eq!(ledger.head_seq(), 1);
    assert_eq!(ledger.entries_from(0).unwrap().len(), 1);
    assert_eq!(fs::read(&path).unwrap(), line);
    assert_eq!(registry.list_organizations(), vec![org("cafe")]);
}

#[test]
fn duplicate_seq_after_replay_began_is_corrupt() {
    let dir = TempDir::new().expect("tempdir");
    run(dir.path(), &script()[..1], None);

    let path = dir.path().join(LEDGER_FILE);
    let first = fs::read_to_string(&path).unwrap();
    fs::write(&path, format!("{first}{first}")).unwrap();

    let err = Ledger::open_at(dir.path(), Policy::default()).unwrap_err();
    match err {
        LedgerError::Corrupt { line, reason, .. } => {
            assert_eq!(line, 2);
            assert!(reason.contains("duplicate seq 1"), "got: {reason}");
        }
        other => panic!("expected Corrupt, got: {other}"),
    }
}

#[test]
fn concurrent_writers_are_refused() {
    let dir = TempDir::new().expect("tempdir");
    let (mut first, mut registry) = Ledger::open_at(dir.path(), Policy::default()).expect("open");

    let err = Ledger::open_at(dir.path(), Policy::default()).unwrap_err();
    assert!(matches!(err, LedgerError::Busy { .. }), "got: {err}");
    assert!(err.to_string().contains("busy"));

    let (caller, command) = &script()[0];
    first.apply(&mut registry, *caller, command).expect("holder keeps writing");
    drop(first);

    let (ledger, reopened) = Ledger::open_at(dir.path(), Policy::default()).expect("reopen");
    assert_eq!(ledger.head_seq(), 1);
    assert_eq!(reopened.state(), registry.state());
}

#[test]
fn garbage_in_the_middle_is_corrupt() {
    let dir = TempDir::new().expect("tempdir");
    run(dir.path(), &script()[..1], None);

    let path = dir.path().join(LEDGER_FILE);
    let contents = fs::read_to_string(&path).unwrap();
    fs::write(&path, format!("not json\n{contents}")).unwrap();

    let err = Ledger::open_at(dir.path(), Policy::default()).unwrap_err();
    assert!(matches!(err, LedgerError::Corrupt { line: 1, .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 3. Compaction
// ---------------------------------------------------------------------------

#[test]
fn compaction_requires_matching_registry() {
    let dir = TempDir::new().expect("tempdir");
    let (mut ledger, mut registry) = Ledger::open_at(dir.path(), Policy::default()).unwrap();
    let (caller, command) = &script()[0];
    ledger.apply(&mut registry, *caller, command).unwrap();

    let stale = Registry::default();
    let err = ledger.compact(&stale).unwrap_err();
    assert!(matches!(err, LedgerError::OutOfSync { ledger: 1, registry: 0 }), "got: {err}");

    let done = ledger.compact(&registry).expect("compact");
    assert_eq!(done.seq, 1);
    assert_eq!(done.folded, 1);
}

#[test]
fn interrupted_compaction_skips_folded_entries() {
    let dir = TempDir::new().expect("tempdir");
    run(dir.path(), &script()[..3], None);
    let log = fs::read(dir.path().join(LEDGER_FILE)).unwrap();

    // Snapshot landed but the log was never truncated.
    let (mut ledger, registry) = Ledger::open_at(dir.path(), Policy::default()).unwrap();
    ledger.compact(&registry).unwrap();
    drop(ledger);
    fs::write(dir.path().join(LEDGER_FILE), &log).unwrap();

    let (ledger, reopened) = Ledger::open_at(dir.path(), Policy::default()).expect("reopen");
    assert_eq!(ledger.head_seq(), 3);
    assert_eq!(reopened.state(), registry.state());
}

#[cfg(unix)]
#[test]
fn snapshot_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let dir = TempDir::new().expect("tempdir");
    run(dir.path(), &script(), Some(2));
    let mode = fs::metadata(dir.path().join(SNAPSHOT_FILE))
        .unwrap()
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
}
