//! End-to-end daemon tests over the real Unix socket.

use std::path::PathBuf;

use orgreg_core::{
    Address, Command, OrgId, Query, QueryResult, RegistryConfig, RegistryEvent, ServiceId, Tag,
};
use orgreg_daemon::{
    request_apply, request_events, request_query, request_status, request_stop, subscribe,
    DaemonError,
};
use tempfile::TempDir;

const A: Address = Address([0xaa; 20]);
const B: Address = Address([0xbb; 20]);

fn org(label: &str) -> OrgId {
    OrgId::from_label(label).expect("org id")
}

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("blocking task")
}

/// Start the daemon on `home` and wait until it answers `status`.
async fn start(home: PathBuf) -> tokio::task::JoinHandle<Result<(), DaemonError>> {
    let daemon = tokio::spawn(orgreg_daemon::run(home.clone(), RegistryConfig::default()));
    let status = blocking(move || request_status(&home)).await.expect("daemon status");
    assert_eq!(status["running"], serde_json::json!(true));
    daemon
}

async fn stop(home: PathBuf, daemon: tokio::task::JoinHandle<Result<(), DaemonError>>) {
    blocking(move || request_stop(&home)).await.expect("stop");
    daemon.await.expect("join").expect("daemon exit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn apply_query_and_events_round_trip_over_socket() {
    let home = TempDir::new().expect("home");
    let path = home.path().to_path_buf();
    let daemon = start(path.clone()).await;

    let p = path.clone();
    let receipt = blocking(move || {
        request_apply(
            &p,
            A,
            Command::CreateOrganization {
                org_id: org("acme"),
                name: "Acme".into(),
                members: vec![B],
            },
        )
    })
    .await
    .expect("create org");
    assert_eq!(receipt.seq, 1);
    assert_eq!(
        receipt.events,
        vec![RegistryEvent::OrganizationCreated { org_id: org("acme") }]
    );

    let p = path.clone();
    let result = blocking(move || request_query(&p, Query::GetOrganizationById { org_id: org("acme") }))
        .await
        .expect("query");
    match result {
        QueryResult::Organization { organization: Some(found) } => {
            assert_eq!(found.name, "Acme");
            assert_eq!(found.owner, A);
            assert!(found.members.contains(&B));
        }
        other => panic!("unexpected query result: {other:?}"),
    }

    let p = path.clone();
    let entries = blocking(move || request_events(&p, 0)).await.expect("events");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].caller, A);

    stop(path, daemon).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejection_carries_error_category() {
    let home = TempDir::new().expect("home");
    let path = home.path().to_path_buf();
    let daemon = start(path.clone()).await;

    let p = path.clone();
    let err = blocking(move || {
        request_apply(&p, A, Command::DeleteOrganization { org_id: org("ghost") })
    })
    .await
    .unwrap_err();
    match err {
        DaemonError::Rejected { kind, .. } => assert_eq!(kind.as_deref(), Some("not_found")),
        other => panic!("expected rejection, got {other}"),
    }

    stop(path, daemon).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscribers_receive_committed_receipts() {
    let home = TempDir::new().expect("home");
    let path = home.path().to_path_buf();
    let daemon = start(path.clone()).await;

    let p = path.clone();
    let mut subscription = blocking(move || subscribe(&p)).await.expect("subscribe");

    let p = path.clone();
    blocking(move || {
        request_apply(
            &p,
            A,
            Command::CreateOrganization {
                org_id: org("acme"),
                name: "Acme".into(),
                members: vec![],
            },
        )?;
        request_apply(
            &p,
            A,
            Command::CreateServiceRegistration {
                org_id: org("acme"),
                service_id: ServiceId::from_label("search").expect("service id"),
                metadata_uri: "ipfs://search".into(),
                tags: vec![Tag::from_label("ml").expect("tag")],
            },
        )
    })
    .await
    .expect("apply");

    let receipts = blocking(move || {
        let first = subscription.next().expect("first").expect("receipt");
        let second = subscription.next().expect("second").expect("receipt");
        (first, second)
    })
    .await;
    assert_eq!(receipts.0.seq, 1);
    assert_eq!(receipts.1.seq, 2);
    assert!(matches!(
        receipts.1.events[0],
        RegistryEvent::ServiceCreated { .. }
    ));

    stop(path, daemon).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_replays_ledger() {
    let home = TempDir::new().expect("home");
    let path = home.path().to_path_buf();

    let daemon = start(path.clone()).await;
    let p = path.clone();
    blocking(move || {
        request_apply(
            &p,
            A,
            Command::CreateOrganization {
                org_id: org("acme"),
                name: "Acme".into(),
                members: vec![],
            },
        )
    })
    .await
    .expect("create org");
    stop(path.clone(), daemon).await;

    let daemon = start(path.clone()).await;
    let p = path.clone();
    let status = blocking(move || request_status(&p)).await.expect("status");
    assert_eq!(status["seq"], serde_json::json!(1));
    assert_eq!(status["organizations"], serde_json::json!(1));
    stop(path, daemon).await;
}

#[test]
fn status_without_daemon_reports_not_running() {
    let home = TempDir::new().expect("home");
    let err = request_status(home.path()).unwrap_err();
    assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got: {err}");
}
