use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

use orgreg_core::{config, Address, Command, Interface, Receipt, Registry, RegistryConfig, RegistryError};
use orgreg_ledger::{read_entries_at, Compaction, Ledger};

use crate::error::{io_err, DaemonError};
use crate::paths::{pid_path, run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};

pub type SharedRegistry = Arc<RwLock<Registry>>;

/// Work for the single writer task.
enum WriterJob {
    Apply {
        caller: Address,
        command: Command,
        respond_to: oneshot::Sender<Result<Receipt, RegistryError>>,
    },
    Compact {
        respond_to: oneshot::Sender<Result<Compaction, String>>,
    },
}

/// Read-only context shared by every socket client.
#[derive(Clone)]
struct ClientContext {
    home: PathBuf,
    ledger_dir: PathBuf,
    registry: SharedRegistry,
    jobs: mpsc::Sender<WriterJob>,
    receipts: broadcast::Sender<Receipt>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

/// Load config, start the daemon runtime and block the current thread until
/// it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    let config = config::load_at(home)?;
    init_tracing(&config.log_filter);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf, config: RegistryConfig) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let ledger_dir = config.ledger_dir_at(&home);
    let (ledger, registry) = {
        let dir = ledger_dir.clone();
        let policy = config.policy.clone();
        tokio::task::spawn_blocking(move || Ledger::open_at(&dir, policy))
            .await
            .map_err(|err| DaemonError::Protocol(format!("ledger open join error: {err}")))??
    };
    let ledger = ledger.with_snapshot_every(config.snapshot_every);
    tracing::info!(
        seq = registry.seq(),
        ledger = %ledger_dir.display(),
        "registry loaded"
    );

    let registry: SharedRegistry = Arc::new(RwLock::new(registry));
    let (jobs_tx, jobs_rx) = mpsc::channel::<WriterJob>(64);
    let (receipts_tx, _) = broadcast::channel::<Receipt>(256);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let pid_file = pid_path(&home);
    fs::write(&pid_file, std::process::id().to_string()).map_err(|e| io_err(&pid_file, e))?;

    let writer_handle = {
        let shutdown = shutdown_tx.clone();
        let registry = registry.clone();
        let receipts = receipts_tx.clone();
        tokio::spawn(async move {
            let result =
                writer_task(ledger, registry, receipts, jobs_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let context = ClientContext {
            home: home.clone(),
            ledger_dir,
            registry,
            jobs: jobs_tx,
            receipts: receipts_tx,
            shutdown_tx: shutdown.clone(),
            started_at_unix: unix_seconds_now(),
        };
        tokio::spawn(async move {
            let result = socket_server_task(context, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (writer_result, socket_result, signal_result) =
        tokio::join!(writer_handle, socket_handle, signal_handle);

    let _ = fs::remove_file(&pid_file);
    handle_join("writer", writer_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Sole owner of the ledger. Each job holds the registry write guard for the
/// whole apply + append step, so readers never observe an uncommitted state.
async fn writer_task(
    mut ledger: Ledger,
    registry: SharedRegistry,
    receipts: broadcast::Sender<Receipt>,
    mut jobs: mpsc::Receiver<WriterJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = jobs.recv() => {
                let Some(job) = maybe_job else { break };
                match job {
                    WriterJob::Apply { caller, command, respond_to } => {
                        let shared = registry.clone();
                        let (returned, command, outcome) = tokio::task::spawn_blocking(move || {
                            let mut guard = shared.blocking_write();
                            let outcome = ledger.apply(&mut guard, caller, &command);
                            (ledger, command, outcome)
                        })
                        .await
                        .map_err(|err| DaemonError::Protocol(format!("apply task join error: {err}")))?;
                        ledger = returned;

                        match &outcome {
                            Ok(receipt) => {
                                tracing::info!(
                                    seq = receipt.seq,
                                    op = command.name(),
                                    caller = %caller,
                                    events = receipt.events.len(),
                                    "applied",
                                );
                                let _ = receipts.send(receipt.clone());
                            }
                            Err(err) => {
                                tracing::warn!(
                                    op = command.name(),
                                    caller = %caller,
                                    kind = err.code(),
                                    error = %err,
                                    "rejected",
                                );
                            }
                        }
                        let _ = respond_to.send(outcome);
                    }
                    WriterJob::Compact { respond_to } => {
                        let shared = registry.clone();
                        let (returned, outcome) = tokio::task::spawn_blocking(move || {
                            let guard = shared.blocking_read();
                            let outcome = ledger.compact(&guard);
                            (ledger, outcome)
                        })
                        .await
                        .map_err(|err| DaemonError::Protocol(format!("compact task join error: {err}")))?;
                        ledger = returned;

                        if let Err(err) = &outcome {
                            tracing::error!(error = %err, "compaction failed");
                        }
                        let _ = respond_to.send(outcome.map_err(|err| err.to_string()));
                    }
                }
            }
        }
    }

    Ok(())
}

async fn socket_server_task(
    context: ClientContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let run = run_dir(&context.home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&context.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, context).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, context: ClientContext) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd.clone();
        if cmd == "subscribe" {
            return stream_receipts(&mut writer, &context).await;
        }

        let response = dispatch(request, &context).await;
        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn dispatch(request: DaemonRequest, context: &ClientContext) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(build_status_payload(context).await),
        "apply" => {
            let (Some(caller), Some(command)) = (request.caller, request.command) else {
                return DaemonResponse::error("apply requires 'caller' and 'command'");
            };
            match enqueue_apply(&context.jobs, caller, command).await {
                Ok(Ok(receipt)) => DaemonResponse::ok(json!(receipt)),
                Ok(Err(err)) => DaemonResponse::rejected(&err),
                Err(err) => DaemonResponse::error(err.to_string()),
            }
        }
        "query" => {
            let Some(query) = request.query else {
                return DaemonResponse::error("query requires 'query'");
            };
            let result = context.registry.read().await.query(&query);
            DaemonResponse::ok(json!(result))
        }
        "interface" => {
            let interfaces: Vec<Value> = Interface::ALL
                .iter()
                .map(|interface| {
                    json!({
                        "interface": interface,
                        "id": interface.id(),
                    })
                })
                .collect();
            DaemonResponse::ok(json!(interfaces))
        }
        "events" => {
            let dir = context.ledger_dir.clone();
            let from = request.from.unwrap_or(0);
            match tokio::task::spawn_blocking(move || read_entries_at(&dir, from)).await {
                Ok(Ok(entries)) => DaemonResponse::ok(json!(entries)),
                Ok(Err(err)) => DaemonResponse::error(err.to_string()),
                Err(err) => DaemonResponse::error(format!("events task join error: {err}")),
            }
        }
        "compact" => match enqueue_compact(&context.jobs).await {
            Ok(done) => DaemonResponse::ok(json!(done)),
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        "stop" => {
            let _ = context.shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

/// Push every committed receipt to the client until it disconnects or the
/// daemon shuts down.
async fn stream_receipts(
    writer: &mut OwnedWriteHalf,
    context: &ClientContext,
) -> Result<(), DaemonError> {
    let mut receipts = context.receipts.subscribe();
    let mut shutdown_rx = context.shutdown_tx.subscribe();
    write_response(writer, &DaemonResponse::ok(json!({ "subscribed": true }))).await?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            received = receipts.recv() => {
                let response = match received {
                    Ok(receipt) => DaemonResponse::ok(json!(receipt)),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        DaemonResponse::error(format!("subscriber lagged; {missed} receipts dropped"))
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if write_response(writer, &response).await.is_err() {
                    tracing::debug!("subscriber disconnected");
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn build_status_payload(context: &ClientContext) -> Value {
    let (seq, organizations, services, repositories) = {
        let registry = context.registry.read().await;
        let state = registry.state();
        (
            registry.seq(),
            state.organizations().len(),
            state.services().len(),
            state.type_repositories().len(),
        )
    };

    json!({
        "running": true,
        "pid": std::process::id(),
        "started_at_unix": context.started_at_unix,
        "seq": seq,
        "organizations": organizations,
        "services": services,
        "type_repositories": repositories,
        "subscribers": context.receipts.receiver_count(),
        "socket": socket_path(&context.home).display().to_string(),
        "ledger_dir": context.ledger_dir.display().to_string(),
    })
}

async fn enqueue_apply(
    jobs: &mpsc::Sender<WriterJob>,
    caller: Address,
    command: Command,
) -> Result<Result<Receipt, RegistryError>, DaemonError> {
    let (tx, rx) = oneshot::channel();
    jobs.send(WriterJob::Apply {
        caller,
        command,
        respond_to: tx,
    })
    .await
    .map_err(|_| DaemonError::ChannelClosed("writer queue"))?;

    rx.await
        .map_err(|_| DaemonError::ChannelClosed("writer response"))
}

async fn enqueue_compact(jobs: &mpsc::Sender<WriterJob>) -> Result<Compaction, DaemonError> {
    let (tx, rx) = oneshot::channel();
    jobs.send(WriterJob::Compact { respond_to: tx })
        .await
        .map_err(|_| DaemonError::ChannelClosed("writer queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("writer response"))?;
    outcome.map_err(DaemonError::Protocol)
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let run = run_dir(home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
