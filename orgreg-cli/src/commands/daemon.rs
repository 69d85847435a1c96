//! `orgreg daemon`: run the registry daemon and query its lifecycle.

use anyhow::{Context, Result};
use clap::Subcommand;

use orgreg_daemon::paths::socket_path;
use orgreg_daemon::{request_status, request_stop, start_blocking, DaemonError};

use super::{print_json, Session};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (ledger writer + socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
}

pub fn run(session: &Session, command: DaemonCommand) -> Result<()> {
    let home = &session.home;

    match command {
        DaemonCommand::Start => {
            start_blocking(home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(home) {
            Ok(status) => print_json(&status)?,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(home).display().to_string(),
                });
                print_json(&payload)?;
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
    }

    Ok(())
}
