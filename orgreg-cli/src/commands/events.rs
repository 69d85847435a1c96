//! `orgreg events [--from N] [--follow]`

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use orgreg_daemon::{subscribe, DaemonError};
use orgreg_ledger::LedgerEntry;

use super::{describe_event, print_json, Session};

#[derive(Args, Debug)]
pub struct EventsArgs {
    /// First ledger sequence number to show.
    #[arg(long, default_value_t = 0)]
    pub from: u64,

    /// Keep streaming receipts from the running daemon.
    #[arg(long)]
    pub follow: bool,
}

impl EventsArgs {
    pub fn run(self, session: &Session) -> Result<()> {
        let entries = session
            .backend()?
            .events(self.from)
            .context("failed to read ledger entries")?;
        if session.json {
            print_json(&entries)?;
        } else if entries.is_empty() && !self.follow {
            println!("No ledger entries from seq {}.", self.from);
        } else if !entries.is_empty() {
            let rows: Vec<EntryRow> = entries.iter().map(EntryRow::from).collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }

        if self.follow {
            follow(session)?;
        }
        Ok(())
    }
}

fn follow(session: &Session) -> Result<()> {
    let subscription = match subscribe(&session.home) {
        Ok(subscription) => subscription,
        Err(DaemonError::DaemonNotRunning { .. }) => {
            anyhow::bail!("--follow needs a running daemon (orgreg daemon start)")
        }
        Err(err) => return Err(err).context("failed to subscribe to daemon"),
    };
    for receipt in subscription {
        let receipt = receipt.context("daemon stream error")?;
        if session.json {
            println!("{}", serde_json::to_string(&receipt)?);
            continue;
        }
        for event in &receipt.events {
            println!("{:>6}  {}", receipt.seq, describe_event(event));
        }
    }
    Ok(())
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "seq")]
    seq: u64,
    #[tabled(rename = "at")]
    at: String,
    #[tabled(rename = "caller")]
    caller: String,
    #[tabled(rename = "operation")]
    op: String,
    #[tabled(rename = "events")]
    events: String,
}

impl From<&LedgerEntry> for EntryRow {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            seq: entry.seq,
            at: entry
                .at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            caller: entry.caller.to_string(),
            op: entry.command.name().to_string(),
            events: entry
                .events
                .iter()
                .map(describe_event)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}
