pub mod config;
pub mod daemon;
pub mod events;
pub mod interface;
pub mod org;
pub mod repo;
pub mod service;
pub mod tags;

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use serde::Serialize;

use orgreg_core::{
    config as registry_config, Address, Command, Query, QueryResult, Receipt, Registry,
    RegistryConfig, RegistryEvent,
};
use orgreg_daemon::{
    request_apply, request_compact, request_events, request_query, send_request, DaemonError,
    DaemonRequest,
};
use orgreg_ledger::{Compaction, Ledger, LedgerEntry, LedgerError};

/// Global options plus the loaded config, shared by every subcommand.
pub struct Session {
    pub home: PathBuf,
    pub config: RegistryConfig,
    pub json: bool,
    caller: Option<Address>,
}

impl Session {
    pub fn load(caller: Option<Address>, json: bool) -> Result<Self> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let config = registry_config::load_at(&home).context("failed to load config.yaml")?;
        Ok(Self {
            home,
            config,
            json,
            caller,
        })
    }

    /// `--as`, else `caller` from config.yaml.
    pub fn caller(&self) -> Result<Address> {
        self.caller.or(self.config.caller).ok_or_else(|| {
            anyhow!("no caller address: pass --as <address> or set `caller` in config.yaml")
        })
    }

    pub fn backend(&self) -> Result<Backend> {
        Backend::open(self)
    }

    /// Apply one mutation and print its receipt.
    pub fn apply(&self, command: Command) -> Result<()> {
        let caller = self.caller()?;
        let op = command.name();
        let receipt = self
            .backend()?
            .apply(caller, command)
            .with_context(|| format!("{op} failed"))?;
        self.print_receipt(op, &receipt)
    }

    pub fn query(&self, query: Query) -> Result<QueryResult> {
        self.backend()?.query(query)
    }

    pub fn print_receipt(&self, op: &str, receipt: &Receipt) -> Result<()> {
        if self.json {
            return print_json(receipt);
        }
        println!(
            "{} {} (seq {})",
            "✓".green(),
            op.bold(),
            receipt.seq
        );
        for event in &receipt.events {
            println!("  {}", describe_event(event));
        }
        Ok(())
    }
}

/// Where mutations and reads go: the running daemon, or the ledger opened
/// in-process.
pub enum Backend {
    Daemon { home: PathBuf },
    Local { ledger: Ledger, registry: Registry },
}

impl Backend {
    fn open(session: &Session) -> Result<Self> {
        match send_request(&session.home, &DaemonRequest::new("status")) {
            Ok(_) => Ok(Backend::Daemon {
                home: session.home.clone(),
            }),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let dir = session.config.ledger_dir_at(&session.home);
                let (ledger, registry) = match Ledger::open_at(&dir, session.config.policy.clone())
                {
                    Err(LedgerError::Busy { path }) => bail!(
                        "ledger busy: {} is held by another orgreg process",
                        path.display()
                    ),
                    opened => opened
                        .with_context(|| format!("failed to open ledger at {}", dir.display()))?,
                };
                Ok(Backend::Local {
                    ledger: ledger.with_snapshot_every(session.config.snapshot_every),
                    registry,
                })
            }
            Err(err) => Err(err).context("failed to reach daemon"),
        }
    }

    pub fn apply(&mut self, caller: Address, command: Command) -> Result<Receipt> {
        match self {
            Backend::Daemon { home } => Ok(request_apply(home, caller, command)?),
            Backend::Local { ledger, registry } => Ok(ledger.apply(registry, caller, &command)?),
        }
    }

    pub fn query(&self, query: Query) -> Result<QueryResult> {
        match self {
            Backend::Daemon { home } => Ok(request_query(home, query)?),
            Backend::Local { registry, .. } => Ok(registry.query(&query)),
        }
    }

    pub fn events(&self, from: u64) -> Result<Vec<LedgerEntry>> {
        match self {
            Backend::Daemon { home } => Ok(request_events(home, from)?),
            Backend::Local { ledger, .. } => Ok(ledger.entries_from(from)?),
        }
    }

    pub fn compact(&mut self) -> Result<Compaction> {
        match self {
            Backend::Daemon { home } => Ok(request_compact(home)?),
            Backend::Local { ledger, registry } => Ok(ledger.compact(registry)?),
        }
    }
}

/// `orgreg compact`
pub fn compact(session: &Session) -> Result<()> {
    let done = session
        .backend()?
        .compact()
        .context("ledger compaction failed")?;
    if session.json {
        return print_json(&done);
    }
    println!(
        "{} snapshot at seq {} ({} entries folded)",
        "✓".green(),
        done.seq,
        done.folded
    );
    Ok(())
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}

/// Reject a read answer that reports the entity as missing.
pub fn require_found(result: QueryResult, what: impl std::fmt::Display) -> Result<QueryResult> {
    if !result.found() {
        bail!("{what} not found");
    }
    Ok(result)
}

pub fn unexpected(result: &QueryResult) -> anyhow::Error {
    anyhow!("unexpected query result: {result:?}")
}

pub fn join_display<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    let parts: Vec<String> = items.into_iter().map(|item| item.to_string()).collect();
    if parts.is_empty() {
        "-".dimmed().to_string()
    } else {
        parts.join(", ")
    }
}

pub fn describe_event(event: &RegistryEvent) -> String {
    let detail = match event {
        RegistryEvent::OrganizationCreated { org_id }
        | RegistryEvent::OrganizationModified { org_id }
        | RegistryEvent::OrganizationDeleted { org_id } => format!("org={org_id}"),
        RegistryEvent::ServiceCreated {
            org_id,
            service_id,
            metadata_uri,
        }
        | RegistryEvent::ServiceMetadataModified {
            org_id,
            service_id,
            metadata_uri,
        } => format!("org={org_id} service={service_id} metadata={metadata_uri}"),
        RegistryEvent::ServiceTagsModified { org_id, service_id }
        | RegistryEvent::ServiceDeleted { org_id, service_id } => {
            format!("org={org_id} service={service_id}")
        }
        RegistryEvent::TypeRepositoryCreated {
            org_id,
            repository_id,
        }
        | RegistryEvent::TypeRepositoryModified {
            org_id,
            repository_id,
        }
        | RegistryEvent::TypeRepositoryDeleted {
            org_id,
            repository_id,
        } => format!("org={org_id} repo={repository_id}"),
    };
    format!("{} {}", event.name().cyan(), detail)
}
