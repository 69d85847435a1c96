//! orgreg: organization, service and type-repository registry CLI.
//!
//! # Usage
//!
//! ```text
//! orgreg [--as <address>] [--json] org create|show|list|rename|transfer|add-members|remove-members|delete
//! orgreg service create|show|list|update|tag|untag|delete
//! orgreg repo create|show|list|update|tag|untag|delete
//! orgreg tags services|repos [<tag>]
//! orgreg events [--from N] [--follow]
//! orgreg interface [<id>]
//! orgreg compact
//! orgreg config show|init
//! orgreg daemon start|stop|status
//! ```
//!
//! Mutations are sent to the daemon when its socket answers; otherwise the
//! ledger is opened directly.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, events::EventsArgs, interface::InterfaceArgs,
    org::OrgCommand, repo::RepoCommand, service::ServiceCommand, tags::TagsCommand, Session,
};
use orgreg_core::Address;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "orgreg",
    version,
    about = "Register organizations, services and type repositories",
    long_about = None,
)]
struct Cli {
    /// Address to act as. Defaults to `caller` in config.yaml.
    #[arg(long = "as", global = true, value_name = "ADDRESS")]
    caller: Option<Address>,

    /// Emit machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, inspect and administer organizations.
    Org {
        #[command(subcommand)]
        command: OrgCommand,
    },

    /// Publish and maintain service registrations.
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },

    /// Publish and maintain type-repository registrations.
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },

    /// Discover services and type repositories by tag.
    Tags {
        #[command(subcommand)]
        command: TagsCommand,
    },

    /// Print committed ledger entries.
    Events(EventsArgs),

    /// Probe which operation sets this registry supports.
    Interface(InterfaceArgs),

    /// Fold the ledger into a fresh snapshot.
    Compact,

    /// Inspect or create config.yaml.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run and control the registry daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let session = Session::load(cli.caller, cli.json)?;
    match cli.command {
        Commands::Org { command } => commands::org::run(&session, command),
        Commands::Service { command } => commands::service::run(&session, command),
        Commands::Repo { command } => commands::repo::run(&session, command),
        Commands::Tags { command } => commands::tags::run(&session, command),
        Commands::Events(args) => args.run(&session),
        Commands::Interface(args) => args.run(&session),
        Commands::Compact => commands::compact(&session),
        Commands::Config { command } => commands::config::run(&session, command),
        Commands::Daemon { command } => commands::daemon::run(&session, command),
    }
}
