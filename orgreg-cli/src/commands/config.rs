//! `orgreg config show|init`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use orgreg_core::config::{config_path_at, save_at, PublishPolicy, RegistryConfig};
use orgreg_core::Address;

use super::{print_json, Session};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration.
    Show,
    /// Write a config.yaml with defaults.
    Init(InitArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Default caller address for mutating commands.
    #[arg(long, value_name = "ADDRESS")]
    pub caller: Option<Address>,

    /// Let organization members publish, not only the owner.
    #[arg(long)]
    pub members_publish: bool,

    /// Overwrite an existing config.yaml.
    #[arg(long)]
    pub force: bool,
}

pub fn run(session: &Session, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => show(session),
        ConfigCommand::Init(args) => init(session, args),
    }
}

fn show(session: &Session) -> Result<()> {
    if session.json {
        return print_json(&session.config);
    }
    let path = config_path_at(&session.home);
    let origin = if path.exists() {
        path.display().to_string()
    } else {
        "defaults (no config.yaml)".dimmed().to_string()
    };
    println!("# {origin}");
    println!("# ledger: {}", session.config.ledger_dir_at(&session.home).display());
    print!(
        "{}",
        serde_yaml::to_string(&session.config).context("failed to render config")?
    );
    Ok(())
}

fn init(session: &Session, args: InitArgs) -> Result<()> {
    let path = config_path_at(&session.home);
    if path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    let mut config = RegistryConfig {
        caller: args.caller,
        ..RegistryConfig::default()
    };
    if args.members_publish {
        config.policy.publishers = PublishPolicy::OwnerOrMember;
    }

    let written = save_at(&session.home, &config)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("{} wrote {}", "✓".green(), written.display());
    Ok(())
}
