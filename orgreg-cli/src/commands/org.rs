//! `orgreg org …`

use anyhow::Result;
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use orgreg_core::{Address, Command, OrgId, Organization, Query, QueryResult};

use super::{join_display, print_json, require_found, unexpected, Session};

#[derive(Subcommand, Debug)]
pub enum OrgCommand {
    /// Create an organization owned by the caller.
    Create(CreateArgs),
    /// Show one organization.
    Show { org: OrgId },
    /// List every organization.
    List,
    /// Change an organization's display name.
    Rename { org: OrgId, name: String },
    /// Hand ownership to another address.
    Transfer { org: OrgId, new_owner: Address },
    /// Add member addresses.
    AddMembers {
        org: OrgId,
        #[arg(required = true)]
        members: Vec<Address>,
    },
    /// Remove member addresses.
    RemoveMembers {
        org: OrgId,
        #[arg(required = true)]
        members: Vec<Address>,
    },
    /// Delete an organization with all its services and repositories.
    Delete { org: OrgId },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Organization id: a label of up to 32 bytes or 0x + 64 hex digits.
    pub org: OrgId,

    /// Display name.
    #[arg(long)]
    pub name: String,

    /// Initial member address; repeatable.
    #[arg(long = "member", short = 'm', value_name = "ADDRESS")]
    pub members: Vec<Address>,
}

pub fn run(session: &Session, command: OrgCommand) -> Result<()> {
    match command {
        OrgCommand::Create(args) => session.apply(Command::CreateOrganization {
            org_id: args.org,
            name: args.name,
            members: args.members,
        }),
        OrgCommand::Show { org } => show(session, org),
        OrgCommand::List => list(session),
        OrgCommand::Rename { org, name } => session.apply(Command::ChangeOrganizationName {
            org_id: org,
            name,
        }),
        OrgCommand::Transfer { org, new_owner } => {
            session.apply(Command::ChangeOrganizationOwner {
                org_id: org,
                new_owner,
            })
        }
        OrgCommand::AddMembers { org, members } => {
            session.apply(Command::AddOrganizationMembers {
                org_id: org,
                members,
            })
        }
        OrgCommand::RemoveMembers { org, members } => {
            session.apply(Command::RemoveOrganizationMembers {
                org_id: org,
                members,
            })
        }
        OrgCommand::Delete { org } => session.apply(Command::DeleteOrganization { org_id: org }),
    }
}

fn show(session: &Session, org: OrgId) -> Result<()> {
    let result = require_found(
        session.query(Query::GetOrganizationById { org_id: org })?,
        format!("organization {org}"),
    )?;
    let organization = match result {
        QueryResult::Organization {
            organization: Some(organization),
        } => organization,
        other => return Err(unexpected(&other)),
    };

    if session.json {
        return print_json(&organization);
    }
    println!("{}", Table::new([OrgRow::from(&organization)]).with(Style::rounded()));
    println!("members: {}", join_display(&organization.members));
    println!("services: {}", join_display(&organization.service_ids));
    println!("repositories: {}", join_display(&organization.repository_ids));
    Ok(())
}

fn list(session: &Session) -> Result<()> {
    let backend = session.backend()?;
    let org_ids = match backend.query(Query::ListOrganizations)? {
        QueryResult::Organizations { org_ids } => org_ids,
        other => return Err(unexpected(&other)),
    };

    let mut organizations = Vec::with_capacity(org_ids.len());
    for org_id in org_ids {
        match backend.query(Query::GetOrganizationById { org_id })? {
            QueryResult::Organization {
                organization: Some(organization),
            } => organizations.push(organization),
            // Deleted between the two reads.
            QueryResult::Organization { organization: None } => {}
            other => return Err(unexpected(&other)),
        }
    }

    if session.json {
        return print_json(&organizations);
    }
    if organizations.is_empty() {
        println!("No organizations registered.");
        return Ok(());
    }
    let rows: Vec<OrgRow> = organizations.iter().map(OrgRow::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}

#[derive(Tabled)]
struct OrgRow {
    #[tabled(rename = "org")]
    id: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "owner")]
    owner: String,
    #[tabled(rename = "members")]
    members: usize,
    #[tabled(rename = "services")]
    services: usize,
    #[tabled(rename = "repos")]
    repos: usize,
}

impl From<&Organization> for OrgRow {
    fn from(org: &Organization) -> Self {
        Self {
            id: org.id.to_string(),
            name: org.name.clone(),
            owner: org.owner.to_string(),
            members: org.members.len(),
            services: org.service_ids.len(),
            repos: org.repository_ids.len(),
        }
    }
}
