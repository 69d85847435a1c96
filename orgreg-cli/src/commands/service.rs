//! `orgreg service …`

use anyhow::Result;
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use orgreg_core::{Command, OrgId, Query, QueryResult, ServiceId, ServiceRegistration, Tag};

use super::{join_display, print_json, require_found, unexpected, Session};

#[derive(Subcommand, Debug)]
pub enum ServiceCommand {
    /// Register a service under an organization.
    Create(CreateArgs),
    /// Show one service registration.
    Show { org: OrgId, service: ServiceId },
    /// List the services of an organization.
    List { org: OrgId },
    /// Replace a service's metadata URI.
    Update {
        org: OrgId,
        service: ServiceId,
        #[arg(long)]
        metadata: String,
    },
    /// Add discovery tags.
    Tag {
        org: OrgId,
        service: ServiceId,
        #[arg(required = true)]
        tags: Vec<Tag>,
    },
    /// Remove discovery tags.
    Untag {
        org: OrgId,
        service: ServiceId,
        #[arg(required = true)]
        tags: Vec<Tag>,
    },
    /// Delete a service registration.
    Delete { org: OrgId, service: ServiceId },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub org: OrgId,
    pub service: ServiceId,

    /// Metadata URI (e.g. ipfs://…).
    #[arg(long)]
    pub metadata: String,

    /// Discovery tag; repeatable.
    #[arg(long = "tag", short = 't')]
    pub tags: Vec<Tag>,
}

pub fn run(session: &Session, command: ServiceCommand) -> Result<()> {
    match command {
        ServiceCommand::Create(args) => session.apply(Command::CreateServiceRegistration {
            org_id: args.org,
            service_id: args.service,
            metadata_uri: args.metadata.into(),
            tags: args.tags,
        }),
        ServiceCommand::Show { org, service } => show(session, org, service),
        ServiceCommand::List { org } => list(session, org),
        ServiceCommand::Update {
            org,
            service,
            metadata,
        } => session.apply(Command::UpdateServiceRegistration {
            org_id: org,
            service_id: service,
            metadata_uri: metadata.into(),
        }),
        ServiceCommand::Tag { org, service, tags } => {
            session.apply(Command::AddTagsToServiceRegistration {
                org_id: org,
                service_id: service,
                tags,
            })
        }
        ServiceCommand::Untag { org, service, tags } => {
            session.apply(Command::RemoveTagsFromServiceRegistration {
                org_id: org,
                service_id: service,
                tags,
            })
        }
        ServiceCommand::Delete { org, service } => {
            session.apply(Command::DeleteServiceRegistration {
                org_id: org,
                service_id: service,
            })
        }
    }
}

fn show(session: &Session, org: OrgId, service: ServiceId) -> Result<()> {
    let result = require_found(
        session.query(Query::GetServiceRegistrationById {
            org_id: org,
            service_id: service,
        })?,
        format!("service {org}/{service}"),
    )?;
    let registration = match result {
        QueryResult::Service {
            service: Some(registration),
        } => registration,
        other => return Err(unexpected(&other)),
    };

    if session.json {
        return print_json(&registration);
    }
    println!("{}", Table::new([ServiceRow::from(&registration)]).with(Style::rounded()));
    Ok(())
}

fn list(session: &Session, org: OrgId) -> Result<()> {
    let backend = session.backend()?;
    let result = require_found(
        backend.query(Query::ListServicesForOrganization { org_id: org })?,
        format!("organization {org}"),
    )?;
    let service_ids = match result {
        QueryResult::ServiceIds {
            service_ids: Some(ids),
        } => ids,
        other => return Err(unexpected(&other)),
    };

    let mut registrations = Vec::with_capacity(service_ids.len());
    for service_id in service_ids {
        if let QueryResult::Service {
            service: Some(registration),
        } = backend.query(Query::GetServiceRegistrationById {
            org_id: org,
            service_id,
        })? {
            registrations.push(registration);
        }
    }

    if session.json {
        return print_json(&registrations);
    }
    if registrations.is_empty() {
        println!("No services registered for {org}.");
        return Ok(());
    }
    let rows: Vec<ServiceRow> = registrations.iter().map(ServiceRow::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "org")]
    org: String,
    #[tabled(rename = "service")]
    service: String,
    #[tabled(rename = "metadata")]
    metadata: String,
    #[tabled(rename = "tags")]
    tags: String,
}

impl From<&ServiceRegistration> for ServiceRow {
    fn from(registration: &ServiceRegistration) -> Self {
        Self {
            org: registration.org_id.to_string(),
            service: registration.id.to_string(),
            metadata: registration.metadata_uri.to_string(),
            tags: join_display(&registration.tags),
        }
    }
}
