//! `orgreg repo …`

use anyhow::Result;
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use orgreg_core::{Command, OrgId, Query, QueryResult, RepositoryId, Tag, TypeRepositoryRegistration};

use super::{join_display, print_json, require_found, unexpected, Session};

#[derive(Subcommand, Debug)]
pub enum RepoCommand {
    /// Register a type repository under an organization.
    Create(CreateArgs),
    /// Show one type-repository registration.
    Show { org: OrgId, repo: RepositoryId },
    /// List the type repositories of an organization.
    List { org: OrgId },
    /// Replace a repository URI.
    Update {
        org: OrgId,
        repo: RepositoryId,
        #[arg(long)]
        uri: String,
    },
    /// Add discovery tags.
    Tag {
        org: OrgId,
        repo: RepositoryId,
        #[arg(required = true)]
        tags: Vec<Tag>,
    },
    /// Remove discovery tags.
    Untag {
        org: OrgId,
        repo: RepositoryId,
        #[arg(required = true)]
        tags: Vec<Tag>,
    },
    /// Delete a type-repository registration.
    Delete { org: OrgId, repo: RepositoryId },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub org: OrgId,
    pub repo: RepositoryId,

    /// Repository URI (e.g. ipfs://…).
    #[arg(long)]
    pub uri: String,

    /// Discovery tag; repeatable.
    #[arg(long = "tag", short = 't')]
    pub tags: Vec<Tag>,
}

pub fn run(session: &Session, command: RepoCommand) -> Result<()> {
    match command {
        RepoCommand::Create(args) => session.apply(Command::CreateTypeRepositoryRegistration {
            org_id: args.org,
            repository_id: args.repo,
            repository_uri: args.uri.into(),
            tags: args.tags,
        }),
        RepoCommand::Show { org, repo } => show(session, org, repo),
        RepoCommand::List { org } => list(session, org),
        RepoCommand::Update { org, repo, uri } => {
            session.apply(Command::UpdateTypeRepositoryRegistration {
                org_id: org,
                repository_id: repo,
                repository_uri: uri.into(),
            })
        }
        RepoCommand::Tag { org, repo, tags } => {
            session.apply(Command::AddTagsToTypeRepositoryRegistration {
                org_id: org,
                repository_id: repo,
                tags,
            })
        }
        RepoCommand::Untag { org, repo, tags } => {
            session.apply(Command::RemoveTagsFromTypeRepositoryRegistration {
                org_id: org,
                repository_id: repo,
                tags,
            })
        }
        RepoCommand::Delete { org, repo } => {
            session.apply(Command::DeleteTypeRepositoryRegistration {
                org_id: org,
                repository_id: repo,
            })
        }
    }
}

fn show(session: &Session, org: OrgId, repo: RepositoryId) -> Result<()> {
    let result = require_found(
        session.query(Query::GetTypeRepositoryById {
            org_id: org,
            repository_id: repo,
        })?,
        format!("type repository {org}/{repo}"),
    )?;
    let registration = match result {
        QueryResult::TypeRepository {
            repository: Some(registration),
        } => registration,
        other => return Err(unexpected(&other)),
    };

    if session.json {
        return print_json(&registration);
    }
    println!("{}", Table::new([RepoRow::from(&registration)]).with(Style::rounded()));
    Ok(())
}

fn list(session: &Session, org: OrgId) -> Result<()> {
    let backend = session.backend()?;
    let result = require_found(
        backend.query(Query::ListTypeRepositoriesForOrganization { org_id: org })?,
        format!("organization {org}"),
    )?;
    let repository_ids = match result {
        QueryResult::RepositoryIds {
            repository_ids: Some(ids),
        } => ids,
        other => return Err(unexpected(&other)),
    };

    let mut registrations = Vec::with_capacity(repository_ids.len());
    for repository_id in repository_ids {
        if let QueryResult::TypeRepository {
            repository: Some(registration),
        } = backend.query(Query::GetTypeRepositoryById {
            org_id: org,
            repository_id,
        })? {
            registrations.push(registration);
        }
    }

    if session.json {
        return print_json(&registrations);
    }
    if registrations.is_empty() {
        println!("No type repositories registered for {org}.");
        return Ok(());
    }
    let rows: Vec<RepoRow> = registrations.iter().map(RepoRow::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}

#[derive(Tabled)]
struct RepoRow {
    #[tabled(rename = "org")]
    org: String,
    #[tabled(rename = "repo")]
    repo: String,
    #[tabled(rename = "uri")]
    uri: String,
    #[tabled(rename = "tags")]
    tags: String,
}

impl From<&TypeRepositoryRegistration> for RepoRow {
    fn from(registration: &TypeRepositoryRegistration) -> Self {
        Self {
            org: registration.org_id.to_string(),
            repo: registration.id.to_string(),
            uri: registration.repository_uri.to_string(),
            tags: join_display(&registration.tags),
        }
    }
}
