//! `orgreg tags services|repos [<tag>]`

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use orgreg_core::{Query, QueryResult, Tag, TagMatches};

use super::{print_json, unexpected, Session};

#[derive(Subcommand, Debug)]
pub enum TagsCommand {
    /// List service tags, or the services carrying one tag.
    Services { tag: Option<Tag> },
    /// List type-repository tags, or the repositories carrying one tag.
    Repos { tag: Option<Tag> },
}

pub fn run(session: &Session, command: TagsCommand) -> Result<()> {
    match command {
        TagsCommand::Services { tag: None } => list_tags(session, Query::ListServiceTags),
        TagsCommand::Repos { tag: None } => list_tags(session, Query::ListTypeRepositoryTags),
        TagsCommand::Services { tag: Some(tag) } => {
            match session.query(Query::ListServicesForTag { tag })? {
                QueryResult::Services { matches } => print_matches(session, tag, "service", &matches),
                other => Err(unexpected(&other)),
            }
        }
        TagsCommand::Repos { tag: Some(tag) } => {
            match session.query(Query::ListTypeRepositoriesForTag { tag })? {
                QueryResult::TypeRepositories { matches } => {
                    print_matches(session, tag, "repo", &matches)
                }
                other => Err(unexpected(&other)),
            }
        }
    }
}

fn list_tags(session: &Session, query: Query) -> Result<()> {
    let tags = match session.query(query)? {
        QueryResult::Tags { tags } => tags,
        other => return Err(unexpected(&other)),
    };
    if session.json {
        return print_json(&tags);
    }
    if tags.is_empty() {
        println!("No tags in use.");
    }
    for tag in tags {
        println!("{tag}");
    }
    Ok(())
}

#[derive(Tabled)]
struct MatchRow {
    #[tabled(rename = "org")]
    org: String,
    #[tabled(rename = "id")]
    id: String,
}

fn print_matches<E>(session: &Session, tag: Tag, noun: &str, matches: &TagMatches<E>) -> Result<()>
where
    E: std::fmt::Display + Serialize,
{
    if session.json {
        return print_json(matches);
    }
    if matches.is_empty() {
        println!("No {noun} tagged {tag}.");
        return Ok(());
    }
    let rows: Vec<MatchRow> = matches
        .pairs()
        .map(|(org, id)| MatchRow {
            org: org.to_string(),
            id: id.to_string(),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}
