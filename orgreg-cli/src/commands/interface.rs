//! `orgreg interface [<id>]`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use orgreg_core::{Interface, InterfaceId, Query, QueryResult};

use super::{print_json, unexpected, Backend, Session};

#[derive(Args, Debug)]
pub struct InterfaceArgs {
    /// Probe a single 4-byte interface id (0x…); omit to list every set.
    pub id: Option<InterfaceId>,
}

#[derive(Serialize, Tabled)]
struct InterfaceRow {
    #[tabled(rename = "interface")]
    name: String,
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "supported")]
    supported: bool,
}

impl InterfaceArgs {
    pub fn run(self, session: &Session) -> Result<()> {
        let backend = session.backend()?;

        if let Some(id) = self.id {
            let supported = supports(&backend, id)?;
            if session.json {
                return print_json(&serde_json::json!({ "id": id, "supported": supported }));
            }
            let mark = if supported { "yes".green() } else { "no".red() };
            println!("{id}: {mark}");
            return Ok(());
        }

        let mut rows = Vec::with_capacity(Interface::ALL.len());
        for interface in Interface::ALL {
            rows.push(InterfaceRow {
                name: format!("{interface:?}"),
                id: interface.id().to_string(),
                supported: supports(&backend, interface.id())?,
            });
        }
        if session.json {
            return print_json(&rows);
        }
        println!("{}", Table::new(rows).with(Style::rounded()));
        Ok(())
    }
}

fn supports(backend: &Backend, interface_id: InterfaceId) -> Result<bool> {
    match backend.query(Query::SupportsInterface { interface_id })? {
        QueryResult::Supported { supported } => Ok(supported),
        other => Err(unexpected(&other)),
    }
}
