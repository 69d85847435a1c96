//! orgreg core library: registry state machine, domain types, configuration.
//!
//! - [`types`]: ids, addresses and the three record kinds
//! - [`service`]: [`Registry`], the only way to mutate state
//! - [`command`]: serializable operation values shared by every transport
//! - [`config`]: `~/.orgreg/config.yaml`

pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod interface;
pub mod service;
pub mod state;
pub mod store;
pub mod tag_index;
mod transaction;
pub mod types;

pub use command::{Command, Query, QueryResult};
pub use config::{Policy, PublishPolicy, RegistryConfig};
pub use error::{ConfigError, RegistryError};
pub use events::{Receipt, RegistryEvent};
pub use interface::{Interface, InterfaceId};
pub use service::Registry;
pub use state::{Records, RegistryState};
pub use tag_index::Namespace;
pub use types::{
    Address, Blob, EntityKind, Id, OrgId, Organization, RepositoryId, ServiceId,
    ServiceRegistration, Tag, TagMatches, TypeRepositoryRegistration,
};
