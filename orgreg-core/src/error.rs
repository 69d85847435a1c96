//! Error types for orgreg-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Address, EntityKind, OrgId};

/// Errors raised by mutating registry operations.
///
/// Read operations never produce these for missing data; they return `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The referenced organization, service or repository does not exist.
    #[error("{kind} {key} not found")]
    NotFound { kind: EntityKind, key: String },

    /// An id collision on create.
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: EntityKind, key: String },

    /// The caller does not hold the capability the operation requires.
    #[error("{caller} is not authorized to modify organization {org}")]
    Unauthorized { caller: Address, org: OrgId },

    /// Empty name, zero address, malformed id, oversized batch.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The durable commit step failed; the transition was rolled back.
    #[error("commit failed: {0}")]
    Commit(String),
}

impl RegistryError {
    pub(crate) fn not_found(kind: EntityKind, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub(crate) fn already_exists(kind: EntityKind, key: impl ToString) -> Self {
        Self::AlreadyExists {
            kind,
            key: key.to_string(),
        }
    }

    /// Stable machine-readable category, used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::NotFound { .. } => "not_found",
            RegistryError::AlreadyExists { .. } => "already_exists",
            RegistryError::Unauthorized { .. } => "unauthorized",
            RegistryError::InvalidArgument(_) => "invalid_argument",
            RegistryError::Commit(_) => "commit",
        }
    }
}

/// Errors from loading or saving `config.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
