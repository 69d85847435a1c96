//! Error types for orgreg-ledger.

use std::path::PathBuf;

use thiserror::Error;

use orgreg_core::RegistryError;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The snapshot file exists but cannot be decoded.
    #[error("failed to parse snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A ledger line failed to parse, broke the digest chain, or replayed to
    /// different events than it recorded.
    #[error("ledger {path} corrupt at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Another process has the ledger directory open.
    #[error("ledger {path} is busy: another process holds its lock")]
    Busy { path: PathBuf },

    /// The registry handed to the ledger is not at the ledger head.
    #[error("registry at seq {registry} does not match ledger head {ledger}")]
    OutOfSync { ledger: u64, registry: u64 },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Convenience constructor for [`LedgerError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.into(),
        source,
    }
}
