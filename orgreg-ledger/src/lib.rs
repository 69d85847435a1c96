//! # orgreg-ledger
//!
//! Durable history for the registry: an append-only JSONL operation log
//! chained by SHA-256 digests, plus atomic snapshots for compaction.
//!
//! Open with [`Ledger::open_at`], which hands back the rebuilt
//! [`orgreg_core::Registry`], then route every mutation through
//! [`Ledger::apply`] so a failed append rolls the transition back.

pub mod error;
pub mod ledger;
pub mod snapshot;

pub use error::LedgerError;
pub use ledger::{
    read_entries_at, Compaction, Ledger, LedgerEntry, GENESIS_DIGEST, LEDGER_FILE,
    LOCK_FILE,
};
pub use snapshot::{Snapshot, SNAPSHOT_FILE};
