//! Append-only operation ledger.
//!
//! ## Layout
//!
//! ```text
//! <ledger_dir>/
//!   LOCK            held exclusively by the process that has the ledger open
//!   snapshot.json   registry state as of entry N (optional)
//!   ledger.jsonl    one LedgerEntry per committed operation after N
//! ```
//!
//! ## Digest chain
//!
//! Each entry's `digest` is `sha256(prev_digest ‖ body)` where `body` is the
//! JSON encoding of `(seq, at, caller, command, events)` and `prev_digest` is
//! the previous entry's digest (the snapshot's digest after compaction, or
//! [`GENESIS_DIGEST`] for the first entry ever). Editing, dropping or
//! reordering any line breaks every digest after it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use orgreg_core::{Address, Command, Policy, Receipt, Registry, RegistryError, RegistryEvent};

use crate::error::{io_err, LedgerError};
use crate::snapshot::{self, Snapshot};

pub const LEDGER_FILE: &str = "ledger.jsonl";
pub const LOCK_FILE: &str = "LOCK";

/// Digest that precedes the first entry of a fresh ledger.
pub const GENESIS_DIGEST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub caller: Address,
    pub command: Command,
    pub events: Vec<RegistryEvent>,
    pub digest: String,
}

#[derive(Serialize)]
struct EntryBody<'a> {
    seq: u64,
    at: &'a DateTime<Utc>,
    caller: &'a Address,
    command: &'a Command,
    events: &'a [RegistryEvent],
}

impl LedgerEntry {
    fn body(&self) -> EntryBody<'_> {
        EntryBody {
            seq: self.seq,
            at: &self.at,
            caller: &self.caller,
            command: &self.command,
            events: &self.events,
        }
    }
}

fn chain_digest(prev: &str, body: &EntryBody<'_>) -> Result<String, serde_json::Error> {
    let mut h = Sha256::new();
    h.update(prev.as_bytes());
    h.update(serde_json::to_vec(body)?);
    Ok(hex::encode(h.finalize()))
}

/// Result of [`Ledger::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compaction {
    /// Sequence number captured by the new snapshot.
    pub seq: u64,
    /// Ledger entries folded into the snapshot.
    pub folded: u64,
}

/// Handle on an open ledger directory.
#[derive(Debug)]
pub struct Ledger {
    dir: PathBuf,
    file: File,
    /// Exclusive lock on `LOCK`, released when the ledger is dropped.
    _lock: File,
    /// Bytes of well-formed entries in `ledger.jsonl`.
    len: u64,
    head_seq: u64,
    head_digest: String,
    /// Entries appended since the last snapshot.
    pending: u64,
    snapshot_every: u64,
}

impl Ledger {
    /// Open (creating if needed) the ledger in `dir` and rebuild the registry
    /// it describes.
    ///
    /// Takes an exclusive lock on the directory first; a second open while
    /// the first handle is alive fails with [`LedgerError::Busy`]. Then loads
    /// the snapshot and replays every later entry through
    /// [`Registry::execute`], checking the digest chain and that each replay
    /// reproduces the recorded events. A partially written trailing line is
    /// dropped with a warning; any other damage is [`LedgerError::Corrupt`].
    pub fn open_at(dir: &Path, policy: Policy) -> Result<(Ledger, Registry), LedgerError> {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        let lock = lock_dir(dir)?;

        let (mut registry, snapshot_seq, mut head_digest) = match snapshot::load(dir)? {
            Some(snap) => {
                let Snapshot { seq, digest, state, .. } = snap;
                (Registry::restore(state, seq, policy), seq, digest)
            }
            None => (Registry::new(policy), 0, GENESIS_DIGEST.to_string()),
        };
        let mut head_seq = snapshot_seq;

        let path = dir.join(LEDGER_FILE);
        let contents = read_log(&path)?;
        let (lines, torn) = complete_lines(&contents);

        let mut len = 0u64;
        let mut pending = 0u64;
        for (idx, raw) in lines.iter().enumerate() {
            let line_no = idx + 1;
            let corrupt = |reason: String| LedgerError::Corrupt {
                path: path.clone(),
                line: line_no,
                reason,
            };

            len += raw.len() as u64;
            if is_blank(raw) {
                continue;
            }
            let entry: LedgerEntry = serde_json::from_slice(raw)
                .map_err(|e| corrupt(format!("unparseable entry: {e}")))?;

            if entry.seq <= snapshot_seq {
                // Already folded into the snapshot by an interrupted compaction.
                continue;
            }
            if entry.seq <= head_seq {
                return Err(corrupt(format!("duplicate seq {}", entry.seq)));
            }
            if entry.seq != head_seq + 1 {
                return Err(corrupt(format!(
                    "expected seq {}, found {}",
                    head_seq + 1,
                    entry.seq
                )));
            }
            let expected = chain_digest(&head_digest, &entry.body())?;
            if expected != entry.digest {
                return Err(corrupt(format!("digest mismatch at seq {}", entry.seq)));
            }
            let receipt = registry
                .execute(entry.caller, &entry.command)
                .map_err(|e| corrupt(format!("replay of seq {} failed: {e}", entry.seq)))?;
            if receipt.events != entry.events {
                return Err(corrupt(format!(
                    "replay of seq {} produced different events",
                    entry.seq
                )));
            }

            head_seq = entry.seq;
            head_digest = entry.digest;
            pending += 1;
        }
        if torn {
            tracing::warn!(
                "ignoring partially written line {} in {}",
                lines.len() + 1,
                path.display()
            );
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        if torn {
            file.set_len(len).map_err(|e| io_err(&path, e))?;
        }

        tracing::info!(
            "opened ledger {} at seq {} ({} entries since snapshot)",
            dir.display(),
            head_seq,
            pending
        );

        let ledger = Ledger {
            dir: dir.to_path_buf(),
            file,
            _lock: lock,
            len,
            head_seq,
            head_digest,
            pending,
            snapshot_every: 0,
        };
        Ok((ledger, registry))
    }

    /// Compact automatically after this many appended entries; `0` disables.
    pub fn with_snapshot_every(mut self, every: u64) -> Self {
        self.snapshot_every = every;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    /// Sequence number of the last durable entry.
    pub fn head_seq(&self) -> u64 {
        self.head_seq
    }

    pub fn head_digest(&self) -> &str {
        &self.head_digest
    }

    /// Durably record a receipt produced by `command`.
    ///
    /// Intended as the commit hook of [`Registry::execute_with`]: the entry
    /// is flushed and synced before the registry makes the transition
    /// visible. On failure the file is cut back to its previous length.
    pub fn append(
        &mut self,
        caller: Address,
        command: &Command,
        receipt: &Receipt,
    ) -> Result<LedgerEntry, LedgerError> {
        if receipt.seq != self.head_seq + 1 {
            return Err(LedgerError::OutOfSync {
                ledger: self.head_seq,
                registry: receipt.seq.saturating_sub(1),
            });
        }

        let at = Utc::now();
        let body = EntryBody {
            seq: receipt.seq,
            at: &at,
            caller: &caller,
            command,
            events: &receipt.events,
        };
        let digest = chain_digest(&self.head_digest, &body)?;
        let entry = LedgerEntry {
            seq: receipt.seq,
            at,
            caller,
            command: command.clone(),
            events: receipt.events.clone(),
            digest,
        };

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        let path = self.path();
        let written = self
            .file
            .write_all(&line)
            .and_then(|()| self.file.sync_data());
        if let Err(e) = written {
            if let Err(cut) = self.file.set_len(self.len) {
                tracing::warn!(
                    "could not cut {} back to {} bytes after failed append: {cut}",
                    path.display(),
                    self.len
                );
            }
            return Err(io_err(&path, e));
        }

        self.len += line.len() as u64;
        self.head_seq = entry.seq;
        self.head_digest = entry.digest.clone();
        self.pending += 1;
        Ok(entry)
    }

    /// Execute `command` on `registry` with this ledger as the commit hook,
    /// compacting afterwards when the snapshot interval is reached.
    pub fn apply(
        &mut self,
        registry: &mut Registry,
        caller: Address,
        command: &Command,
    ) -> Result<Receipt, RegistryError> {
        let receipt = registry.execute_with(caller, command, |receipt| {
            self.append(caller, command, receipt)
                .map(|_| ())
                .map_err(|e| RegistryError::Commit(e.to_string()))
        })?;

        if self.snapshot_every > 0 && self.pending >= self.snapshot_every {
            if let Err(e) = self.compact(registry) {
                tracing::warn!("automatic compaction failed: {e}");
            }
        }
        Ok(receipt)
    }

    /// Entries with `seq >= from` still held in the log.
    pub fn entries_from(&self, from: u64) -> Result<Vec<LedgerEntry>, LedgerError> {
        read_entries_at(&self.dir, from)
    }

    /// Write a snapshot of `registry` at the ledger head and empty the log.
    ///
    /// The snapshot is renamed into place before the log is replaced, so a
    /// crash in between leaves entries that replay skips as already folded.
    pub fn compact(&mut self, registry: &Registry) -> Result<Compaction, LedgerError> {
        if registry.seq() != self.head_seq {
            return Err(LedgerError::OutOfSync {
                ledger: self.head_seq,
                registry: registry.seq(),
            });
        }

        snapshot::save(
            &self.dir,
            &Snapshot {
                seq: self.head_seq,
                digest: self.head_digest.clone(),
                taken_at: Utc::now(),
                state: registry.state().clone(),
            },
        )?;

        let path = self.path();
        let tmp = path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, b"").map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        self.file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;

        let folded = self.pending;
        self.len = 0;
        self.pending = 0;
        tracing::info!("compacted {} entries into snapshot at seq {}", folded, self.head_seq);
        Ok(Compaction {
            seq: self.head_seq,
            folded,
        })
    }
}

/// Read entries with `seq >= from` from the log in `dir` without opening
/// the ledger for writing.
///
/// Entries folded into a snapshot are no longer available. A partially
/// written trailing line is skipped.
pub fn read_entries_at(dir: &Path, from: u64) -> Result<Vec<LedgerEntry>, LedgerError> {
    let path = dir.join(LEDGER_FILE);
    let contents = read_log(&path)?;
    let (lines, _) = complete_lines(&contents);
    let mut out = Vec::new();
    for (idx, raw) in lines.iter().enumerate() {
        if is_blank(raw) {
            continue;
        }
        let entry: LedgerEntry = serde_json::from_slice(raw).map_err(|e| LedgerError::Corrupt {
            path: path.clone(),
            line: idx + 1,
            reason: format!("unparseable entry: {e}"),
        })?;
        if entry.seq >= from {
            out.push(entry);
        }
    }
    Ok(out)
}

fn lock_dir(dir: &Path) -> Result<File, LedgerError> {
    let path = dir.join(LOCK_FILE);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
            Err(LedgerError::Busy {
                path: dir.to_path_buf(),
            })
        }
        Err(e) => Err(io_err(&path, e)),
    }
}

/// Raw log bytes; a missing file reads as empty.
fn read_log(path: &Path) -> Result<Vec<u8>, LedgerError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Newline-terminated lines of `bytes`, newline included, and whether an
/// unterminated fragment followed them. The fragment is not decoded: a crash
/// can cut it inside a multi-byte character.
fn complete_lines(bytes: &[u8]) -> (Vec<&[u8]>, bool) {
    let mut lines: Vec<&[u8]> = bytes.split_inclusive(|b| *b == b'\n').collect();
    let torn = matches!(lines.last(), Some(last) if !last.ends_with(b"\n"));
    if torn {
        lines.pop();
    }
    (lines, torn)
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgreg_core::OrgId;
    use tempfile::TempDir;

    const A: Address = Address([0xaa; 20]);

    fn create(label: &str) -> Command {
        Command::CreateOrganization {
            org_id: OrgId::from_label(label).unwrap(),
            name: label.to_string(),
            members: vec![],
        }
    }

    #[test]
    fn fresh_ledger_starts_at_genesis() {
        let tmp = TempDir::new().unwrap();
        let (ledger, registry) = Ledger::open_at(tmp.path(), Policy::default()).unwrap();
        assert_eq!(ledger.head_seq(), 0);
        assert_eq!(ledger.head_digest(), GENESIS_DIGEST);
        assert_eq!(registry.seq(), 0);
        assert!(ledger.path().exists());
        assert!(tmp.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn second_open_of_held_directory_is_busy() {
        let tmp = TempDir::new().unwrap();
        let (mut ledger, mut registry) = Ledger::open_at(tmp.path(), Policy::default()).unwrap();

        let err = Ledger::open_at(tmp.path(), Policy::default()).unwrap_err();
        assert!(matches!(err, LedgerError::Busy { .. }), "got: {err}");

        ledger.apply(&mut registry, A, &create("a")).unwrap();
        drop(ledger);
        let (reopened, _) = Ledger::open_at(tmp.path(), Policy::default()).unwrap();
        assert_eq!(reopened.head_seq(), 1);
    }

    #[test]
    fn line_splitting_keeps_torn_tail_undecoded() {
        let cafe = "Café".as_bytes();
        let mut bytes = b"{}\n\n".to_vec();
        bytes.extend_from_slice(&cafe[..cafe.len() - 1]);

        let (lines, torn) = complete_lines(&bytes);
        assert!(torn);
        assert_eq!(lines, vec![&b"{}\n"[..], &b"\n"[..]]);
        assert!(is_blank(lines[1]));

        let (lines, torn) = complete_lines(b"{}\n");
        assert!(!torn);
        assert_eq!(lines.len(), 1);
        assert_eq!(complete_lines(b""), (vec![], false));
    }

    #[test]
    fn digests_chain_from_previous_entry() {
        let tmp = TempDir::new().unwrap();
        let (mut ledger, mut registry) = Ledger::open_at(tmp.path(), Policy::default()).unwrap();
        ledger.apply(&mut registry, A, &create("a")).unwrap();
        ledger.apply(&mut registry, A, &create("b")).unwrap();

        let entries = ledger.entries_from(0).unwrap();
        assert_eq!(entries.len(), 2);
        let first = chain_digest(GENESIS_DIGEST, &entries[0].body()).unwrap();
        assert_eq!(entries[0].digest, first);
        let second = chain_digest(&first, &entries[1].body()).unwrap();
        assert_eq!(entries[1].digest, second);
        assert_eq!(ledger.head_digest(), second);
    }

    #[test]
    fn append_rejects_out_of_order_receipt() {
        let tmp = TempDir::new().unwrap();
        let (mut ledger, _) = Ledger::open_at(tmp.path(), Policy::default()).unwrap();
        let receipt = Receipt {
            seq: 5,
            events: vec![],
        };
        let err = ledger.append(A, &create("a"), &receipt).unwrap_err();
        assert!(matches!(err, LedgerError::OutOfSync { ledger: 0, .. }), "got: {err}");
        assert_eq!(std::fs::read(ledger.path()).unwrap(), b"");
    }

    #[test]
    fn rejected_command_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let (mut ledger, mut registry) = Ledger::open_at(tmp.path(), Policy::default()).unwrap();
        ledger.apply(&mut registry, A, &create("a")).unwrap();
        assert!(ledger.apply(&mut registry, A, &create("a")).is_err());
        assert_eq!(ledger.entries_from(0).unwrap().len(), 1);
        assert_eq!(ledger.head_seq(), 1);
    }

    #[test]
    fn automatic_compaction_after_interval() {
        let tmp = TempDir::new().unwrap();
        let (ledger, mut registry) = Ledger::open_at(tmp.path(), Policy::default()).unwrap();
        let mut ledger = ledger.with_snapshot_every(2);

        ledger.apply(&mut registry, A, &create("a")).unwrap();
        assert!(!snapshot::snapshot_path(tmp.path()).exists());
        ledger.apply(&mut registry, A, &create("b")).unwrap();
        assert!(snapshot::snapshot_path(tmp.path()).exists());
        assert!(ledger.entries_from(0).unwrap().is_empty());
        assert_eq!(ledger.head_seq(), 2);
    }
}
