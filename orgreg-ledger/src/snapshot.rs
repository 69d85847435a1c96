//! Point-in-time registry snapshot.
//!
//! Persists a [`Snapshot`] JSON document at `<ledger_dir>/snapshot.json`.
//! Writes go to a `.tmp` sibling, are restricted to `0600`, then renamed over
//! the previous snapshot.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgreg_core::RegistryState;

use crate::error::{io_err, LedgerError};

pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Registry state as of ledger entry `seq`, whose digest is `digest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub seq: u64,
    pub digest: String,
    pub taken_at: DateTime<Utc>,
    pub state: RegistryState,
}

pub fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

fn tmp_path(dir: &Path) -> PathBuf {
    snapshot_path(dir).with_extension("json.tmp")
}

/// Load the snapshot, or `None` if none has been taken yet.
///
/// An orphaned `.tmp` from an interrupted save is removed; the previous
/// snapshot (if any) is still authoritative.
pub fn load(dir: &Path) -> Result<Option<Snapshot>, LedgerError> {
    let tmp = tmp_path(dir);
    if tmp.exists() {
        tracing::warn!("removing orphaned snapshot temp file {}", tmp.display());
        std::fs::remove_file(&tmp).map_err(|e| io_err(&tmp, e))?;
    }

    let path = snapshot_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let snapshot =
        serde_json::from_str(&contents).map_err(|e| LedgerError::Snapshot { path, source: e })?;
    Ok(Some(snapshot))
}

pub fn save(dir: &Path, snapshot: &Snapshot) -> Result<(), LedgerError> {
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let path = snapshot_path(dir);
    let tmp = tmp_path(dir);

    let json = serde_json::to_vec_pretty(snapshot)?;
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    tracing::debug!("snapshot at seq {} written to {}", snapshot.seq, path.display());
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), LedgerError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), LedgerError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn empty(seq: u64) -> Snapshot {
        Snapshot {
            seq,
            digest: "ab".repeat(32),
            taken_at: Utc::now(),
            state: RegistryState::new(),
        }
    }

    #[test]
    fn missing_snapshot_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let snap = empty(7);
        save(tmp.path(), &snap).unwrap();
        assert_eq!(load(tmp.path()).unwrap(), Some(snap));
        assert!(!tmp_path(tmp.path()).exists());
    }

    #[test]
    fn orphaned_tmp_is_discarded() {
        let tmp = TempDir::new().unwrap();
        save(tmp.path(), &empty(3)).unwrap();
        std::fs::write(tmp_path(tmp.path()), b"{ half written").unwrap();

        let loaded = load(tmp.path()).unwrap().expect("snapshot");
        assert_eq!(loaded.seq, 3);
        assert!(!tmp_path(tmp.path()).exists());
    }

    #[test]
    fn garbage_snapshot_reports_path() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(snapshot_path(tmp.path()), b"not json").unwrap();
        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(err, LedgerError::Snapshot { .. }), "got: {err}");
        assert!(err.to_string().contains("snapshot.json"));
    }
}
