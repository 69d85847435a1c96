//! Registry configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.orgreg/
//!   config.yaml     (optional; every field has a default)
//!   ledger/         (default ledger directory)
//! ```
//!
//! Like the rest of the workspace, every function that touches the
//! filesystem has an `_at(home, …)` form taking an explicit home directory and
//! a no-arg wrapper that derives it from `dirs::home_dir()`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::Address;

pub const ROOT_DIR: &str = ".orgreg";
pub const CONFIG_FILE: &str = "config.yaml";
pub const LEDGER_DIR: &str = "ledger";

/// Who may mutate services and type repositories of an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    #[default]
    Owner,
    OwnerOrMember,
}

/// Rules the state machine enforces on every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub publishers: PublishPolicy,
    /// Maximum organization name length in bytes.
    pub max_name_len: usize,
    /// Maximum number of addresses or tags in a single call.
    pub max_batch: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            publishers: PublishPolicy::Owner,
            max_name_len: 256,
            max_batch: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_dir: Option<PathBuf>,
    pub log_filter: String,
    /// Ledger entries between automatic snapshots; `0` disables compaction.
    pub snapshot_every: u64,
    /// Default caller address for the CLI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<Address>,
    pub policy: Policy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ledger_dir: None,
            log_filter: "info".to_string(),
            snapshot_every: 500,
            caller: None,
            policy: Policy::default(),
        }
    }
}

impl RegistryConfig {
    /// Configured ledger directory, or `<home>/.orgreg/ledger`.
    pub fn ledger_dir_at(&self, home: &Path) -> PathBuf {
        self.ledger_dir
            .clone()
            .unwrap_or_else(|| root_at(home).join(LEDGER_DIR))
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.orgreg/`
pub fn root_at(home: &Path) -> PathBuf {
    home.join(ROOT_DIR)
}

/// `<home>/.orgreg/config.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    root_at(home).join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load `config.yaml`, falling back to defaults when the file is absent.
pub fn load_at(home: &Path) -> Result<RegistryConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(RegistryConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<RegistryConfig, ConfigError> {
    load_at(&home()?)
}

/// Atomically write `config.yaml` (`.tmp` sibling → `chmod 0600` → `rename`).
pub fn save_at(home: &Path, config: &RegistryConfig) -> Result<PathBuf, ConfigError> {
    let root = root_at(home);
    std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    let path = config_path_at(home);
    let tmp = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_yields_defaults() {
        let home = TempDir::new().expect("tempdir");
        let config = load_at(home.path()).expect("load");
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(
            config.ledger_dir_at(home.path()),
            home.path().join(".orgreg").join("ledger")
        );
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let home = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(root_at(home.path())).unwrap();
        std::fs::write(
            config_path_at(home.path()),
            "policy:\n  publishers: owner_or_member\n",
        )
        .unwrap();

        let config = load_at(home.path()).expect("load");
        assert_eq!(config.policy.publishers, PublishPolicy::OwnerOrMember);
        assert_eq!(config.policy.max_batch, 1024);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn save_then_load_roundtrip() {
        let home = TempDir::new().expect("tempdir");
        let config = RegistryConfig {
            caller: Some(Address([0x11; 20])),
            snapshot_every: 10,
            ..RegistryConfig::default()
        };
        let path = save_at(home.path(), &config).expect("save");
        assert!(!path.with_extension("yaml.tmp").exists());
        assert_eq!(load_at(home.path()).expect("load"), config);
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let home = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(root_at(home.path())).unwrap();
        std::fs::write(config_path_at(home.path()), "snapshot_every: [not a number").unwrap();
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains("config.yaml"));
    }
}
