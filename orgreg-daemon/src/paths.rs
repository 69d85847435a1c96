use std::path::{Path, PathBuf};

use orgreg_core::config;

pub const DAEMON_SOCKET: &str = "orgreg.sock";
pub const DAEMON_PID: &str = "orgreg.pid";

pub fn orgreg_root(home: &Path) -> PathBuf {
    config::root_at(home)
}

pub fn run_dir(home: &Path) -> PathBuf {
    orgreg_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    orgreg_root(home).join(DAEMON_SOCKET)
}

pub fn pid_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_PID)
}
