use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::MonitorError;

use super::Config;

const SYNCTHING_CONFIG_FILE: &str = "config.xml";

impl Config {
    /// Directories that may hold Syncthing's config.xml, in probing order.
    pub fn syncthing_config_dirs(&self) -> Vec<PathBuf> {
        if let Some(dir) = &self.syncthing_config_dir {
            return vec![PathBuf::from(dir.trim_end_matches('/'))];
        }

        let mut candidates = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("syncthing"));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join("snap/syncthing/common/syncthing"));
            candidates.push(home.join(".var/app/me.kozec.syncthingtk/config/syncthing"));
        }
        candidates
    }
}

/// Returns the first existing config.xml among the candidate directories.
pub fn probe_syncthing_config(candidates: &[PathBuf]) -> Option<PathBuf> {
    for dir in candidates {
        let candidate = dir.join(SYNCTHING_CONFIG_FILE);
        if candidate.is_file() {
            info!(path = %candidate.display(), "Found Syncthing config file");
            return Some(candidate);
        }
    }
    warn!(candidates = ?candidates, "Syncthing config file not found");
    None
}

/// Get the path to the config.json file
/// Looks for config.json in the app directory (parent of the executable's folder)
pub(super) fn get_config_path() -> Result<PathBuf, MonitorError> {
    if let Ok(custom) = env::var("SYNCTHING_MONITOR_CONFIG") {
        if !custom.trim().is_empty() {
            return Ok(PathBuf::from(custom.trim()));
        }
    }

    // Executable is at: app_root/bin/syncthing-status-monitor
    // Config should be at: app_root/config.json
    if let Ok(exe_path) = env::current_exe() {
        debug!(path = %exe_path.display(), "Executable path detected");

        if let Some(app_root) = exe_path.parent().and_then(Path::parent) {
            let config_path = app_root.join("config.json");
            debug!(path = %config_path.display(), "Looking for config");
            return Ok(config_path);
        }
    }

    warn!("Using fallback: looking for config.json in current directory");
    Ok(PathBuf::from("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_existing_candidate_wins() {
        let first = tempfile::tempdir().expect("tempdir");
        let second = tempfile::tempdir().expect("tempdir");
        let third = tempfile::tempdir().expect("tempdir");
        std::fs::write(second.path().join("config.xml"), "<configuration/>").expect("write");
        std::fs::write(third.path().join("config.xml"), "<configuration/>").expect("write");

        let dirs = vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
            third.path().to_path_buf(),
        ];
        assert_eq!(
            probe_syncthing_config(&dirs),
            Some(second.path().join("config.xml"))
        );
    }

    #[test]
    fn nothing_found_returns_none() {
        let empty = tempfile::tempdir().expect("tempdir");
        assert_eq!(probe_syncthing_config(&[empty.path().to_path_buf()]), None);
    }

    #[test]
    fn explicit_directory_skips_probing() {
        let config = Config {
            syncthing_config_dir: Some("/srv/syncthing/".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.syncthing_config_dirs(),
            vec![PathBuf::from("/srv/syncthing")]
        );
    }
}
