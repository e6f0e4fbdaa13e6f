//! Path resolution for local guidewatch files.
//!
//! Resolved once at startup from: CLI `--data-dir` > `GUIDEWATCH_DATA_DIR` env > `~/.guidewatch`.
//! Nothing in here is shared state; callers thread the resolved base around.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const DATA_DIR_ENV: &str = "GUIDEWATCH_DATA_DIR";

/// Resolve the data directory.
///
/// Priority: `explicit` arg > `GUIDEWATCH_DATA_DIR` env > `~/.guidewatch` default.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Ok(env_val) = std::env::var(DATA_DIR_ENV) {
        if !env_val.trim().is_empty() {
            return Ok(PathBuf::from(env_val));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".guidewatch"))
        .ok_or(ConfigError::NoHomeDir)
}

pub fn log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Create all required subdirectories under the data dir.
pub fn ensure_dirs(data_dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    std::fs::create_dir_all(log_dir(data_dir))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_data_dir(Some(dir.path())).unwrap();
        assert_eq!(resolved, dir.path());
    }

    #[test]
    fn ensure_dirs_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested");
        ensure_dirs(&base).unwrap();
        assert!(log_dir(&base).is_dir());
        assert_eq!(config_path(&base), base.join("config.toml"));
    }
}
