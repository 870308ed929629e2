//! Data directory layout for CampusNet.
//!
//! Everything the CLI persists lives under one directory: `config.toml` and
//! `campusnet.db`.

use std::path::{Path, PathBuf};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "CAMPUSNET_DATA_DIR";

/// Resolve the data directory: `CAMPUSNET_DATA_DIR` if set, otherwise
/// `~/.campusnet`.
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
}

fn data_dir_from(override_dir: Option<PathBuf>) -> PathBuf {
    match override_dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".campusnet"),
    }
}

/// Create the data directory if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}

/// Path of the global configuration file.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        let dir = data_dir_from(Some(PathBuf::from("/srv/campus")));
        assert_eq!(dir, PathBuf::from("/srv/campus"));
    }

    #[test]
    fn empty_override_falls_back_to_home() {
        let dir = data_dir_from(Some(PathBuf::new()));
        assert!(dir.ends_with(".campusnet"));
        let dir = data_dir_from(None);
        assert!(dir.ends_with(".campusnet"));
    }

    #[tokio::test]
    async fn ensure_creates_nested_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_data_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert_eq!(config_path(&nested), nested.join("config.toml"));
    }
}
