//! Application paths management.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Manages all application paths following platform conventions.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
    pub database_file: PathBuf,
    pub reports_dir: PathBuf,
}

impl AppPaths {
    /// Create paths using platform-specific directories.
    pub fn new() -> Option<Self> {
        let proj_dirs = ProjectDirs::from("com", "ragline", "ragline")?;

        let config_dir = proj_dirs.config_dir().to_path_buf();
        let data_dir = proj_dirs.data_dir().to_path_buf();

        Some(Self::from_dirs(config_dir, data_dir))
    }

    /// Build paths from explicit config and data directories.
    pub fn from_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join("config.toml"),
            database_file: data_dir.join("ragline.db"),
            reports_dir: data_dir.join("reports"),
            config_dir,
            data_dir,
        }
    }

    /// Relocate data files under `data_dir` (a leading `~` is expanded).
    pub fn with_data_dir(self, data_dir: &str) -> Self {
        let expanded = PathBuf::from(shellexpand::tilde(data_dir).into_owned());
        Self::from_dirs(self.config_dir, expanded)
    }

    /// Create all necessary directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.reports_dir)?;
        Ok(())
    }

    /// Check if ragline has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.config_file.exists() && self.database_file.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dirs_layout() {
        let paths = AppPaths::from_dirs(PathBuf::from("/cfg"), PathBuf::from("/data"));
        assert_eq!(paths.config_file, PathBuf::from("/cfg/config.toml"));
        assert_eq!(paths.database_file, PathBuf::from("/data/ragline.db"));
        assert_eq!(paths.reports_dir, PathBuf::from("/data/reports"));
    }

    #[test]
    fn test_with_data_dir_keeps_config_location() {
        let paths = AppPaths::from_dirs(PathBuf::from("/cfg"), PathBuf::from("/data"))
            .with_data_dir("/elsewhere");
        assert_eq!(paths.config_file, PathBuf::from("/cfg/config.toml"));
        assert_eq!(paths.database_file, PathBuf::from("/elsewhere/ragline.db"));
    }

    #[test]
    fn test_ensure_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::from_dirs(tmp.path().join("cfg"), tmp.path().join("data"));
        paths.ensure_dirs().unwrap();
        assert!(paths.config_dir.is_dir());
        assert!(paths.reports_dir.is_dir());
        assert!(!paths.is_initialized());
    }
}
