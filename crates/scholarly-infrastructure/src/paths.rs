//! Path resolution for Scholarly configuration and data.
//!
//! ```text
//! ~/.config/scholarly/          # Config directory (platform config dir)
//! └── config.toml               # Application configuration
//!
//! ~/.local/share/scholarly/     # Data directory
//! └── documents/                # DirDocumentStore root
//! ```

use scholarly_core::error::{Result, ScholarlyError};
use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "scholarly";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const CONFIG_ENV_VAR: &str = "SCHOLARLY_CONFIG";

/// Resolves application paths, optionally under an explicit base directory
/// (used by tests to stay inside a temp dir).
#[derive(Debug, Clone, Default)]
pub struct ScholarlyPaths {
    base_dir: Option<PathBuf>,
}

impl ScholarlyPaths {
    pub fn new(base_dir: Option<&Path>) -> Self {
        Self {
            base_dir: base_dir.map(Path::to_path_buf),
        }
    }

    pub fn config_dir(&self) -> Result<PathBuf> {
        match &self.base_dir {
            Some(base) => Ok(base.join("config")),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .ok_or_else(|| ScholarlyError::config("Cannot determine config directory")),
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.base_dir {
            Some(base) => Ok(base.join("data")),
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .ok_or_else(|| ScholarlyError::config("Cannot determine data directory")),
        }
    }

    pub fn config_file(&self) -> Result<PathBuf> {
        Ok(self.config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Default root for the directory-backed document store.
    pub fn documents_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("documents"))
    }
}
