//! Configuration service implementation.
//!
//! Loads `AppConfig` from `config.toml`. The file location is, in order of
//! precedence: an explicit path, the `SCHOLARLY_CONFIG` environment variable,
//! then the platform config directory.

use crate::paths::{CONFIG_ENV_VAR, ScholarlyPaths};
use scholarly_core::config::AppConfig;
use scholarly_core::error::{Result, ScholarlyError};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// Configuration service that loads and caches the root configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
    /// Cached configuration loaded from file.
    config: Arc<RwLock<Option<AppConfig>>>,
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigService {
    /// Creates a service that resolves the config path from the environment.
    pub fn new() -> Self {
        Self {
            path: None,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates a service bound to an explicit file (for testing).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the configuration, loading from file if not cached.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file exists but cannot be parsed or fails validation.
    pub fn get_config(&self) -> Result<AppConfig> {
        {
            let cached = self.config.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(config) = cached.as_ref() {
                return Ok(config.clone());
            }
        }

        let loaded = self.load_config()?;

        let mut cached = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(loaded.clone());
        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut cached = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *cached = None;
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }
        ScholarlyPaths::default().config_file()
    }

    fn load_config(&self) -> Result<AppConfig> {
        let path = self.config_path()?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    "[ConfigService] No config at {}, using defaults",
                    path.display()
                );
                return Ok(AppConfig::default());
            }
            Err(e) => {
                return Err(ScholarlyError::config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            ScholarlyError::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;

        tracing::debug!("[ConfigService] Loaded config from {}", path.display());
        Ok(config)
    }
}
