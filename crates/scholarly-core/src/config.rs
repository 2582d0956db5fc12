//! Configuration models.
//!
//! These are plain serde structs; loading them from disk is the job of
//! `scholarly_infrastructure::config_service`.

use crate::error::{Result, ScholarlyError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration document (`config.toml`).
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub profile: ProfileSettings,
    pub content: ContentSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.profile.validate()?;
        self.content.validate()
    }
}

/// Timing knobs for the profile session controller.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ProfileSettings {
    /// Total automatic attempts for a load or write before giving up.
    pub max_retries: u32,
    /// Delay before the second attempt; doubles for every further attempt.
    pub retry_base_delay_ms: u64,
    /// Window during which successive edits collapse into one write.
    pub debounce_window_ms: u64,
    /// Minimum spacing between two edit-mode toggles.
    pub edit_toggle_cooldown_ms: u64,
    /// Operations running longer than this log an advisory warning.
    pub slow_operation_warning_ms: u64,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 1000,
            debounce_window_ms: 500,
            edit_toggle_cooldown_ms: 1000,
            slow_operation_warning_ms: 5000,
        }
    }
}

impl ProfileSettings {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn edit_toggle_cooldown(&self) -> Duration {
        Duration::from_millis(self.edit_toggle_cooldown_ms)
    }

    pub fn slow_operation_warning(&self) -> Duration {
        Duration::from_millis(self.slow_operation_warning_ms)
    }

    /// Backoff before attempt `attempt + 1`, where `attempt` is zero-based:
    /// `2^attempt * base`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(ScholarlyError::config("profile.max_retries must be at least 1"));
        }
        if self.debounce_window_ms == 0 {
            return Err(ScholarlyError::config(
                "profile.debounce_window_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ContentSettings {
    /// Articles/reviews fetched per page.
    pub page_size: usize,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self { page_size: 10 }
    }
}

impl ContentSettings {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ScholarlyError::config("content.page_size must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Which document store backend the bootstrap should construct.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreSettings {
    #[default]
    Memory,
    Directory {
        path: PathBuf,
    },
}
