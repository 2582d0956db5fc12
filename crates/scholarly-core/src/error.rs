//! Error types for Scholarly.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Field-level validation failures, keyed by field name.
///
/// A `BTreeMap` keeps the rendering order stable so that repeated identical
/// failures produce identical messages (and therefore identical notifications).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure for `field`. The first message recorded for a field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Converts the collected failures into a `Result`.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ScholarlyError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

/// Coarse classification of an error, used for logging, retry decisions and
/// stable notification ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    NotAuthenticated,
    StoreUnavailable,
    Validation,
    Network,
    Timeout,
    NotFound,
    NotLoaded,
    SessionClosed,
    Storage,
    Config,
    Unknown,
}

/// A shared error type for the entire Scholarly workspace.
#[derive(Error, Debug, Clone, Serialize)]
pub enum ScholarlyError {
    /// No signed-in identity is available.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The backing document store handle is missing or misconfigured.
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),

    /// Field-level validation failure. Never retried.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Transport-level failure reported by a collaborator. Retryable.
    #[error("Network error: {message}")]
    Network {
        message: String,
        code: Option<String>,
    },

    /// Advisory only: an operation took longer than the configured threshold.
    #[error("Operation '{operation}' is taking longer than expected ({elapsed_ms} ms)")]
    TimeoutWarning { operation: String, elapsed_ms: u64 },

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound { entity_type: String, id: String },

    /// An update was requested before any profile was loaded.
    #[error("Profile has not been loaded")]
    ProfileNotLoaded,

    /// The owning view was torn down; results are discarded.
    #[error("Profile session has been closed")]
    SessionClosed,

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for anything that could not be classified.
    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl ScholarlyError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            code: None,
        }
    }

    pub fn network_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown(message.into())
    }

    /// Classifies an opaque collaborator failure by its message and optional code.
    ///
    /// Codes follow the document-store vocabulary (`unavailable`,
    /// `deadline-exceeded`, ...). Anything that does not look transport-related
    /// becomes `Unknown`.
    pub fn classify(message: impl Into<String>, code: Option<&str>) -> Self {
        const NETWORK_CODES: &[&str] = &[
            "unavailable",
            "deadline-exceeded",
            "resource-exhausted",
            "aborted",
            "network-request-failed",
        ];
        const NETWORK_HINTS: &[&str] = &[
            "network",
            "offline",
            "timed out",
            "timeout",
            "connection",
            "unreachable",
            "failed to fetch",
        ];

        let message = message.into();
        if code.is_some_and(|c| NETWORK_CODES.contains(&c)) {
            return Self::Network {
                message,
                code: code.map(str::to_string),
            };
        }
        if code == Some("unauthenticated") {
            return Self::NotAuthenticated;
        }

        let lower = message.to_lowercase();
        if NETWORK_HINTS.iter().any(|hint| lower.contains(hint)) {
            Self::Network {
                message,
                code: code.map(str::to_string),
            }
        } else {
            Self::Unknown(message)
        }
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthenticated => ErrorKind::NotAuthenticated,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Network { .. } => ErrorKind::Network,
            Self::TimeoutWarning { .. } => ErrorKind::Timeout,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ProfileNotLoaded => ErrorKind::NotLoaded,
            Self::SessionClosed => ErrorKind::SessionClosed,
            Self::Serialization { .. } | Self::Io { .. } => ErrorKind::Storage,
            Self::Config(_) => ErrorKind::Config,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Whether bounded retry with backoff may recover from this error.
    ///
    /// Only transport failures and I/O hiccups qualify; validation, auth and
    /// shape errors would fail identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Io { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ScholarlyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ScholarlyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ScholarlyError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// A type alias for `Result<T, ScholarlyError>`.
pub type Result<T> = std::result::Result<T, ScholarlyError>;
