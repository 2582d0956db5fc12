//! Domain layer for Scholarly.
//!
//! Holds the researcher profile model, the article/review records shown on a
//! profile, the error taxonomy, and the traits through which the application
//! layer reaches its external collaborators (document store, auth provider,
//! notification surface).

pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod notification;
pub mod profile;
pub mod store;
pub mod ui_state;

// Re-export common error type
pub use error::{Result, ScholarlyError};
