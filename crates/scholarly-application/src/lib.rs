//! Application layer for Scholarly.
//!
//! Drives one researcher's profile session on top of the domain types in
//! `scholarly-core`: loading with bounded retry, debounced and serialized
//! writes, error notifications, view state, and the article/review listings
//! shown on the profile.

pub mod auth_listener;
pub mod bootstrap;
pub mod content_service;
pub mod context;
pub mod error_handler;
pub mod profile_data_store;
pub mod profile_operations;
pub mod profile_session;
pub mod ui_store;

pub use content_service::{ContentCounters, ContentService};
pub use context::{SessionContext, SessionContextBuilder};
pub use error_handler::{ErrorDisposition, ProfileErrorHandler};
pub use profile_data_store::{Outcome, ProfileDataStore};
pub use profile_operations::{CoordinatorPhase, PendingUpdate, ProfileOperations};
pub use profile_session::ProfileSession;
pub use ui_store::ProfileUiStore;
