//! Profile domain module.
//!
//! # Module Structure
//!
//! - `model`: the stored `UserProfile` record and completeness rule
//! - `update`: partial updates and how they apply to a record
//! - `validation`: field validation, including the one-time-change guards
//! - `loading_state`: the session status enum and its transition table

mod loading_state;
mod model;
mod update;
pub mod validation;

// Re-export public API
pub use loading_state::{LoadingState, is_valid_trace};
pub use model::{PROFILE_COLLECTION, UserProfile, is_profile_complete, profile_path};
pub use update::ProfileUpdate;
pub use validation::validate_update;
