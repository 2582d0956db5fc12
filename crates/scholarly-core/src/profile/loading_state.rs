//! Profile session status.

use serde::{Deserialize, Serialize};

/// Status of the profile session. Exactly one value is active at a time and
/// it decides which view branch renders (spinner, error, completion form,
/// full profile).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadingState {
    #[default]
    Idle,
    Initializing,
    Loading,
    Updating,
    Error,
    Success,
}

impl LoadingState {
    /// Whether a store operation is running in this state.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Initializing | Self::Loading | Self::Updating)
    }

    /// Edit controls stay disabled until the first load has settled.
    pub fn allows_editing(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// Transition table of the session state machine.
    ///
    /// ```text
    /// IDLE -> INITIALIZING -> LOADING -> {SUCCESS | ERROR}
    /// SUCCESS -> UPDATING -> {SUCCESS | ERROR}
    /// SUCCESS -> LOADING            (refresh)
    /// ERROR -> LOADING              (retry)
    /// ERROR -> UPDATING             (profile already loaded)
    /// INITIALIZING -> ERROR         (no identity / no store)
    /// any -> IDLE                   (sign-out, identity change)
    /// ```
    pub fn can_transition_to(self, next: LoadingState) -> bool {
        use LoadingState::{Error, Idle, Initializing, Loading, Success, Updating};

        match (self, next) {
            (_, Idle) => true,
            (Idle, Initializing) => true,
            (Initializing, Loading) | (Initializing, Error) => true,
            (Loading, Success) | (Loading, Error) => true,
            (Success, Updating) | (Success, Loading) => true,
            (Updating, Success) | (Updating, Error) => true,
            (Error, Loading) | (Error, Updating) => true,
            _ => false,
        }
    }
}

/// Checks that a recorded sequence of states only uses valid transitions.
///
/// The trace is expected to start from `Idle`.
pub fn is_valid_trace(trace: &[LoadingState]) -> bool {
    let mut current = LoadingState::Idle;
    for &next in trace {
        if next != current && !current.can_transition_to(next) {
            return false;
        }
        current = next;
    }
    true
}
