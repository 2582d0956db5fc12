//! View state of the profile page.
//!
//! A pure reducer, decoupled from the data layer. Actions that need time carry
//! their own timestamp so that reducing stays deterministic.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProfileTab {
    #[default]
    Overview,
    Articles,
    Reviews,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUiState {
    pub active_tab: ProfileTab,
    /// 1-based page within the active tab's listing.
    pub current_page: u32,
    pub is_edit_mode: bool,
    pub local_loading: bool,
    /// When edit mode last flipped; used to absorb duplicated pointer events.
    pub last_edit_toggle: Option<Instant>,
}

impl Default for ProfileUiState {
    fn default() -> Self {
        Self {
            active_tab: ProfileTab::default(),
            current_page: 1,
            is_edit_mode: false,
            local_loading: false,
            last_edit_toggle: None,
        }
    }
}

/// Fields a [`UiAction::BatchUpdate`] may set at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiBatch {
    pub active_tab: Option<ProfileTab>,
    pub current_page: Option<u32>,
    pub is_edit_mode: Option<bool>,
    pub local_loading: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    SetActiveTab(ProfileTab),
    SetCurrentPage(u32),
    ToggleEditMode { at: Instant },
    SetEditMode(bool),
    SetLocalLoading(bool),
    BatchUpdate(UiBatch),
    ResetState,
}

/// Reducer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiRules {
    pub edit_toggle_cooldown: Duration,
}

impl Default for UiRules {
    fn default() -> Self {
        Self {
            edit_toggle_cooldown: Duration::from_secs(1),
        }
    }
}

/// Applies `action` to `state`.
///
/// Invariants enforced here rather than by callers:
/// - any change of tab resets pagination to page 1, including inside a batch
///   (an explicit page in the same batch is overridden);
/// - pages are 1-based, page 0 is clamped to 1;
/// - edit-mode toggles closer together than the cooldown are ignored.
pub fn reduce(state: &ProfileUiState, action: UiAction, rules: &UiRules) -> ProfileUiState {
    let mut next = state.clone();

    match action {
        UiAction::SetActiveTab(tab) => {
            next.active_tab = tab;
            next.current_page = 1;
        }
        UiAction::SetCurrentPage(page) => {
            next.current_page = page.max(1);
        }
        UiAction::ToggleEditMode { at } => {
            let too_soon = state
                .last_edit_toggle
                .is_some_and(|last| at.saturating_duration_since(last) < rules.edit_toggle_cooldown);
            if !too_soon {
                next.is_edit_mode = !state.is_edit_mode;
                next.last_edit_toggle = Some(at);
            }
        }
        UiAction::SetEditMode(enabled) => {
            next.is_edit_mode = enabled;
        }
        UiAction::SetLocalLoading(loading) => {
            next.local_loading = loading;
        }
        UiAction::BatchUpdate(batch) => {
            if let Some(page) = batch.current_page {
                next.current_page = page.max(1);
            }
            if let Some(tab) = batch.active_tab {
                if tab != state.active_tab {
                    next.current_page = 1;
                }
                next.active_tab = tab;
            }
            if let Some(edit) = batch.is_edit_mode {
                next.is_edit_mode = edit;
            }
            if let Some(loading) = batch.local_loading {
                next.local_loading = loading;
            }
        }
        UiAction::ResetState => {
            next = ProfileUiState::default();
        }
    }

    next
}
