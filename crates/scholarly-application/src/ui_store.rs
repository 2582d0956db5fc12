//! Holder for the profile page's view state.

use scholarly_core::config::ProfileSettings;
use scholarly_core::ui_state::{ProfileTab, ProfileUiState, UiAction, UiBatch, UiRules, reduce};
use std::time::Instant;
use tokio::sync::watch;

/// Applies [`UiAction`]s through the pure reducer and publishes the result.
pub struct ProfileUiStore {
    state: watch::Sender<ProfileUiState>,
    rules: UiRules,
}

impl ProfileUiStore {
    pub fn new(settings: &ProfileSettings) -> Self {
        let (state, _) = watch::channel(ProfileUiState::default());
        Self {
            state,
            rules: UiRules {
                edit_toggle_cooldown: settings.edit_toggle_cooldown(),
            },
        }
    }

    pub fn state(&self) -> ProfileUiState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProfileUiState> {
        self.state.subscribe()
    }

    /// Reduces `action` into the current state. Subscribers are only woken
    /// when something actually changed.
    pub fn dispatch(&self, action: UiAction) -> ProfileUiState {
        let mut next = None;
        self.state.send_if_modified(|current| {
            let reduced = reduce(current, action, &self.rules);
            let changed = reduced != *current;
            *current = reduced.clone();
            next = Some(reduced);
            changed
        });
        next.unwrap_or_else(|| self.state())
    }

    pub fn set_active_tab(&self, tab: ProfileTab) -> ProfileUiState {
        self.dispatch(UiAction::SetActiveTab(tab))
    }

    pub fn set_current_page(&self, page: u32) -> ProfileUiState {
        self.dispatch(UiAction::SetCurrentPage(page))
    }

    /// Flips edit mode unless the previous flip was within the cooldown.
    pub fn toggle_edit_mode(&self) -> ProfileUiState {
        self.dispatch(UiAction::ToggleEditMode { at: Instant::now() })
    }

    pub fn set_edit_mode(&self, enabled: bool) -> ProfileUiState {
        self.dispatch(UiAction::SetEditMode(enabled))
    }

    pub fn set_local_loading(&self, loading: bool) -> ProfileUiState {
        self.dispatch(UiAction::SetLocalLoading(loading))
    }

    pub fn batch_update(&self, batch: UiBatch) -> ProfileUiState {
        self.dispatch(UiAction::BatchUpdate(batch))
    }

    pub fn reset(&self) -> ProfileUiState {
        self.dispatch(UiAction::ResetState)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_toggle_is_absorbed() {
        let store = ProfileUiStore::new(&ProfileSettings::default());
        assert!(store.toggle_edit_mode().is_edit_mode);
        assert!(store.toggle_edit_mode().is_edit_mode);
        assert!(!store.set_edit_mode(false).is_edit_mode);
    }

    #[test]
    fn test_tab_change_resets_page() {
        let store = ProfileUiStore::new(&ProfileSettings::default());
        store.set_current_page(6);
        let state = store.set_active_tab(ProfileTab::Articles);
        assert_eq!(state.current_page, 1);
        assert_eq!(store.state().active_tab, ProfileTab::Articles);
    }

    #[test]
    fn test_subscribers_see_only_changes() {
        let store = ProfileUiStore::new(&ProfileSettings::default());
        let mut receiver = store.subscribe();

        store.set_local_loading(false);
        assert!(!receiver.has_changed().unwrap());

        store.set_local_loading(true);
        assert!(receiver.has_changed().unwrap());
        assert!(receiver.borrow_and_update().local_loading);
    }
}
