//! Turns profile failures into log lines and user notifications.

use crate::profile_data_store::ProfileDataStore;
use scholarly_core::error::ScholarlyError;
use scholarly_core::notification::{Notification, NotificationAction, Notifier};
use scholarly_core::profile::LoadingState;
use std::sync::Arc;

/// Notification id used for successful profile saves.
pub const PROFILE_UPDATED_ID: &str = "profile-updated";

/// What [`ProfileErrorHandler::handle`] did with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Logged only.
    Ignored,
    /// Logged and shown to the user.
    Notified,
    /// Shown to the user and a reload of the profile was started.
    RetryScheduled,
}

#[derive(Clone)]
pub struct ProfileErrorHandler {
    data: Arc<ProfileDataStore>,
    notifier: Arc<dyn Notifier>,
}

impl ProfileErrorHandler {
    pub fn new(data: Arc<ProfileDataStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { data, notifier }
    }

    /// Stable notification id for an error, so that repeated failures of the
    /// same kind replace each other instead of stacking.
    pub fn notification_id(error: &ScholarlyError) -> String {
        format!("profile-error-{}", error.kind())
    }

    pub fn handle(&self, error: &ScholarlyError) -> ErrorDisposition {
        let id = Self::notification_id(error);

        match error {
            ScholarlyError::SessionClosed => {
                tracing::debug!("[ProfileErrorHandler] Ignoring error after teardown");
                ErrorDisposition::Ignored
            }
            ScholarlyError::TimeoutWarning { .. } => {
                tracing::warn!("[ProfileErrorHandler] {}", error);
                self.notifier.notify(Notification::warning(
                    id,
                    "This is taking longer than usual. Still working on it.",
                ));
                ErrorDisposition::Notified
            }
            ScholarlyError::Validation(errors) => {
                tracing::info!("[ProfileErrorHandler] Rejected edit: {}", errors);
                self.notifier.notify(Notification::warning(
                    id,
                    format!("Please check your input: {}", errors),
                ));
                ErrorDisposition::Notified
            }
            ScholarlyError::NotAuthenticated => {
                tracing::warn!("[ProfileErrorHandler] {}", error);
                self.notifier.notify(Notification::error(
                    id,
                    "Your session has ended. Please sign in again.",
                ));
                ErrorDisposition::Notified
            }
            ScholarlyError::ProfileNotLoaded => {
                tracing::info!("[ProfileErrorHandler] {}", error);
                self.notifier
                    .notify(Notification::warning(id, "Your profile is still loading."));
                ErrorDisposition::Notified
            }
            ScholarlyError::StoreUnavailable(_) | ScholarlyError::Config(_) => {
                tracing::error!("[ProfileErrorHandler] {}", error);
                self.notifier.notify(Notification::error(
                    id,
                    "The profile service is unavailable right now.",
                ));
                ErrorDisposition::Notified
            }
            _ if error.is_retryable() => {
                tracing::warn!("[ProfileErrorHandler] {}", error);
                self.notifier.notify(
                    Notification::error(
                        id,
                        "We could not reach the server. Check your connection and try again.",
                    )
                    .with_action(NotificationAction::Retry),
                );
                if self.schedule_retry() {
                    ErrorDisposition::RetryScheduled
                } else {
                    ErrorDisposition::Notified
                }
            }
            _ => {
                tracing::error!("[ProfileErrorHandler] {}", error);
                self.notifier.notify(
                    Notification::error(id, "Something went wrong. Please try again.")
                        .with_action(NotificationAction::Retry),
                );
                ErrorDisposition::Notified
            }
        }
    }

    /// A reload is started only when no profile was ever loaded, the store
    /// is idle in `Error`, and the failed load still had attempts left.
    /// An exhausted load waits for the user's explicit retry.
    fn should_retry(&self) -> bool {
        !self.data.is_closed()
            && !self.data.is_busy()
            && self.data.profile().is_none()
            && self.data.state() == LoadingState::Error
            && self.data.retry_count() < self.data.settings().max_retries
    }

    fn schedule_retry(&self) -> bool {
        if !self.should_retry() {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("[ProfileErrorHandler] No runtime available, retry left to the user");
            return false;
        };

        let data = self.data.clone();
        runtime.spawn(async move {
            if let Err(e) = data.retry().await {
                tracing::debug!("[ProfileErrorHandler] Scheduled retry failed: {}", e);
            }
        });
        tracing::info!("[ProfileErrorHandler] Scheduled profile reload");
        true
    }
}
