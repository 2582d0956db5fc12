//! User notification surface.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Follow-up the surface may offer next to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    Retry,
}

/// A fire-and-forget message for the user.
///
/// `id` is the deduplication key: showing a notification whose id is already
/// on screen replaces the existing one instead of stacking a second copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: String,
    pub level: NotificationLevel,
    pub message: String,
    pub action: Option<NotificationAction>,
}

impl Notification {
    pub fn new(id: impl Into<String>, level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            level,
            message: message.into(),
            action: None,
        }
    }

    pub fn success(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, NotificationLevel::Success, message)
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, NotificationLevel::Error, message)
    }

    pub fn warning(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, NotificationLevel::Warning, message)
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Sink for user-visible notifications. Return values are never consumed.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}
