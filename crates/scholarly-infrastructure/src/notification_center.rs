//! Notifier implementation that keeps the active notifications.
//!
//! A notification whose id is already active replaces the existing entry in
//! place, so repeated identical failures never stack.

use scholarly_core::notification::{Notification, NotificationLevel, Notifier};
use std::sync::{Mutex, PoisonError};

#[derive(Default)]
pub struct NotificationCenter {
    /// Active notifications in first-shown order.
    active: Mutex<Vec<Notification>>,
    /// Total `notify` calls, including replacements.
    shown: Mutex<usize>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Vec<Notification> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    pub fn shown_count(&self) -> usize {
        *self.shown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes a notification. Returns whether it was active.
    pub fn dismiss(&self, id: &str) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let before = active.len();
        active.retain(|n| n.id != id);
        active.len() != before
    }

    pub fn clear(&self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => {
                tracing::error!("[Notification:{}] {}", notification.id, notification.message)
            }
            NotificationLevel::Warning => {
                tracing::warn!("[Notification:{}] {}", notification.id, notification.message)
            }
            NotificationLevel::Info | NotificationLevel::Success => {
                tracing::info!("[Notification:{}] {}", notification.id, notification.message)
            }
        }

        *self.shown.lock().unwrap_or_else(PoisonError::into_inner) += 1;

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.iter_mut().find(|n| n.id == notification.id) {
            Some(existing) => *existing = notification,
            None => active.push(notification),
        }
    }
}
