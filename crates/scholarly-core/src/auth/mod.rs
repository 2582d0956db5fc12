//! Authentication provider seam.
//!
//! The provider is an external collaborator: it owns credentials and emits
//! sign-in state changes. The profile controller only needs the current
//! identity and a way to observe changes to it.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Identity of the signed-in user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl AuthUser {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

/// Abstract authentication provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the currently signed-in user, if any.
    fn current_user(&self) -> Option<AuthUser>;

    /// Subscribes to auth-state changes.
    ///
    /// The receiver always holds the latest identity; `None` means signed out.
    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser>;

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<AuthUser>;

    async fn sign_out(&self) -> Result<()>;

    async fn send_password_reset(&self, email: &str) -> Result<()>;
}
