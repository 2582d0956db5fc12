//! In-process AuthProvider.
//!
//! Keeps accounts in memory and publishes sign-in state on a watch channel.
//! Intended for development sessions and tests; it stores no credentials
//! anywhere outside the process.

use async_trait::async_trait;
use scholarly_core::auth::{AuthProvider, AuthUser};
use scholarly_core::error::{Result, ScholarlyError};
use scholarly_core::profile::validation::is_valid_email;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

pub const MIN_PASSWORD_LENGTH: usize = 8;

struct Account {
    user: AuthUser,
    password: String,
}

pub struct MemoryAuthProvider {
    /// Accounts keyed by lower-cased email.
    accounts: Mutex<HashMap<String, Account>>,
    password_resets: Mutex<Vec<String>>,
    state: watch::Sender<Option<AuthUser>>,
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            password_resets: Mutex::new(Vec::new()),
            state,
        }
    }

    /// Emails for which a password reset was requested, oldest first.
    pub fn password_reset_requests(&self) -> Vec<String> {
        self.password_resets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_current(&self, user: Option<AuthUser>) {
        // send_replace never fails, even with no subscribers
        self.state.send_replace(user);
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        let user = {
            let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            match accounts.get(&email.trim().to_lowercase()) {
                Some(account) if account.password == password => account.user.clone(),
                _ => {
                    return Err(ScholarlyError::validation(
                        "credentials",
                        "Invalid email or password",
                    ));
                }
            }
        };

        tracing::info!("[MemoryAuthProvider] Signed in uid={}", user.uid);
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<AuthUser> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(ScholarlyError::validation(
                "email",
                "Please enter a valid email address",
            ));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ScholarlyError::validation(
                "password",
                format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
            ));
        }

        let user = {
            let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            if accounts.contains_key(&email) {
                return Err(ScholarlyError::validation(
                    "email",
                    "An account with this email already exists",
                ));
            }

            let mut user = AuthUser::new(uuid::Uuid::new_v4().to_string(), email.clone());
            let display_name = display_name.trim();
            if !display_name.is_empty() {
                user = user.with_display_name(display_name);
            }
            accounts.insert(
                email,
                Account {
                    user: user.clone(),
                    password: password.to_string(),
                },
            );
            user
        };

        tracing::info!("[MemoryAuthProvider] Signed up uid={}", user.uid);
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(user) = self.current_user() {
            tracing::info!("[MemoryAuthProvider] Signed out uid={}", user.uid);
        }
        self.set_current(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(ScholarlyError::validation(
                "email",
                "Please enter a valid email address",
            ));
        }
        // Unknown addresses are accepted silently so callers cannot discover which accounts exist
        let known = self
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&email);
        if known {
            self.password_resets
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(email.clone());
        }
        tracing::debug!("[MemoryAuthProvider] Password reset requested (known={})", known);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_up_signs_in_and_notifies() {
        let auth = MemoryAuthProvider::new();
        let mut changes = auth.subscribe();
        assert!(auth.current_user().is_none());

        let user = auth.sign_up("Ada@Example.org", "correct horse", "Ada").await.unwrap();
        assert_eq!(user.email, "ada@example.org");
        assert_eq!(user.display_name.as_deref(), Some("Ada"));

        changes.changed().await.unwrap();
        assert_eq!(changes.borrow().as_ref().map(|u| u.uid.clone()), Some(user.uid));
    }

    #[tokio::test]
    async fn test_sign_up_validation() {
        let auth = MemoryAuthProvider::new();
        assert!(auth.sign_up("not-an-email", "long enough", "").await.is_err());
        assert!(auth.sign_up("a@b.org", "short", "").await.is_err());

        auth.sign_up("a@b.org", "long enough", "").await.unwrap();
        let err = auth.sign_up("A@B.org", "long enough", "").await.unwrap_err();
        assert!(err.validation_errors().unwrap().contains("email"));
    }

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let auth = MemoryAuthProvider::new();
        let user = auth.sign_up("a@b.org", "long enough", "").await.unwrap();
        auth.sign_out().await.unwrap();
        assert!(auth.current_user().is_none());

        assert!(auth.sign_in("a@b.org", "wrong password").await.is_err());
        let again = auth.sign_in("a@b.org", "long enough").await.unwrap();
        assert_eq!(again, user);
        assert_eq!(auth.current_user(), Some(user));
    }

    #[tokio::test]
    async fn test_password_reset_records_known_accounts_only() {
        let auth = MemoryAuthProvider::new();
        auth.sign_up("a@b.org", "long enough", "").await.unwrap();

        auth.send_password_reset("a@b.org").await.unwrap();
        auth.send_password_reset("ghost@b.org").await.unwrap();
        assert!(auth.send_password_reset("bogus").await.is_err());

        assert_eq!(auth.password_reset_requests(), vec!["a@b.org".to_string()]);
    }
}
