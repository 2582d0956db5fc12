//! Session context: the collaborators one profile session works against.
//!
//! Built once and cloned into every component, so nothing reaches for a
//! process-wide handle.

use scholarly_core::auth::AuthProvider;
use scholarly_core::config::AppConfig;
use scholarly_core::error::{Result, ScholarlyError};
use scholarly_core::notification::{Notification, NotificationLevel, Notifier};
use scholarly_core::store::DocumentStore;
use std::sync::Arc;

struct ContextInner {
    auth: Arc<dyn AuthProvider>,
    store: Option<Arc<dyn DocumentStore>>,
    notifier: Arc<dyn Notifier>,
    config: AppConfig,
}

/// Shared handles for one session. Cloning is cheap.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<ContextInner>,
}

impl SessionContext {
    pub fn builder() -> SessionContextBuilder {
        SessionContextBuilder::default()
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.inner.auth
    }

    /// The document store, or `StoreUnavailable` when none could be obtained.
    pub fn store(&self) -> Result<Arc<dyn DocumentStore>> {
        self.inner.store.clone().ok_or_else(|| {
            ScholarlyError::store_unavailable("No document store is configured for this session")
        })
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.inner.notifier
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }
}

#[derive(Default)]
pub struct SessionContextBuilder {
    auth: Option<Arc<dyn AuthProvider>>,
    store: Option<Arc<dyn DocumentStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    config: Option<AppConfig>,
}

impl SessionContextBuilder {
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Finishes the context. An auth provider is mandatory; a missing notifier
    /// falls back to logging only, a missing store is reported lazily.
    pub fn build(self) -> Result<SessionContext> {
        let auth = self
            .auth
            .ok_or_else(|| ScholarlyError::config("SessionContext requires an auth provider"))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        if self.store.is_none() {
            tracing::warn!("[SessionContext] Built without a document store");
        }

        Ok(SessionContext {
            inner: Arc::new(ContextInner {
                auth,
                store: self.store,
                notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
                config,
            }),
        })
    }
}

/// Notifier that only writes to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error | NotificationLevel::Warning => {
                tracing::warn!("[LogNotifier:{}] {}", notification.id, notification.message)
            }
            NotificationLevel::Info | NotificationLevel::Success => {
                tracing::info!("[LogNotifier:{}] {}", notification.id, notification.message)
            }
        }
    }
}
