//! Builds a [`SessionContext`] from configuration with the in-process
//! collaborators.

use crate::context::SessionContext;
use scholarly_core::config::StoreSettings;
use scholarly_core::error::Result;
use scholarly_core::store::DocumentStore;
use scholarly_infrastructure::paths::ScholarlyPaths;
use scholarly_infrastructure::telemetry::init_tracing;
use scholarly_infrastructure::{
    ConfigService, DirDocumentStore, MemoryAuthProvider, MemoryDocumentStore, NotificationCenter,
};
use std::path::PathBuf;
use std::sync::Arc;

/// A context plus the concrete collaborators behind it.
pub struct LocalEnvironment {
    pub context: SessionContext,
    pub auth: Arc<MemoryAuthProvider>,
    pub notifications: Arc<NotificationCenter>,
}

/// Loads configuration, installs tracing and constructs the collaborators.
///
/// A directory store that cannot be opened is logged and left out; the
/// session then reports `StoreUnavailable` on first use instead of failing
/// here.
pub async fn bootstrap(config_service: &ConfigService) -> Result<LocalEnvironment> {
    let config = config_service.get_config()?;
    if init_tracing(&config.logging) {
        tracing::debug!("[Bootstrap] Tracing initialised");
    }

    let store: Option<Arc<dyn DocumentStore>> = match &config.store {
        StoreSettings::Memory => Some(Arc::new(MemoryDocumentStore::new())),
        StoreSettings::Directory { path } => {
            let root = if path.as_os_str().is_empty() {
                ScholarlyPaths::default().documents_dir()
            } else {
                Ok(path.clone())
            };
            open_directory_store(root).await
        }
    };

    let auth = Arc::new(MemoryAuthProvider::new());
    let notifications = Arc::new(NotificationCenter::new());
    let mut builder = SessionContext::builder()
        .auth(auth.clone())
        .notifier(notifications.clone())
        .config(config);
    if let Some(store) = store {
        builder = builder.store(store);
    }

    Ok(LocalEnvironment {
        context: builder.build()?,
        auth,
        notifications,
    })
}

async fn open_directory_store(root: Result<PathBuf>) -> Option<Arc<dyn DocumentStore>> {
    let opened = match root {
        Ok(root) => DirDocumentStore::open(root).await,
        Err(e) => Err(e),
    };
    match opened {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::error!("[Bootstrap] Document store unavailable: {}", e);
            None
        }
    }
}
