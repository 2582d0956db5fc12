//! One signed-in profile view and everything it owns.

use crate::auth_listener::spawn_auth_listener;
use crate::content_service::{ContentCounters, ContentService};
use crate::context::SessionContext;
use crate::error_handler::{ErrorDisposition, ProfileErrorHandler};
use crate::profile_data_store::{Outcome, ProfileDataStore};
use crate::profile_operations::ProfileOperations;
use crate::ui_store::ProfileUiStore;
use scholarly_core::error::{Result, ScholarlyError};
use scholarly_core::profile::{ProfileUpdate, UserProfile, profile_path};
use scholarly_core::store::{Document, DocumentStore, SnapshotListener};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Facade over the data store, the write coordinator, the view state and
/// the content listings of one profile view.
///
/// Dropping the session without [`ProfileSession::shutdown`] leaves its
/// background tasks running until the cancellation token fires, so callers
/// should always shut it down.
pub struct ProfileSession {
    context: SessionContext,
    data: Arc<ProfileDataStore>,
    operations: ProfileOperations,
    errors: ProfileErrorHandler,
    ui: ProfileUiStore,
    content: ContentService,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ProfileSession {
    /// Wires up a session and starts its background tasks: the write
    /// coordinator, the auth listener (which performs the first load), and
    /// a watcher applying remote changes of the loaded profile.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(context: SessionContext) -> Self {
        let cancel = CancellationToken::new();
        let data = Arc::new(ProfileDataStore::with_cancellation(
            context.clone(),
            cancel.child_token(),
        ));
        let notifier = context.notifier().clone();
        let errors = ProfileErrorHandler::new(data.clone(), notifier.clone());

        let (operations, coordinator) =
            ProfileOperations::spawn(data.clone(), notifier, cancel.child_token());
        let mut tasks = vec![
            coordinator,
            spawn_auth_listener(
                context.auth().clone(),
                data.clone(),
                errors.clone(),
                cancel.child_token(),
            ),
        ];

        match context.store() {
            Ok(store) => tasks.push(spawn_snapshot_watcher(store, data.clone(), cancel.child_token())),
            Err(e) => tracing::warn!("[ProfileSession] Remote changes will not be observed: {}", e),
        }

        tracing::info!("[ProfileSession] Started");
        Self {
            ui: ProfileUiStore::new(data.settings()),
            content: ContentService::new(context.clone()),
            context,
            data,
            operations,
            errors,
            cancel,
            tasks,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn data(&self) -> &Arc<ProfileDataStore> {
        &self.data
    }

    pub fn operations(&self) -> &ProfileOperations {
        &self.operations
    }

    pub fn ui(&self) -> &ProfileUiStore {
        &self.ui
    }

    pub fn content(&self) -> &ContentService {
        &self.content
    }

    /// Queues an edit and waits for the write carrying it.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile> {
        self.operations.update_profile(update).await
    }

    pub async fn retry(&self) -> Result<Outcome<UserProfile>> {
        self.data.retry().await
    }

    pub fn handle_error(&self, error: &ScholarlyError) -> ErrorDisposition {
        self.errors.handle(error)
    }

    /// Recomputes the loaded profile's article and review counters.
    pub async fn sync_counters(&self) -> Result<ContentCounters> {
        let profile = self.data.profile().ok_or(ScholarlyError::ProfileNotLoaded)?;
        self.content.sync_counters(&profile.uid).await
    }

    /// Stops the session immediately. Buffered edits are abandoned and
    /// results still in flight are dropped.
    pub fn teardown(&self) {
        self.data.teardown();
        self.cancel.cancel();
    }

    /// Writes buffered edits, then tears down and waits for the background
    /// tasks to finish.
    pub async fn shutdown(self) {
        if let Err(e) = self.operations.flush().await {
            tracing::debug!("[ProfileSession] Flush on shutdown failed: {}", e);
        }
        self.teardown();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("[ProfileSession] Background task ended abnormally: {}", e);
            }
        }
        tracing::info!("[ProfileSession] Shut down");
    }
}

/// Keeps a snapshot listener on the loaded profile and feeds its updates to
/// the data store. The listener follows the loaded uid. Snapshots that land
/// while a load or write is running are replaced by a fresh read once the
/// data store is idle again.
fn spawn_snapshot_watcher(
    store: Arc<dyn DocumentStore>,
    data: Arc<ProfileDataStore>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut states = data.subscribe();
        let mut watched: Option<String> = None;
        let mut listener: Option<SnapshotListener> = None;
        // A snapshot arrived while a load or write held the record
        let mut deferred = false;

        loop {
            let loaded = data.profile().map(|profile| profile.uid);
            if loaded != watched {
                listener = None;
                deferred = false;
                if let Some(uid) = &loaded {
                    match store.listen(&profile_path(uid)).await {
                        Ok(subscribed) => {
                            tracing::debug!("[ProfileSession] Watching profile uid={}", uid);
                            listener = Some(subscribed);
                        }
                        Err(e) => {
                            tracing::warn!("[ProfileSession] Cannot watch profile uid={}: {}", uid, e)
                        }
                    }
                }
                watched = loaded;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = data.wait_until_idle(), if deferred => {
                    deferred = false;
                    if let Some(uid) = &watched {
                        match store.get(&profile_path(uid)).await {
                            Ok(document) => {
                                if !data.apply_remote_snapshot(document) && data.is_busy() {
                                    deferred = true;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("[ProfileSession] Cannot re-read profile uid={}: {}", uid, e)
                            }
                        }
                    }
                }
                snapshot = next_snapshot(&mut listener) => match snapshot {
                    Some(_) if data.is_busy() => {
                        tracing::debug!("[ProfileSession] Deferring snapshot until the record is idle");
                        deferred = true;
                    }
                    Some(document) => {
                        data.apply_remote_snapshot(document);
                    }
                    None => {
                        tracing::debug!("[ProfileSession] Snapshot listener closed by the store");
                        listener = None;
                    }
                },
            }
        }

        tracing::debug!("[ProfileSession] Snapshot watcher stopped");
    })
}

async fn next_snapshot(listener: &mut Option<SnapshotListener>) -> Option<Option<Document>> {
    match listener {
        Some(listener) => listener.next().await,
        None => std::future::pending().await,
    }
}
