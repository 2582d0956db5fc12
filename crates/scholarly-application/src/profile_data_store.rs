//! Profile data store.
//!
//! Owns the signed-in user's profile record and the [`LoadingState`] machine
//! around it. Loads and writes go through a bounded retry loop with
//! exponential backoff; at most one of them runs at a time, and a second
//! caller gets [`Outcome::Skipped`] instead of an error.
//!
//! Results that arrive after [`ProfileDataStore::teardown`], or after a
//! [`ProfileDataStore::reset`] for a different identity, are dropped without
//! touching state.

use crate::context::SessionContext;
use chrono::Utc;
use scholarly_core::auth::AuthUser;
use scholarly_core::config::ProfileSettings;
use scholarly_core::error::{Result, ScholarlyError};
use scholarly_core::profile::{
    LoadingState, ProfileUpdate, UserProfile, is_profile_complete, profile_path, validate_update,
};
use scholarly_core::store::{Document, DocumentStore, Fields, SetOptions, encode_fields};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;

/// Result of an operation that may be skipped because another one is running.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    /// Another load or write was in flight, or the identity changed meanwhile.
    Skipped,
}

impl<T> Outcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

#[derive(Default)]
struct Inner {
    profile: Option<UserProfile>,
    /// Failed attempts of the current (or last) operation.
    retry_count: u32,
    last_error: Option<ScholarlyError>,
    /// Set when a load gave up; further loads wait for an explicit retry or
    /// for a successful write.
    awaiting_retry: bool,
    transitions: Vec<LoadingState>,
    /// Bumped on reset so that in-flight results for an old identity are dropped.
    generation: u64,
}

pub struct ProfileDataStore {
    context: SessionContext,
    settings: ProfileSettings,
    state: watch::Sender<LoadingState>,
    inner: Mutex<Inner>,
    busy: AtomicBool,
    idle: Notify,
    cancel: CancellationToken,
}

struct BusyGuard<'a> {
    store: &'a ProfileDataStore,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.store.busy.store(false, Ordering::Release);
        self.store.idle.notify_waiters();
    }
}

impl ProfileDataStore {
    pub fn new(context: SessionContext) -> Self {
        Self::with_cancellation(context, CancellationToken::new())
    }

    /// Creates a store whose lifetime is bound to `cancel`.
    pub fn with_cancellation(context: SessionContext, cancel: CancellationToken) -> Self {
        let settings = context.config().profile.clone();
        let (state, _) = watch::channel(LoadingState::Idle);
        Self {
            context,
            settings,
            state,
            inner: Mutex::new(Inner {
                transitions: vec![LoadingState::Idle],
                ..Default::default()
            }),
            busy: AtomicBool::new(false),
            idle: Notify::new(),
            cancel,
        }
    }

    // ============================================================================
    // Observers
    // ============================================================================

    pub fn state(&self) -> LoadingState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadingState> {
        self.state.subscribe()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.lock().profile.clone()
    }

    pub fn is_profile_complete(&self) -> bool {
        self.lock().profile.as_ref().is_some_and(is_profile_complete)
    }

    pub fn retry_count(&self) -> u32 {
        self.lock().retry_count
    }

    pub fn last_error(&self) -> Option<ScholarlyError> {
        self.lock().last_error.clone()
    }

    /// Every state entered so far, starting with the initial `Idle`.
    pub fn transitions(&self) -> Vec<LoadingState> {
        self.lock().transitions.clone()
    }

    pub fn settings(&self) -> &ProfileSettings {
        &self.settings
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once no load or write is running.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.is_busy() {
                return;
            }
            notified.await;
        }
    }

    // ============================================================================
    // Operations
    // ============================================================================

    /// Loads the signed-in user's profile, creating the default record when
    /// none exists yet.
    pub async fn load(&self) -> Result<Outcome<UserProfile>> {
        self.ensure_open()?;
        let Some(_guard) = self.try_begin("load") else {
            return Ok(Outcome::Skipped);
        };

        let Some(user) = self.context.auth().current_user() else {
            tracing::debug!("[ProfileDataStore] load() called without a signed-in user");
            return Err(ScholarlyError::NotAuthenticated);
        };

        let generation = {
            let mut inner = self.lock();
            if inner.awaiting_retry {
                tracing::debug!("[ProfileDataStore] load() refused: waiting for an explicit retry");
                return Err(inner
                    .last_error
                    .clone()
                    .unwrap_or_else(|| ScholarlyError::unknown("Profile load failed")));
            }
            if self.state() == LoadingState::Idle {
                self.transition(&mut inner, LoadingState::Initializing);
            }
            inner.retry_count = 0;
            inner.generation
        };

        let store = match self.context.store() {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("[ProfileDataStore] Cannot load profile: {}", e);
                return self.settle_error(generation, e, true);
            }
        };

        self.advance(generation, LoadingState::Loading);
        tracing::info!("[ProfileDataStore] Loading profile uid={}", user.uid);

        let result = self
            .run_with_retry("load", || fetch_or_create(store.as_ref(), &user))
            .await;

        match result {
            Ok(profile) => self.settle_profile(generation, profile),
            Err(e) => self.settle_error(generation, e, true),
        }
    }

    /// Writes `update` into the loaded profile.
    ///
    /// Validation runs before anything else and its errors are returned as-is.
    /// An empty update completes immediately without a write.
    pub async fn update(&self, update: ProfileUpdate) -> Result<Outcome<UserProfile>> {
        self.ensure_open()?;
        let user = self
            .context
            .auth()
            .current_user()
            .ok_or(ScholarlyError::NotAuthenticated)?;
        let store = self.context.store()?;
        let current = self.loaded_profile_for(&user)?;

        validate_update(&update, Some(&current))?;
        if update.is_empty() {
            return Ok(Outcome::Completed(current));
        }

        let Some(_guard) = self.try_begin("update") else {
            return Ok(Outcome::Skipped);
        };

        // A load may have replaced the record while we waited for the guard
        let current = self.loaded_profile_for(&user)?;
        let applied = update.apply_to(&current, Utc::now());
        let fields = update.to_fields(&applied)?;
        let path = profile_path(&user.uid);

        let generation = {
            let mut inner = self.lock();
            inner.retry_count = 0;
            self.transition(&mut inner, LoadingState::Updating);
            inner.generation
        };
        tracing::debug!(
            "[ProfileDataStore] Writing fields {:?} for uid={}",
            update.touched_fields(),
            user.uid
        );

        let result = self
            .run_with_retry("update", || store.update(&path, fields.clone()))
            .await;

        match result {
            Ok(()) => self.settle_profile(generation, applied),
            Err(e) => self.settle_error(generation, e, false),
        }
    }

    /// Clears the error state and the retry budget, then loads again.
    pub async fn retry(&self) -> Result<Outcome<UserProfile>> {
        self.ensure_open()?;
        if self.is_busy() {
            tracing::debug!("[ProfileDataStore] retry() skipped: operation already in progress");
            return Ok(Outcome::Skipped);
        }
        {
            let mut inner = self.lock();
            inner.retry_count = 0;
            inner.last_error = None;
            inner.awaiting_retry = false;
        }
        tracing::info!("[ProfileDataStore] Retrying profile load");
        self.load().await
    }

    /// Soft-deletes the profile and signs the user out.
    pub async fn deactivate(&self) -> Result<Outcome<()>> {
        self.ensure_open()?;
        let user = self
            .context
            .auth()
            .current_user()
            .ok_or(ScholarlyError::NotAuthenticated)?;
        let store = self.context.store()?;
        self.loaded_profile_for(&user)?;

        let Some(guard) = self.try_begin("deactivate") else {
            return Ok(Outcome::Skipped);
        };

        let generation = {
            let mut inner = self.lock();
            inner.retry_count = 0;
            self.transition(&mut inner, LoadingState::Updating);
            inner.generation
        };

        let now = serde_json::to_value(Utc::now())?;
        let mut fields = Fields::new();
        fields.insert("isDeleted".to_string(), Value::Bool(true));
        fields.insert("deletedAt".to_string(), now.clone());
        fields.insert("updatedAt".to_string(), now);
        let path = profile_path(&user.uid);

        if let Err(e) = self
            .run_with_retry("deactivate", || store.update(&path, fields.clone()))
            .await
        {
            return self.settle_error(generation, e, false);
        }
        drop(guard);

        tracing::info!("[ProfileDataStore] Deactivated profile uid={}", user.uid);
        self.context.auth().sign_out().await?;
        self.reset();
        Ok(Outcome::Completed(()))
    }

    /// Drops the loaded profile and returns to `Idle`. Used on sign-out and
    /// identity change; results still in flight are discarded.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.profile = None;
        inner.retry_count = 0;
        inner.last_error = None;
        inner.awaiting_retry = false;
        self.transition(&mut inner, LoadingState::Idle);
        tracing::debug!("[ProfileDataStore] Reset (generation {})", inner.generation);
    }

    /// Stops accepting work. Anything still in flight finishes but its result
    /// is dropped, and later calls fail with `SessionClosed`.
    pub fn teardown(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            tracing::info!("[ProfileDataStore] Torn down");
        }
    }

    /// Replaces the loaded record with a newer copy pushed by the store.
    ///
    /// Ignored while an operation runs (its own result will land) and for
    /// documents that do not belong to the loaded profile. Returns whether the
    /// record changed.
    pub fn apply_remote_snapshot(&self, document: Option<Document>) -> bool {
        if self.cancel.is_cancelled() || self.is_busy() {
            return false;
        }
        let Some(document) = document else {
            tracing::debug!("[ProfileDataStore] Profile document disappeared remotely");
            return false;
        };
        let remote = match decode_profile(&document) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("[ProfileDataStore] Ignoring remote snapshot: {}", e);
                return false;
            }
        };

        let mut inner = self.lock();
        match &inner.profile {
            Some(current) if current.uid == remote.uid && *current != remote => {
                tracing::debug!("[ProfileDataStore] Applied remote changes for uid={}", remote.uid);
                inner.profile = Some(remote);
                true
            }
            _ => false,
        }
    }

    // ============================================================================
    // Internals
    // ============================================================================

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ScholarlyError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn try_begin(&self, operation: &str) -> Option<BusyGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(
                "[ProfileDataStore] {}() skipped: operation already in progress",
                operation
            );
            return None;
        }
        Some(BusyGuard { store: self })
    }

    fn loaded_profile_for(&self, user: &AuthUser) -> Result<UserProfile> {
        self.lock()
            .profile
            .clone()
            .filter(|profile| profile.uid == user.uid)
            .ok_or(ScholarlyError::ProfileNotLoaded)
    }

    /// Moves to `next` if the table allows it. Caller holds the lock.
    fn transition(&self, inner: &mut Inner, next: LoadingState) {
        let current = self.state();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            tracing::warn!(
                "[ProfileDataStore] Ignoring invalid transition {} -> {}",
                current,
                next
            );
            return;
        }
        tracing::debug!("[ProfileDataStore] {} -> {}", current, next);
        inner.transitions.push(next);
        self.state.send_replace(next);
    }

    /// Transitions only while the operation started in `generation` is still current.
    fn advance(&self, generation: u64, next: LoadingState) {
        if self.cancel.is_cancelled() {
            return;
        }
        let mut inner = self.lock();
        if inner.generation == generation {
            self.transition(&mut inner, next);
        }
    }

    fn settle_profile(&self, generation: u64, profile: UserProfile) -> Result<Outcome<UserProfile>> {
        if self.cancel.is_cancelled() {
            tracing::debug!("[ProfileDataStore] Dropping result after teardown");
            return Err(ScholarlyError::SessionClosed);
        }
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!("[ProfileDataStore] Dropping result for a previous identity");
            return Ok(Outcome::Skipped);
        }
        inner.profile = Some(profile.clone());
        inner.last_error = None;
        inner.awaiting_retry = false;
        self.transition(&mut inner, LoadingState::Success);
        Ok(Outcome::Completed(profile))
    }

    fn settle_error<T>(
        &self,
        generation: u64,
        error: ScholarlyError,
        from_load: bool,
    ) -> Result<Outcome<T>> {
        if self.cancel.is_cancelled() {
            tracing::debug!("[ProfileDataStore] Dropping failure after teardown: {}", error);
            return Err(ScholarlyError::SessionClosed);
        }
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!("[ProfileDataStore] Dropping failure for a previous identity");
            return Ok(Outcome::Skipped);
        }
        inner.last_error = Some(error.clone());
        if from_load {
            inner.awaiting_retry = true;
        }
        self.transition(&mut inner, LoadingState::Error);
        Err(error)
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error, or
    /// `max_retries` attempts have failed. Sleeps `2^k * base` after the k-th
    /// failure (zero-based).
    async fn run_with_retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff_step: u32 = 0;
        loop {
            let result = self.warn_if_slow(operation, attempt()).await;
            if self.cancel.is_cancelled() {
                return Err(ScholarlyError::SessionClosed);
            }

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => normalize(e),
            };
            let failures = {
                let mut inner = self.lock();
                inner.retry_count = (inner.retry_count + 1).min(self.settings.max_retries);
                inner.retry_count
            };

            if !error.is_retryable() {
                tracing::warn!(
                    "[ProfileDataStore] {} failed (not retryable): {}",
                    operation,
                    error
                );
                return Err(error);
            }
            if failures >= self.settings.max_retries {
                tracing::error!(
                    "[ProfileDataStore] {} failed after {} attempts: {}",
                    operation,
                    failures,
                    error
                );
                return Err(error);
            }

            let delay = self.settings.backoff_delay(backoff_step);
            tracing::warn!(
                "[ProfileDataStore] {} attempt {}/{} failed: {}. Retrying in {:?}",
                operation,
                failures,
                self.settings.max_retries,
                error,
                delay
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(ScholarlyError::SessionClosed),
                _ = tokio::time::sleep(delay) => {}
            }
            backoff_step += 1;
        }
    }

    /// Awaits `future`, logging a warning if it outlives the slow-operation
    /// threshold. The operation itself is never aborted.
    async fn warn_if_slow<T>(&self, operation: &str, future: impl Future<Output = T>) -> T {
        let threshold = self.settings.slow_operation_warning();
        tokio::pin!(future);
        tokio::select! {
            output = &mut future => output,
            _ = tokio::time::sleep(threshold) => {
                let warning = ScholarlyError::TimeoutWarning {
                    operation: operation.to_string(),
                    elapsed_ms: u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX),
                };
                tracing::warn!("[ProfileDataStore] {}", warning);
                future.await
            }
        }
    }
}

/// Reclassifies opaque failures whose message looks transport-related.
fn normalize(error: ScholarlyError) -> ScholarlyError {
    match error {
        ScholarlyError::Unknown(message) => ScholarlyError::classify(message, None),
        other => other,
    }
}

async fn fetch_or_create(store: &dyn DocumentStore, user: &AuthUser) -> Result<UserProfile> {
    let path = profile_path(&user.uid);
    if let Some(document) = store.get(&path).await? {
        return decode_profile(&document);
    }

    let profile = UserProfile::default_for(user, Utc::now());
    store
        .set(&path, encode_fields(&profile)?, SetOptions::replace())
        .await?;
    tracing::info!("[ProfileDataStore] Created default profile uid={}", user.uid);
    Ok(profile)
}

/// Decodes a stored profile. Malformed records become `Unknown` rather than
/// surfacing serde details.
fn decode_profile(document: &Document) -> Result<UserProfile> {
    let mut profile: UserProfile = document.decode().map_err(|e| {
        ScholarlyError::unknown(format!("Malformed profile document {}: {}", document.path, e))
    })?;
    if profile.uid.is_empty() {
        profile.uid = document.id().to_string();
    }
    Ok(profile)
}
