//! Shared fakes for the application integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use scholarly_application::SessionContext;
use scholarly_core::auth::AuthProvider;
use scholarly_core::config::AppConfig;
use scholarly_core::error::{Result, ScholarlyError};
use scholarly_core::notification::{Notification, Notifier};
use scholarly_core::store::{
    Document, DocumentPath, DocumentStore, Fields, Query, SetOptions, SnapshotListener,
};
use scholarly_infrastructure::{MemoryAuthProvider, MemoryDocumentStore};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// MemoryDocumentStore with injectable failures and delays, recording every call.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryDocumentStore,
    get_failures: AtomicU32,
    update_failures: AtomicU32,
    delay: Mutex<Duration>,
    get_attempts: Mutex<Vec<Instant>>,
    update_attempts: AtomicU32,
    writes: Mutex<Vec<Fields>>,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_gets(&self, count: u32) {
        self.get_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_updates(&self, count: u32) {
        self.update_failures.store(count, Ordering::SeqCst);
    }

    /// Latency added to every get and update.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn get_attempts(&self) -> Vec<Instant> {
        self.get_attempts.lock().unwrap().clone()
    }

    pub fn update_attempts(&self) -> u32 {
        self.update_attempts.load(Ordering::SeqCst)
    }

    /// Field maps of the updates that reached the store successfully.
    pub fn writes(&self) -> Vec<Fields> {
        self.writes.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn seed(&self, path: &DocumentPath, data: Fields) {
        self.inner.set(path, data, SetOptions::replace()).await.unwrap();
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        self.get_attempts.lock().unwrap().push(Instant::now());
        self.enter().await;
        let result = if Self::take_failure(&self.get_failures) {
            Err(ScholarlyError::network_with_code("simulated outage", "unavailable"))
        } else {
            self.inner.get(path).await
        };
        self.leave();
        result
    }

    async fn set(&self, path: &DocumentPath, data: Fields, options: SetOptions) -> Result<()> {
        self.inner.set(path, data, options).await
    }

    async fn update(&self, path: &DocumentPath, partial: Fields) -> Result<()> {
        self.update_attempts.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let result = if Self::take_failure(&self.update_failures) {
            Err(ScholarlyError::network("simulated outage"))
        } else {
            let result = self.inner.update(path, partial.clone()).await;
            if result.is_ok() {
                self.writes.lock().unwrap().push(partial);
            }
            result
        };
        self.leave();
        result
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        self.inner.query(collection, query).await
    }

    async fn listen(&self, path: &DocumentPath) -> Result<SnapshotListener> {
        self.inner.listen(path).await
    }
}

/// Notifier that keeps every call, including duplicates.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<Notification> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.calls().into_iter().map(|n| n.id).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.calls.lock().unwrap().push(notification);
    }
}

pub struct Harness {
    pub context: SessionContext,
    pub auth: Arc<MemoryAuthProvider>,
    pub store: Arc<FlakyStore>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Context with a signed-in user, a flaky store and a recording notifier.
pub async fn harness() -> Harness {
    let auth = Arc::new(MemoryAuthProvider::new());
    auth.sign_up("ada@example.org", "long enough", "").await.unwrap();
    let store = Arc::new(FlakyStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let context = SessionContext::builder()
        .auth(auth.clone())
        .store(store.clone())
        .notifier(notifier.clone())
        .config(AppConfig::default())
        .build()
        .unwrap();
    Harness {
        context,
        auth,
        store,
        notifier,
    }
}

pub fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap()
}
