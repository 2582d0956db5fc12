//! In-memory DocumentStore implementation.
//!
//! Suitable for development sessions and tests. Snapshot listeners are fed
//! synchronously from the writing call, so a listener observes writes in the
//! order they were applied.

use async_trait::async_trait;
use scholarly_core::error::{Result, ScholarlyError};
use scholarly_core::store::{
    Document, DocumentPath, DocumentStore, Fields, Query, SetOptions, SnapshotListener,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;

type Collections = BTreeMap<String, BTreeMap<String, Fields>>;
type Listener = (DocumentPath, mpsc::UnboundedSender<Option<Document>>);

/// DocumentStore backed by nested ordered maps.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<Collections>,
    listeners: Mutex<Vec<Listener>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        collections.get(collection).map_or(0, BTreeMap::len)
    }

    fn snapshot(&self, path: &DocumentPath) -> Option<Document> {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        collections
            .get(&path.collection)
            .and_then(|docs| docs.get(&path.id))
            .map(|data| Document::new(path.clone(), data.clone()))
    }

    /// Pushes the current value of `path` to its listeners, dropping closed ones.
    fn publish(&self, path: &DocumentPath) {
        let snapshot = self.snapshot(path);
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|(watched, sender)| {
            if watched != path {
                return !sender.is_closed();
            }
            sender.send(snapshot.clone()).is_ok()
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        Ok(self.snapshot(path))
    }

    async fn set(&self, path: &DocumentPath, data: Fields, options: SetOptions) -> Result<()> {
        {
            let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
            let docs = collections.entry(path.collection.clone()).or_default();
            match docs.get_mut(&path.id) {
                Some(existing) if options.merge => existing.extend(data),
                _ => {
                    docs.insert(path.id.clone(), data);
                }
            }
        }
        tracing::debug!("[MemoryDocumentStore] set {} (merge={})", path, options.merge);
        self.publish(path);
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, partial: Fields) -> Result<()> {
        {
            let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
            let existing = collections
                .get_mut(&path.collection)
                .and_then(|docs| docs.get_mut(&path.id))
                .ok_or_else(|| ScholarlyError::not_found("document", path.to_string()))?;
            existing.extend(partial);
        }
        tracing::debug!("[MemoryDocumentStore] update {}", path);
        self.publish(path);
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        let removed = {
            let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
            collections
                .get_mut(&path.collection)
                .and_then(|docs| docs.remove(&path.id))
                .is_some()
        };
        if removed {
            tracing::debug!("[MemoryDocumentStore] delete {}", path);
            self.publish(path);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let documents: Vec<Document> = {
            let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
            collections
                .get(collection)
                .map(|docs| {
                    docs.iter()
                        .map(|(id, data)| Document::new(DocumentPath::new(collection, id), data.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(query.execute(documents))
    }

    async fn listen(&self, path: &DocumentPath) -> Result<SnapshotListener> {
        let (sender, receiver) = mpsc::unbounded_channel();
        // Send the current value before registering so the first item is the initial snapshot
        let _ = sender.send(self.snapshot(path));
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.push((path.clone(), sender));
        Ok(SnapshotListener::new(receiver))
    }
}
