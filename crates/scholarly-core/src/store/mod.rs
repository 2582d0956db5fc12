//! Document store seam.
//!
//! Path-addressed documents (`collection/id`) with get/set/update/delete,
//! single-collection range queries and snapshot listeners. Implementations
//! make no promise of multi-document atomicity, and callers must not rely on one.

mod path;
mod query;

pub use path::{Document, DocumentPath, Fields, SetOptions, encode_fields};
pub use query::{Cursor, Direction, Filter, OrderBy, Query, compare_values};

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Stream of snapshots for one document path.
///
/// The first snapshot is the value at subscription time; every later write or
/// delete of the path produces another one (`None` once deleted). Dropping the
/// listener unsubscribes.
pub struct SnapshotListener {
    receiver: mpsc::UnboundedReceiver<Option<Document>>,
}

impl SnapshotListener {
    pub fn new(receiver: mpsc::UnboundedReceiver<Option<Document>>) -> Self {
        Self { receiver }
    }

    /// Waits for the next snapshot. Returns `None` when the store went away.
    pub async fn next(&mut self) -> Option<Option<Document>> {
        self.receiver.recv().await
    }

    /// Returns an already-delivered snapshot without waiting.
    pub fn try_next(&mut self) -> Option<Option<Document>> {
        self.receiver.try_recv().ok()
    }
}

/// An abstract document store.
///
/// This trait decouples the profile controller from the concrete backend
/// (in-memory, directory of JSON files, remote managed database).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads one document.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Document))`: Document found
    /// - `Ok(None)`: Document does not exist
    /// - `Err(_)`: Error occurred during retrieval
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>>;

    /// Writes a document, replacing it unless `options.merge` is set.
    async fn set(&self, path: &DocumentPath, data: Fields, options: SetOptions) -> Result<()>;

    /// Shallow-merges `partial` into an existing document.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document does not exist.
    async fn update(&self, path: &DocumentPath, partial: Fields) -> Result<()>;

    /// Deletes a document. Deleting a missing document is not an error.
    async fn delete(&self, path: &DocumentPath) -> Result<()>;

    /// Runs a range query over one collection.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// Subscribes to snapshots of one document.
    async fn listen(&self, path: &DocumentPath) -> Result<SnapshotListener>;
}
