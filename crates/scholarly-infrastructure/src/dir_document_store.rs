//! Directory-backed DocumentStore implementation.
//!
//! Directory structure:
//! ```text
//! root/
//! ├── users/
//! │   └── <uid>.json
//! ├── articles/
//! │   └── <article-id>.json
//! └── reviews/
//!     └── <review-id>.json
//! ```
//!
//! Writes go to a temporary file that is renamed over the target, so a crash
//! never leaves a half-written document behind. Read-modify-write operations
//! are serialized through one async mutex per store.

use async_trait::async_trait;
use scholarly_core::error::{Result, ScholarlyError};
use scholarly_core::store::{
    Document, DocumentPath, DocumentStore, Fields, Query, SetOptions, SnapshotListener,
};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, mpsc};

type Listener = (DocumentPath, mpsc::UnboundedSender<Option<Document>>);

pub struct DirDocumentStore {
    root: PathBuf,
    write_lock: AsyncMutex<()>,
    listeners: Mutex<Vec<Listener>>,
}

impl DirDocumentStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            ScholarlyError::store_unavailable(format!(
                "Failed to create document directory {}: {}",
                root.display(),
                e
            ))
        })?;
        tracing::info!("[DirDocumentStore] Opened store at {}", root.display());

        Ok(Self {
            root,
            write_lock: AsyncMutex::new(()),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf> {
        check_segment("collection", collection)?;
        Ok(self.root.join(collection))
    }

    fn document_file(&self, path: &DocumentPath) -> Result<PathBuf> {
        check_segment("id", &path.id)?;
        Ok(self.collection_dir(&path.collection)?.join(format!("{}.json", path.id)))
    }

    async fn read(&self, path: &DocumentPath) -> Result<Option<Document>> {
        let file = self.document_file(path)?;
        let content = match tokio::fs::read_to_string(&file).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(data) => Ok(Some(Document::new(path.clone(), data))),
            _ => Err(ScholarlyError::Serialization {
                format: "JSON".to_string(),
                message: format!("{} does not contain a JSON object", file.display()),
            }),
        }
    }

    async fn write(&self, path: &DocumentPath, data: &Fields) -> Result<()> {
        let file = self.document_file(path)?;
        let dir = self.collection_dir(&path.collection)?;
        tokio::fs::create_dir_all(&dir).await?;

        let tmp = dir.join(format!(".{}.json.tmp", path.id));
        let content = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &file).await?;
        Ok(())
    }

    async fn publish(&self, path: &DocumentPath) {
        let snapshot = match self.read(path).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("[DirDocumentStore] Failed to read snapshot for {}: {}", path, e);
                return;
            }
        };
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|(watched, sender)| {
            if watched != path {
                return !sender.is_closed();
            }
            sender.send(snapshot.clone()).is_ok()
        });
    }
}

fn check_segment(label: &str, segment: &str) -> Result<()> {
    let valid = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.starts_with('.')
        && !segment.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(ScholarlyError::validation(
            label,
            format!("'{}' is not a valid path segment", segment),
        ))
    }
}

#[async_trait]
impl DocumentStore for DirDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        self.read(path).await
    }

    async fn set(&self, path: &DocumentPath, data: Fields, options: SetOptions) -> Result<()> {
        {
            let _guard = self.write_lock.lock().await;
            let data = match self.read(path).await? {
                Some(mut existing) if options.merge => {
                    existing.data.extend(data);
                    existing.data
                }
                _ => data,
            };
            self.write(path, &data).await?;
        }
        tracing::debug!("[DirDocumentStore] set {} (merge={})", path, options.merge);
        self.publish(path).await;
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, partial: Fields) -> Result<()> {
        {
            let _guard = self.write_lock.lock().await;
            let mut existing = self
                .read(path)
                .await?
                .ok_or_else(|| ScholarlyError::not_found("document", path.to_string()))?;
            existing.data.extend(partial);
            self.write(path, &existing.data).await?;
        }
        tracing::debug!("[DirDocumentStore] update {}", path);
        self.publish(path).await;
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        let file = self.document_file(path)?;
        {
            let _guard = self.write_lock.lock().await;
            match tokio::fs::remove_file(&file).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!("[DirDocumentStore] delete {}", path);
        self.publish(path).await;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let dir = self.collection_dir(collection)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let Some(id) = name.strip_suffix(".json") else {
                continue;
            };
            if let Some(document) = self.read(&DocumentPath::new(collection, id)).await? {
                documents.push(document);
            }
        }

        Ok(query.execute(documents))
    }

    async fn listen(&self, path: &DocumentPath) -> Result<SnapshotListener> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(self.read(path).await?);
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.push((path.clone(), sender));
        Ok(SnapshotListener::new(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholarly_core::store::Direction;
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_store() -> (DirDocumentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DirDocumentStore::open(temp_dir.path().join("docs")).await.unwrap();
        (store, temp_dir)
    }

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _temp) = create_test_store().await;
        let path = DocumentPath::new("users", "u1");

        store
            .set(&path, fields(json!({"name": "Ada"})), SetOptions::default())
            .await
            .unwrap();

        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.field("name"), Some(&json!("Ada")));
        assert!(store.root().join("users").join("u1.json").exists());
    }

    #[tokio::test]
    async fn test_merge_and_update() {
        let (store, _temp) = create_test_store().await;
        let path = DocumentPath::new("users", "u1");

        store
            .set(&path, fields(json!({"name": "Ada", "role": ""})), SetOptions::default())
            .await
            .unwrap();
        store
            .set(&path, fields(json!({"role": "Researcher"})), SetOptions::merge())
            .await
            .unwrap();
        store
            .update(&path, fields(json!({"department": "Maths"})))
            .await
            .unwrap();

        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.field("name"), Some(&json!("Ada")));
        assert_eq!(doc.field("role"), Some(&json!("Researcher")));
        assert_eq!(doc.field("department"), Some(&json!("Maths")));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (store, _temp) = create_test_store().await;
        let err = store
            .update(&DocumentPath::new("users", "ghost"), Fields::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_traversal_segments() {
        let (store, _temp) = create_test_store().await;
        let err = store
            .get(&DocumentPath::new("users", "../secrets"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_query_empty_collection() {
        let (store, _temp) = create_test_store().await;
        let docs = store.query("articles", &Query::new()).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_query_skips_temp_files_and_orders() {
        let (store, _temp) = create_test_store().await;
        for (id, created) in [("a1", 5), ("a2", 9), ("a3", 1)] {
            store
                .set(
                    &DocumentPath::new("articles", id),
                    fields(json!({"authorId": "u1", "createdAt": created})),
                    SetOptions::default(),
                )
                .await
                .unwrap();
        }
        tokio::fs::write(store.root().join("articles").join(".a4.json.tmp"), b"{")
            .await
            .unwrap();

        let query = Query::new()
            .where_eq("authorId", "u1")
            .order_by("createdAt", Direction::Desc)
            .limit(2);
        let docs = store.query("articles", &query).await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["a2", "a1"]);
    }

    #[tokio::test]
    async fn test_delete_notifies_listener() {
        let (store, _temp) = create_test_store().await;
        let path = DocumentPath::new("users", "u1");
        store.set(&path, Fields::new(), SetOptions::default()).await.unwrap();

        let mut listener = store.listen(&path).await.unwrap();
        assert!(listener.next().await.unwrap().is_some());

        store.delete(&path).await.unwrap();
        assert_eq!(listener.next().await, Some(None));
    }
}
