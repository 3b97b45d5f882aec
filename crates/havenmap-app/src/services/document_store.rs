use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::paths::AppPaths;

// Document storage abstractions.
//
// The importer only needs "store by id" and "read back"; overwriting an
// existing id replaces the document (last write wins).

/// A stored document: a JSON object keyed by field name.
pub type Document = JsonMap<String, JsonValue>;

/// Errors emitted by document storage operations.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("invalid document key `{0}`")]
    InvalidKey(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("request error: {0}")]
    Request(#[source] Arc<reqwest::Error>),

    #[error("document store answered HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("failed to decode stored document: {0}")]
    Decode(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Request(Arc::new(e))
    }
}

/// Validate a collection name or document id: non-empty, no path separators,
/// no leading dot.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = key.is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\'])
        || key.chars().any(char::is_control);
    if invalid {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Trait abstracting over document database backends.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `document` under `collection/id`, replacing any existing document.
    async fn put(&self, collection: &str, id: &str, document: &Document) -> Result<(), StoreError>;

    /// Read a document back, `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Ids of every document in `collection`, sorted.
    async fn list(&self, collection: &str) -> Result<Vec<String>, StoreError>;
}

/// Durability policy for filesystem writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurableWrite {
    /// No explicit fsync (fastest, least durable).
    #[default]
    None,
    /// Fsync the file only.
    FileOnly,
    /// Fsync file and parent directory.
    FileAndDir,
}

/// Filesystem document store: one pretty-printed JSON file per document at
/// `documents/{collection}/{id}.json`.
///
/// Writes land in a temp file in the collection directory and are renamed
/// into place, so readers never observe a partial document.
#[derive(Debug, Clone, bon::Builder)]
pub struct FsDocumentStore {
    paths: AppPaths,
    #[builder(default = DurableWrite::None)]
    durability: DurableWrite,
}

impl FsDocumentStore {
    fn document_path(&self, collection: &str, id: &str) -> PathBuf {
        self.paths
            .collection_dir(collection)
            .join(format!("{id}.json"))
    }

    /// Directory fsync is best-effort; some platforms don't support it.
    async fn fsync_dir(&self, dir_path: &Path) {
        match fs::File::open(dir_path).await {
            Ok(dir_file) => {
                if let Err(e) = dir_file.sync_all().await {
                    tracing::warn!("directory fsync unsupported or failed: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!("failed to open directory for fsync: {}", e);
            }
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for FsDocumentStore {
    async fn put(&self, collection: &str, id: &str, document: &Document) -> Result<(), StoreError> {
        validate_key(collection)?;
        validate_key(id)?;

        let dir = self
            .paths
            .ensure_collection_dir(collection)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let payload = serde_json::to_vec_pretty(document)?;

        let temp_file = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| StoreError::Io(format!("create temp file: {}", e)))?;
        let mut file = fs::File::from_std(
            temp_file
                .reopen()
                .map_err(|e| StoreError::Io(format!("reopen temp file: {}", e)))?,
        );
        file.write_all(&payload)
            .await
            .map_err(|e| StoreError::Io(format!("write document: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| StoreError::Io(format!("flush document: {}", e)))?;

        if matches!(
            self.durability,
            DurableWrite::FileOnly | DurableWrite::FileAndDir
        ) {
            file.sync_all()
                .await
                .map_err(|e| StoreError::Io(format!("fsync file: {}", e)))?;
        }
        drop(file);

        let final_path = self.document_path(collection, id);
        temp_file
            .persist(&final_path)
            .map_err(|e| StoreError::Io(format!("rename into place: {}", e.error)))?;

        if self.durability == DurableWrite::FileAndDir {
            self.fsync_dir(&dir).await;
        }

        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        validate_key(collection)?;
        validate_key(id)?;

        let path = self.document_path(collection, id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(format!("read document: {}", e))),
        };

        serde_json::from_slice::<Document>(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Decode(format!("{}: {}", path.display(), e)))
    }

    async fn list(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        validate_key(collection)?;

        let dir = self.paths.collection_dir(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(format!("list collection: {}", e))),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

/// In-memory document store, mainly a test double.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<Mutex<HashMap<String, BTreeMap<String, Document>>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in `collection`.
    pub async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.lock().await;
        collections.get(collection).map_or(0, BTreeMap::len)
    }

    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }

    /// Clone of every document in `collection`, ordered by id.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        let collections = self.collections.lock().await;
        collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, collection: &str, id: &str, document: &Document) -> Result<(), StoreError> {
        validate_key(collection)?;
        validate_key(id)?;
        let mut collections = self.collections.lock().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        validate_key(collection)?;
        validate_key(id)?;
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn list(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        validate_key(collection)?;
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: JsonValue) -> Document {
        value.as_object().cloned().expect("object literal")
    }

    fn fs_store(temp: &TempDir, durability: DurableWrite) -> FsDocumentStore {
        FsDocumentStore::builder()
            .paths(AppPaths::new(temp.path()).expect("paths"))
            .durability(durability)
            .build()
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("resources").is_ok());
        assert!(validate_key("3f2b8c1e-0000-4000-8000-000000000001").is_ok());
        for bad in ["", ".hidden", "a/b", "a\\b", "tab\there"] {
            assert!(
                matches!(validate_key(bad), Err(StoreError::InvalidKey(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn fs_store_round_trips_and_overwrites() {
        let temp = TempDir::new().expect("temp dir");
        let store = fs_store(&temp, DurableWrite::FileAndDir);

        assert_eq!(store.get("resources", "a").await.unwrap(), None);

        let first = doc(json!({"id": "a", "n": 1.5, "nested": {"x": null}}));
        store.put("resources", "a", &first).await.unwrap();
        assert_eq!(store.get("resources", "a").await.unwrap(), Some(first));

        let second = doc(json!({"id": "a", "n": 2}));
        store.put("resources", "a", &second).await.unwrap();
        assert_eq!(store.get("resources", "a").await.unwrap(), Some(second));

        let on_disk = temp.path().join("documents").join("resources").join("a.json");
        assert!(on_disk.is_file());
    }

    #[tokio::test]
    async fn fs_store_lists_sorted_ids_and_ignores_temp_files() {
        let temp = TempDir::new().expect("temp dir");
        let store = fs_store(&temp, DurableWrite::None);

        assert!(store.list("resources").await.unwrap().is_empty());
        for id in ["b", "a", "c"] {
            store
                .put("resources", id, &doc(json!({"id": id})))
                .await
                .unwrap();
        }
        std::fs::write(
            temp.path().join("documents").join("resources").join(".tmpXYZ"),
            b"partial",
        )
        .unwrap();

        assert_eq!(store.list("resources").await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn fs_store_rejects_traversal_keys() {
        let temp = TempDir::new().expect("temp dir");
        let store = fs_store(&temp, DurableWrite::None);
        let err = store
            .put("resources", "../escape", &doc(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn fs_store_reports_corrupt_documents() {
        let temp = TempDir::new().expect("temp dir");
        let store = fs_store(&temp, DurableWrite::None);
        let dir = temp.path().join("documents").join("resources");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.json"), b"{not json").unwrap();

        assert!(matches!(
            store.get("resources", "broken").await,
            Err(StoreError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_behaves_like_fs_store() {
        let store = MemoryDocumentStore::new();
        assert!(store.is_empty("resources").await);

        store
            .put("resources", "b", &doc(json!({"id": "b"})))
            .await
            .unwrap();
        store
            .put("resources", "a", &doc(json!({"id": "a"})))
            .await
            .unwrap();

        assert_eq!(store.len("resources").await, 2);
        assert_eq!(store.list("resources").await.unwrap(), vec!["a", "b"]);
        assert_eq!(
            store.get("resources", "a").await.unwrap(),
            Some(doc(json!({"id": "a"})))
        );
        assert_eq!(store.get("other", "a").await.unwrap(), None);
    }
}
