//! Persistent vector store backed by JSON snapshots on local disk.
//!
//! Each collection lives in `<directory>/<collection>.json` and holds the
//! collection's dimension plus every chunk with its embedding. Snapshots are
//! loaded when the store is opened and rewritten after each upsert by writing
//! a temporary file and renaming it over the old one, so a crash mid-write
//! leaves the previous snapshot intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, rank};

const BACKEND: &str = "Local";

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    dimensions: usize,
    chunks: IndexMap<String, Chunk>,
}

fn store_error(message: impl Into<String>) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message: message.into() }
}

/// Collection names become file names.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(RagError::ConfigError(format!(
            "collection name '{name}' may only contain ASCII letters, digits, '_' and '-'"
        )))
    }
}

/// A vector store that survives restarts.
///
/// All collections found in the directory are loaded by [`open`](Self::open).
/// Searches are exact cosine-similarity scans over the loaded chunks.
///
/// # Example
///
/// ```rust,ignore
/// use pdf_rag::{LocalVectorStore, VectorStore};
///
/// let store = LocalVectorStore::open("./vector_store").await?;
/// println!("{} chunks", store.count("pdf_documents").await?);
/// ```
#[derive(Debug)]
pub struct LocalVectorStore {
    directory: PathBuf,
    collections: RwLock<HashMap<String, Snapshot>>,
}

impl LocalVectorStore {
    /// Open (creating if needed) a store rooted at `directory`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] if the directory cannot be created or read,
    /// and [`RagError::VectorStoreError`] if a snapshot is corrupt.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;

        let mut collections = HashMap::new();
        let mut entries = tokio::fs::read_dir(&directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if validate_name(&name).is_err() {
                warn!(path = %path.display(), "skipping file with an invalid collection name");
                continue;
            }
            let snapshot = Self::read_snapshot(&path).await?;
            debug!(collection = %name, chunks = snapshot.chunks.len(), "loaded collection");
            collections.insert(name, snapshot);
        }

        info!(
            directory = %directory.display(),
            collections = collections.len(),
            "opened local vector store"
        );
        Ok(Self { directory, collections: RwLock::new(collections) })
    }

    /// The directory holding the snapshots.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn snapshot_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.json"))
    }

    async fn read_snapshot(path: &Path) -> Result<Snapshot> {
        let bytes = tokio::fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            error!(path = %path.display(), error = %e, "corrupt collection snapshot");
            store_error(format!("corrupt snapshot {}: {e}", path.display()))
        })
    }

    async fn persist(&self, name: &str, snapshot: &Snapshot) -> Result<()> {
        let path = self.snapshot_path(name);
        let tmp = self.directory.join(format!(".{name}.json.tmp"));
        let bytes = serde_json::to_vec(snapshot)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to replace snapshot");
            store_error(format!("failed to write {}: {e}", path.display()))
        })?;
        debug!(collection = %name, bytes = bytes.len(), "persisted collection");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        validate_name(name)?;
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Ok(());
        }
        let snapshot = Snapshot { dimensions, chunks: IndexMap::new() };
        self.persist(name, &snapshot).await?;
        collections.insert(name.to_string(), snapshot);
        info!(collection = %name, dimensions, "created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut collections = self.collections.write().await;
        collections.remove(name);
        match tokio::fs::remove_file(self.snapshot_path(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(collection = %name, "deleted collection");
        Ok(())
    }

    async fn collection_dimensions(&self, name: &str) -> Result<Option<usize>> {
        Ok(self.collections.read().await.get(name).map(|s| s.dimensions))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|s| s.chunks.len())
            .ok_or_else(|| store_error(format!("collection '{collection}' does not exist")))
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        // The write lock is held through persist so snapshots land in upsert order.
        let mut collections = self.collections.write().await;
        let snapshot = collections
            .get_mut(collection)
            .ok_or_else(|| store_error(format!("collection '{collection}' does not exist")))?;

        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != snapshot.dimensions) {
            return Err(store_error(format!(
                "chunk '{}' has {} dimensions, collection '{collection}' expects {}",
                bad.id,
                bad.embedding.len(),
                snapshot.dimensions
            )));
        }

        // Staged on a copy; memory only changes once the snapshot is on disk.
        let mut staged = Snapshot { dimensions: snapshot.dimensions, chunks: snapshot.chunks.clone() };
        for chunk in chunks {
            staged.chunks.insert(chunk.id.clone(), chunk.clone());
        }
        self.persist(collection, &staged).await?;
        *snapshot = staged;
        debug!(collection = %collection, upserted = chunks.len(), total = snapshot.chunks.len(), "upserted chunks");
        Ok(())
    }

    async fn similarity_search_with_score(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let snapshot = collections
            .get(collection)
            .ok_or_else(|| store_error(format!("collection '{collection}' does not exist")))?;
        Ok(rank(snapshot.chunks.values(), embedding, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_are_file_safe() {
        assert!(validate_name("pdf_documents").is_ok());
        assert!(validate_name("docs-2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name("a b").is_err());
    }

    #[tokio::test]
    async fn create_is_idempotent_and_delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        store.create_collection("docs", 3).await.unwrap();
        store.create_collection("docs", 5).await.unwrap();
        assert_eq!(store.collection_dimensions("docs").await.unwrap(), Some(3));
        assert!(dir.path().join("docs.json").exists());

        store.delete_collection("docs").await.unwrap();
        assert_eq!(store.collection_dimensions("docs").await.unwrap(), None);
        assert!(!dir.path().join("docs.json").exists());
    }

    fn embedded(id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: id.to_string(),
            embedding,
            source: "doc.pdf".to_string(),
            page: 1,
            chunk_index: 0,
            start_index: 0,
            document_id: "doc".to_string(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn failed_write_leaves_collection_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        store.create_collection("docs", 2).await.unwrap();

        // A directory in the temp file's place makes the write fail.
        let blocker = dir.path().join(".docs.json.tmp");
        std::fs::create_dir(&blocker).unwrap();
        assert!(store.upsert("docs", &[embedded("failed", vec![1.0, 0.0])]).await.is_err());
        assert_eq!(store.count("docs").await.unwrap(), 0);
        assert!(store.similarity_search("docs", &[1.0, 0.0], 5).await.unwrap().is_empty());

        std::fs::remove_dir(&blocker).unwrap();
        store.upsert("docs", &[embedded("ok", vec![0.0, 1.0])]).await.unwrap();
        drop(store);

        let reopened = LocalVectorStore::open(dir.path()).await.unwrap();
        let ids: Vec<String> = reopened
            .similarity_search("docs", &[0.0, 1.0], 5)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["ok".to_string()]);
    }
}
