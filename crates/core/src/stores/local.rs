use crate::embeddings::Embedder;
use crate::store::Collection;
use crate::traits::VectorIndex;
use crate::{AddReport, DocumentChunk, IndexState, RetrievedChunk, SearchError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const INDEX_FILE: &str = "index.json";
const STAGING_FILE: &str = "index.json.tmp";

/// Directory-backed vector index for one collection.
///
/// Readers clone an `Arc` snapshot and never wait on writers. Writers are
/// serialized, build the next snapshot off to the side, write it to a staging
/// file, rename it over the durable index, and only then swap it in.
pub struct LocalVectorStore {
    collection: String,
    directory: Option<PathBuf>,
    embedder: Arc<dyn Embedder>,
    snapshot: RwLock<Option<Arc<Collection>>>,
    building: AtomicBool,
    writer: Mutex<()>,
}

impl LocalVectorStore {
    /// Opens `<root>/<collection>/index.json`, creating an empty index when absent.
    pub async fn open(
        root: impl AsRef<Path>,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, SearchError> {
        let collection = collection.into();
        let directory = root.as_ref().join(&collection);
        tokio::fs::create_dir_all(&directory).await?;

        let staging = directory.join(STAGING_FILE);
        if tokio::fs::try_exists(&staging).await? {
            warn!(path = %staging.display(), "discarding staging file from an interrupted write");
            tokio::fs::remove_file(&staging).await?;
        }

        let index_path = directory.join(INDEX_FILE);
        let store = Self {
            collection: collection.clone(),
            directory: Some(directory),
            embedder,
            snapshot: RwLock::new(None),
            building: AtomicBool::new(false),
            writer: Mutex::new(()),
        };

        let loaded = if tokio::fs::try_exists(&index_path).await? {
            let loaded = load_collection(&index_path).await?;
            if loaded.name != collection {
                return Err(SearchError::CorruptIndex {
                    path: index_path.display().to_string(),
                    details: format!("holds collection {} instead of {collection}", loaded.name),
                });
            }
            if loaded.embedding_model != store.embedder.model_name() {
                warn!(
                    stored = %loaded.embedding_model,
                    configured = %store.embedder.model_name(),
                    "index was built with a different embedding model; rebuild it"
                );
            }
            loaded
        } else {
            let empty = Collection::new(&collection, store.embedder.model_name());
            store.persist(&empty).await?;
            empty
        };

        info!(
            collection = %collection,
            chunks = loaded.len(),
            path = %index_path.display(),
            "vector index opened"
        );
        *store.snapshot.write().await = Some(Arc::new(loaded));
        Ok(store)
    }

    /// Non-durable index, ready and empty.
    pub fn in_memory(collection: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        let collection = collection.into();
        let empty = Collection::new(&collection, embedder.model_name());
        Self {
            collection,
            directory: None,
            embedder,
            snapshot: RwLock::new(Some(Arc::new(empty))),
            building: AtomicBool::new(false),
            writer: Mutex::new(()),
        }
    }

    pub fn index_path(&self) -> Option<PathBuf> {
        self.directory.as_ref().map(|directory| directory.join(INDEX_FILE))
    }

    async fn current(&self) -> Result<Arc<Collection>, SearchError> {
        self.snapshot
            .read()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| {
                SearchError::IndexUnavailable(format!("collection {} is not open", self.collection))
            })
    }

    async fn insert_all(
        &self,
        target: &mut Collection,
        chunks: &[DocumentChunk],
    ) -> Result<AddReport, SearchError> {
        let mut report = AddReport::default();
        for chunk in chunks {
            if target.contains(&chunk.id) {
                warn!(chunk_id = %chunk.id, "skipping duplicate chunk id");
                report.skipped_duplicates += 1;
                continue;
            }
            let embedding = self.embedder.embed(&chunk.text).await?;
            target.insert(chunk.clone(), embedding)?;
            report.added += 1;
        }
        Ok(report)
    }

    async fn persist(&self, collection: &Collection) -> Result<(), SearchError> {
        let Some(directory) = &self.directory else {
            return Ok(());
        };

        let staging = directory.join(STAGING_FILE);
        let target = directory.join(INDEX_FILE);
        let payload = serde_json::to_vec(collection)?;

        let mut file = tokio::fs::File::create(&staging).await?;
        file.write_all(&payload).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&staging, &target).await?;
        debug!(path = %target.display(), bytes = payload.len(), "index persisted");
        Ok(())
    }

    async fn publish(&self, next: Collection) {
        *self.snapshot.write().await = Some(Arc::new(next));
    }
}

async fn load_collection(path: &Path) -> Result<Collection, SearchError> {
    let bytes = tokio::fs::read(path).await?;
    let corrupt = |details: String| SearchError::CorruptIndex {
        path: path.display().to_string(),
        details,
    };

    let mut collection: Collection =
        serde_json::from_slice(&bytes).map_err(|error| corrupt(error.to_string()))?;
    collection.reindex().map_err(corrupt)?;
    Ok(collection)
}

struct BuildingFlag<'a>(&'a AtomicBool);

impl<'a> BuildingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for BuildingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorIndex for LocalVectorStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn state(&self) -> IndexState {
        if self.building.load(Ordering::SeqCst) {
            return IndexState::Building;
        }
        match self.snapshot.read().await.as_ref() {
            Some(_) => IndexState::Ready,
            None => IndexState::Uninitialized,
        }
    }

    async fn len(&self) -> Result<usize, SearchError> {
        Ok(self.current().await?.len())
    }

    async fn add(&self, chunks: &[DocumentChunk]) -> Result<AddReport, SearchError> {
        let _writer = self.writer.lock().await;
        let current = self.current().await?;
        let _building = BuildingFlag::raise(&self.building);

        let mut next = Collection::clone(&current);
        let report = self.insert_all(&mut next, chunks).await?;

        if report.added > 0 {
            self.persist(&next).await?;
            self.publish(next).await;
        }

        info!(
            collection = %self.collection,
            added = report.added,
            skipped_duplicates = report.skipped_duplicates,
            "chunks added"
        );
        Ok(report)
    }

    async fn query(&self, question: &str, k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        let snapshot = self.current().await?;
        if snapshot.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(question).await?;
        snapshot.rank(&query_vector, k)
    }

    async fn rebuild(&self, chunks: &[DocumentChunk]) -> Result<AddReport, SearchError> {
        let _writer = self.writer.lock().await;
        self.current().await?;
        let _building = BuildingFlag::raise(&self.building);

        let mut next = Collection::new(&self.collection, self.embedder.model_name());
        let report = self.insert_all(&mut next, chunks).await?;

        self.persist(&next).await?;
        self.publish(next).await;

        info!(
            collection = %self.collection,
            chunks = report.added,
            skipped_duplicates = report.skipped_duplicates,
            "index rebuilt"
        );
        Ok(report)
    }

    async fn close(&self) {
        let _writer = self.writer.lock().await;
        if self.snapshot.write().await.take().is_some() {
            info!(collection = %self.collection, "vector index closed");
        }
    }
}
