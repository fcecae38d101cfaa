use crate::{AddReport, DocumentChunk, IndexState, ModelError, RetrievedChunk, SearchError};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn collection(&self) -> &str;

    async fn state(&self) -> IndexState;

    async fn len(&self) -> Result<usize, SearchError>;

    /// Inserts chunks whose id is not stored yet. Duplicates are counted, not
    /// overwritten.
    async fn add(&self, chunks: &[DocumentChunk]) -> Result<AddReport, SearchError>;

    /// Up to `k` chunks, most similar first. Equal scores keep insertion order.
    async fn query(&self, question: &str, k: usize) -> Result<Vec<RetrievedChunk>, SearchError>;

    /// Replaces the whole index with `chunks`. The previous contents stay
    /// visible and durable until the replacement has been written.
    async fn rebuild(&self, chunks: &[DocumentChunk]) -> Result<AddReport, SearchError>;

    /// Waits for in-flight writes, then releases the index. Later calls fail
    /// with `SearchError::IndexUnavailable`.
    async fn close(&self);
}

/// Prompt in, plain text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}
