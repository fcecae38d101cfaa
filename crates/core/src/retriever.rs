use crate::traits::VectorIndex;
use crate::{RetrievedChunk, SearchError};
use std::sync::Arc;

pub const DEFAULT_TOP_K: usize = 5;

/// Question in, top-k chunks out.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, top_k: usize) -> Self {
        Self {
            index,
            top_k: top_k.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>, SearchError> {
        self.index.query(question, self.top_k).await
    }
}
