use crate::models::{DocumentChunk, RetrievedChunk};
use crate::SearchError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub chunk: DocumentChunk,
    pub embedding: Vec<f32>,
}

/// In-memory contents of one named collection. Records keep insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub embedding_model: String,
    pub dimensions: Option<usize>,
    records: Vec<StoredRecord>,
    #[serde(skip)]
    ids: HashSet<String>,
}

impl Collection {
    pub fn new(name: impl Into<String>, embedding_model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            embedding_model: embedding_model.into(),
            dimensions: None,
            records: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// Restores the id set after deserialization and checks record invariants.
    pub fn reindex(&mut self) -> Result<(), String> {
        self.ids.clear();
        for record in &self.records {
            if !self.ids.insert(record.chunk.id.clone()) {
                return Err(format!("duplicate chunk id {}", record.chunk.id));
            }
            if let Some(expected) = self.dimensions {
                if record.embedding.len() != expected {
                    return Err(format!(
                        "record {} has dimension {} instead of {}",
                        record.chunk.id,
                        record.embedding.len(),
                        expected
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn records(&self) -> &[StoredRecord] {
        &self.records
    }

    /// Returns `Ok(false)` without touching the collection when the id exists.
    pub fn insert(&mut self, chunk: DocumentChunk, embedding: Vec<f32>) -> Result<bool, SearchError> {
        if self.ids.contains(&chunk.id) {
            return Ok(false);
        }
        self.check_dimensions(embedding.len())?;
        if self.dimensions.is_none() {
            self.dimensions = Some(embedding.len());
        }

        self.ids.insert(chunk.id.clone());
        self.records.push(StoredRecord { chunk, embedding });
        Ok(true)
    }

    pub fn rank(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimensions(query.len())?;

        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| (position, cosine_similarity(query, &record.embedding)))
            .collect();

        // Stable: equal scores stay in insertion order.
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, score)| RetrievedChunk {
                chunk: self.records[position].chunk.clone(),
                score,
            })
            .collect())
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), SearchError> {
        match self.dimensions {
            Some(expected) if expected != actual => {
                Err(SearchError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}
