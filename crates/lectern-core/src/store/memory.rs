//! In-memory [`VectorStore`] implementation.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity over every entry that passes the filter.
//! The file-backed index loads into and saves from this store.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Chunk, EmbeddingModel, MetadataFilter, SearchHit};
use crate::search::top_k;

use super::{validate_append, StoredEntry, VectorStore};

#[derive(Default)]
struct Inner {
    model: Option<EmbeddingModel>,
    entries: Vec<StoredEntry>,
}

/// In-memory store for tests and as the working set of file-backed indexes.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously persisted parts.
    pub fn from_parts(model: Option<EmbeddingModel>, entries: Vec<StoredEntry>) -> Self {
        Self {
            inner: RwLock::new(Inner { model, entries }),
        }
    }

    /// Clone out the model and all entries, in insertion order.
    pub fn snapshot(&self) -> Result<(Option<EmbeddingModel>, Vec<StoredEntry>), StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok((inner.model.clone(), inner.entries.clone()))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn embedding_model(&self) -> Result<Option<EmbeddingModel>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.model.clone())
    }

    async fn append(
        &self,
        model: &EmbeddingModel,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        validate_append(model, chunks, vectors)?;
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        match &inner.model {
            Some(stored) if stored != model => {
                return Err(StoreError::ModelMismatch {
                    stored: stored.clone(),
                    requested: model.clone(),
                });
            }
            Some(_) => {}
            None => inner.model = Some(model.clone()),
        }
        inner
            .entries
            .extend(chunks.iter().zip(vectors).map(|(c, v)| StoredEntry {
                chunk: c.clone(),
                vector: v.clone(),
            }));
        Ok(())
    }

    async fn vector_search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let filter = filter.normalized()?;
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let candidates = inner
            .entries
            .iter()
            .filter(|e| filter.matches(&e.chunk.metadata))
            .map(|e| (&e.chunk, e.vector.as_slice()));
        Ok(top_k(query, candidates, k))
    }

    async fn scan(&self, filter: &MetadataFilter) -> Result<Vec<Chunk>, StoreError> {
        let filter = filter.normalized()?;
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner
            .entries
            .iter()
            .filter(|e| filter.matches(&e.chunk.metadata))
            .map(|e| e.chunk.clone())
            .collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.entries.len())
    }

    async fn persist(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
