//! Vector store abstraction for Lectern.
//!
//! The [`VectorStore`] trait defines the append-only storage contract the
//! indexing and retrieval pipeline needs, enabling pluggable backends (the
//! single-file index, SQLite, and the in-memory store below).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::embedding::{embed_batched, Embedder};
use crate::error::{Error, StoreError};
use crate::models::{Chunk, EmbeddingModel, MetadataFilter, SearchHit};

/// One persisted (chunk, vector) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Abstract append-only vector store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`embedding_model`](VectorStore::embedding_model) | Model the index was built with, if any |
/// | [`append`](VectorStore::append) | Add chunks with their vectors; never updates or removes |
/// | [`vector_search`](VectorStore::vector_search) | Filtered cosine-similarity top-k |
/// | [`scan`](VectorStore::scan) | Every chunk matching a filter, in insertion order |
/// | [`len`](VectorStore::len) | Number of stored entries |
/// | [`persist`](VectorStore::persist) | Make all appended entries durable |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Model and dimensionality recorded by the first append, if any.
    async fn embedding_model(&self) -> Result<Option<EmbeddingModel>, StoreError>;

    /// Append chunks and their vectors (same length, same order).
    ///
    /// The first append records `model`; later appends with a different
    /// model fail with [`StoreError::ModelMismatch`].
    async fn append(
        &self,
        model: &EmbeddingModel,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), StoreError>;

    /// Rank entries matching `filter` by cosine similarity to `query`.
    ///
    /// Returns at most `k` hits, best first. Equal scores keep insertion order.
    async fn vector_search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, StoreError>;

    /// All chunks matching `filter`, in insertion order.
    async fn scan(&self, filter: &MetadataFilter) -> Result<Vec<Chunk>, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// Flush to durable storage. A no-op for purely in-memory stores.
    async fn persist(&self) -> Result<(), StoreError>;
}

/// Fail with [`StoreError::ModelMismatch`] if the store was built with a
/// different model than `requested`.
pub async fn ensure_model<S: VectorStore + ?Sized>(
    store: &S,
    requested: &EmbeddingModel,
) -> Result<(), StoreError> {
    match store.embedding_model().await? {
        Some(stored) if &stored != requested => Err(StoreError::ModelMismatch {
            stored,
            requested: requested.clone(),
        }),
        _ => Ok(()),
    }
}

/// Check the shape of an append before any backend state changes.
pub fn validate_append(
    model: &EmbeddingModel,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
) -> Result<(), StoreError> {
    if chunks.len() != vectors.len() {
        return Err(StoreError::LengthMismatch {
            chunks: chunks.len(),
            vectors: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != model.dims) {
        return Err(StoreError::DimsMismatch {
            expected: model.dims,
            got: bad.len(),
        });
    }
    Ok(())
}

/// Embed `chunks` and append them to `store` in a single call.
///
/// Returns the number of chunks added. Nothing is appended if embedding fails.
pub async fn add_documents<S, E>(
    store: &S,
    embedder: &E,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<usize, Error>
where
    S: VectorStore + ?Sized,
    E: Embedder + ?Sized,
{
    if chunks.is_empty() {
        return Ok(0);
    }
    let model = embedder.model();
    ensure_model(store, &model).await?;

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embed_batched(embedder, &texts, batch_size).await?;
    store.append(&model, chunks, &vectors).await?;
    Ok(chunks.len())
}
