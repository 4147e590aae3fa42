//! Filtered semantic search.
//!
//! The search path operates entirely through the [`VectorStore`] and
//! [`Embedder`] traits. The calling application picks the backend and the
//! embedding provider; this module embeds the query and asks the store for
//! the top `k` entries that satisfy the metadata filter.
//!
//! An empty result is a valid outcome, never an error.

use std::cmp::Ordering;

use tracing::debug;

use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::error::Error;
use crate::models::{Chunk, MetadataFilter, SearchHit};
use crate::store::{ensure_model, VectorStore};

/// Score candidates against `query` and keep the best `k`.
///
/// The sort is stable, so candidates with equal scores keep the order in
/// which they were supplied (insertion order for every backend).
pub fn top_k<'a, I>(query: &[f32], candidates: I, k: usize) -> Vec<SearchHit>
where
    I: IntoIterator<Item = (&'a Chunk, &'a [f32])>,
{
    if k == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(&Chunk, f32)> = candidates
        .into_iter()
        .map(|(chunk, vector)| (chunk, cosine_similarity(query, vector)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
        .into_iter()
        .map(|(chunk, score)| SearchHit {
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
            score,
        })
        .collect()
}

/// Run a filtered similarity search against a [`VectorStore`].
///
/// This is the function the CLI and any chat collaborator delegate to.
///
/// - A filter key that names no metadata field is an error on every backend.
/// - A blank query or `k == 0` returns no hits.
/// - An empty store returns no hits without calling the embedder.
/// - A store built with a different embedding model is an error.
pub async fn search<S, E>(
    store: &S,
    embedder: &E,
    query: &str,
    k: usize,
    filter: &MetadataFilter,
) -> Result<Vec<SearchHit>, Error>
where
    S: VectorStore + ?Sized,
    E: Embedder + ?Sized,
{
    let filter = filter.normalized()?;
    if query.trim().is_empty() || k == 0 {
        return Ok(Vec::new());
    }
    if store.is_empty().await? {
        return Ok(Vec::new());
    }
    ensure_model(store, &embedder.model()).await?;

    let query_vec = embed_query(embedder, query).await?;
    let hits = store.vector_search(&query_vec, k, &filter).await?;
    debug!(k, hits = hits.len(), "search complete");
    Ok(hits)
}
