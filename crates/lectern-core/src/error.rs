//! Error types shared by embedders and vector store backends.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::EmbeddingModel;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure to turn text into vectors. Aborts the batch it occurred in.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("{0} environment variable not set")]
    MissingApiKey(&'static str),
    #[error("embedding request failed: {0}")]
    Request(#[source] BoxError),
    #[error("embedding API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed embedding response: {0}")]
    Malformed(String),
    #[error("embedder returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
    #[error("embedder returned a {got}-dimensional vector, expected {expected}")]
    DimsMismatch { expected: usize, got: usize },
    #[error("embedding backend failed: {0}")]
    Backend(String),
}

/// Failure in a vector store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persisted index exists but cannot be trusted.
    #[error("index at {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("index was built with {stored}, but the configured embedder is {requested}")]
    ModelMismatch {
        stored: EmbeddingModel,
        requested: EmbeddingModel,
    },
    #[error("cannot append {chunks} chunks with {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },
    #[error("vector has {got} dimensions, index expects {expected}")]
    DimsMismatch { expected: usize, got: usize },
    #[error("invalid metadata filter key: {0:?}")]
    InvalidFilterKey(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage backend error: {0}")]
    Backend(#[source] BoxError),
}

impl StoreError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// Error from an operation that both embeds and touches the store.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
