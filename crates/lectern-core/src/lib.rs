//! # Lectern Core
//!
//! Shared, I/O-free logic for Lectern: data models, the whitespace chunker,
//! the embedder and vector store traits, the in-memory store, and the
//! filtered search entry point.
//!
//! This crate contains no tokio runtime, sqlx, HTTP client, or filesystem
//! access. Concrete extractors, embedding providers, and persistent store
//! backends live in the `lectern` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod search;
pub mod store;

pub use error::{EmbedError, Error, StoreError};
