//! # Lectern
//!
//! Incremental vector indexing and filtered semantic search over course
//! material (PowerPoint decks, PDFs, and HTML pages).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌────────────┐
//! │   Corpus    │──▶│  Extract +  │──▶│   Embed     │──▶│   Store    │
//! │ root/course │   │   Chunk     │   │ (provider)  │   │ file/SQLite│
//! └─────────────┘   └─────────────┘   └─────────────┘   └─────┬──────┘
//!                                                             │
//!                                                       ┌─────▼─────┐
//!                                                       │  Search   │
//!                                                       │ (filtered)│
//!                                                       └───────────┘
//! ```
//!
//! Each run skips files the index already holds, so re-running over an
//! unchanged corpus adds nothing.
//!
//! ## Quick Start
//!
//! ```bash
//! lectern index ./courses
//! lectern search ./courses "overbooking policy" --filter course=HMG6228
//! lectern stats ./courses
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus`] | Course directory discovery |
//! | [`extract`] | PPTX, PDF, and HTML text extraction |
//! | [`tracker`] | Already-indexed file detection |
//! | [`embedding`] | Embedding providers |
//! | [`store`] | File and SQLite vector stores |
//! | [`indexer`] | Incremental indexing runs |
//! | [`search`] | Search command |
//! | [`stats`] | Index statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod indexer;
pub mod migrate;
pub mod search;
pub mod stats;
pub mod store;
pub mod tracker;
