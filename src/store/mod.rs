//! Persistent vector store backends.
//!
//! | Backend | Files | Module |
//! |---------|-------|--------|
//! | `file` (default) | `<root>/index.vec` + `<root>/index.json` | [`file`] |
//! | `sqlite` | `<root>/index.sqlite` or `store.path` | [`sqlite`] |
//!
//! Both implement [`VectorStore`] from `lectern-core`, so indexing and search
//! never know which one they are talking to.

pub mod file;
pub mod sqlite;

use std::path::{Path, PathBuf};

use lectern_core::store::VectorStore;
use lectern_core::StoreError;
use tracing::debug;

use crate::config::{Config, StoreBackend};

pub use file::FileStore;
pub use sqlite::SqliteStore;

/// Where the configured backend keeps its data for `root`.
pub fn store_location(config: &Config, root: &Path) -> PathBuf {
    match config.store.backend {
        StoreBackend::File => root.join(file::VECTORS_FILE),
        StoreBackend::Sqlite => config
            .store
            .path
            .clone()
            .unwrap_or_else(|| root.join(sqlite::DEFAULT_DB_FILE)),
    }
}

/// Open (or create empty) the configured store for corpus `root`.
///
/// A store that exists but fails validation is [`StoreError::Corrupt`];
/// it is never silently replaced by an empty one.
pub async fn open_store(config: &Config, root: &Path) -> Result<Box<dyn VectorStore>, StoreError> {
    let location = store_location(config, root);
    debug!(backend = ?config.store.backend, path = %location.display(), "opening store");
    match config.store.backend {
        StoreBackend::File => Ok(Box::new(FileStore::open(root)?)),
        StoreBackend::Sqlite => Ok(Box::new(SqliteStore::open(&location).await?)),
    }
}

/// Run the init command: create an empty, persisted index for `root`.
pub async fn run_init(config: &Config, root: &Path) -> anyhow::Result<()> {
    if !root.is_dir() {
        anyhow::bail!("corpus root {} does not exist", root.display());
    }
    let store = open_store(config, root).await?;
    store.persist().await?;
    println!(
        "Index initialized at {} ({} entries).",
        store_location(config, root).display(),
        store.len().await?
    );
    Ok(())
}
