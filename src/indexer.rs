//! Indexing pipeline orchestration.
//!
//! Coordinates one incremental run over a corpus root:
//! discovery → skip already-indexed files → extraction + chunking →
//! embedding → a single append → persist.
//!
//! Extraction failures are per file: recorded in the report, logged, and
//! the run continues. An embedding failure aborts the run before anything is
//! written, so the persisted index is never partially updated.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lectern_core::chunk::chunk_unit;
use lectern_core::embedding::{embed_batched, Embedder};
use lectern_core::models::{Chunk, FileType, SourceFile};
use lectern_core::store::ensure_model;
use lectern_core::{EmbedError, StoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ChunkingConfig, Config};
use crate::corpus::{self, CorpusError};
use crate::embedding::create_embedder;
use crate::extract::{extract_file, ExtractError};
use crate::store::open_store;
use crate::tracker::IndexedSnapshot;

pub const LOCK_FILE: &str = ".lectern.lock";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("corpus root {} does not exist or is not a directory", .0.display())]
    RootMissing(PathBuf),
    #[error("another indexing run holds {} (delete it if no run is active)", .0.display())]
    Locked(PathBuf),
    #[error("failed to create lock file {}", path.display())]
    LockIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("embedding failed, index left unchanged: {0}")]
    Embedding(#[from] EmbedError),
    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A file that could not be extracted.
#[derive(Debug, Clone)]
pub struct ExtractionFailure {
    pub path: PathBuf,
    pub filetype: FileType,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeCounts {
    pub files: usize,
    pub chunks: usize,
}

/// Outcome of one [`index_root`] run.
#[derive(Debug, Default)]
pub struct IndexReport {
    /// Chunks appended by this run.
    pub added: usize,
    pub files_indexed: usize,
    /// Files skipped because the index already holds them.
    pub files_skipped: usize,
    pub failures: Vec<ExtractionFailure>,
    /// Newly indexed files and chunks per type.
    pub per_type: BTreeMap<FileType, TypeCounts>,
}

/// Exclusive writer lock on a corpus root, released on drop.
#[derive(Debug)]
pub struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    pub fn acquire(root: &Path) -> Result<Self, IndexError> {
        let path = root.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Best effort, the file's existence is the lock.
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(IndexError::Locked(path)),
            Err(source) => Err(IndexError::LockIo { path, source }),
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}

/// Bring the index for `root` up to date with the files under it.
pub async fn index_root(
    config: &Config,
    embedder: &dyn Embedder,
    root: &Path,
) -> Result<IndexReport, IndexError> {
    let root = match fs::canonicalize(root) {
        Ok(p) if p.is_dir() => p,
        _ => return Err(IndexError::RootMissing(root.to_path_buf())),
    };
    let _lock = IndexLock::acquire(&root)?;

    let store = open_store(config, &root).await?;
    let model = embedder.model();
    ensure_model(&*store, &model).await?;

    let snapshot = IndexedSnapshot::load(&*store).await?;
    let discovered = corpus::discover(&root, &config.indexing)?;

    let mut report = IndexReport::default();
    let mut pending = Vec::new();
    for filetype in FileType::ALL {
        for file in discovered.iter().filter(|f| f.filetype == filetype) {
            if snapshot.contains(file) {
                debug!(path = %file.path.display(), "already indexed");
                report.files_skipped += 1;
            } else {
                pending.push(file.clone());
            }
        }
    }
    info!(
        discovered = discovered.len(),
        pending = pending.len(),
        skipped = report.files_skipped,
        "starting index run"
    );

    let extracted = extract_all(config, pending).await?;

    let mut chunks: Vec<Chunk> = Vec::new();
    for (file, result) in extracted {
        match result {
            Ok(file_chunks) if file_chunks.is_empty() => {
                debug!(path = %file.path.display(), "no text extracted");
            }
            Ok(file_chunks) => {
                let counts = report.per_type.entry(file.filetype).or_default();
                counts.files += 1;
                counts.chunks += file_chunks.len();
                report.files_indexed += 1;
                chunks.extend(file_chunks);
            }
            Err(e) => {
                warn!(path = %file.path.display(), filetype = %file.filetype, error = %e, "extraction failed");
                report.failures.push(ExtractionFailure {
                    path: file.path,
                    filetype: file.filetype,
                    reason: e.to_string(),
                });
            }
        }
    }

    if !chunks.is_empty() {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_batched(embedder, &texts, config.embedding.batch_size).await?;
        store.append(&model, &chunks, &vectors).await?;
        report.added = chunks.len();
    }

    store.persist().await?;

    info!(
        added = report.added,
        files = report.files_indexed,
        failures = report.failures.len(),
        "index run complete"
    );
    Ok(report)
}

/// Run the index command: index `root` with the configured embedder and print a summary.
pub async fn run_index(config: &Config, root: &Path) -> anyhow::Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let report = index_root(config, embedder.as_ref(), root).await?;

    println!("index {}", root.display());
    println!("  indexed chunks: {}", report.added);
    println!("  files indexed: {}", report.files_indexed);
    println!("  files skipped (already indexed): {}", report.files_skipped);
    for (filetype, counts) in &report.per_type {
        println!(
            "  {}: {} files, {} chunks",
            filetype, counts.files, counts.chunks
        );
    }
    println!("  extraction failures: {}", report.failures.len());
    for failure in &report.failures {
        println!(
            "    {} {}: {}",
            failure.filetype,
            failure.path.display(),
            failure.reason
        );
    }
    println!("ok");
    Ok(())
}

/// Extract and chunk `files`, at most `workers` at a time, preserving order.
async fn extract_all(
    config: &Config,
    files: Vec<SourceFile>,
) -> Result<Vec<(SourceFile, Result<Vec<Chunk>, ExtractError>)>, IndexError> {
    let chunking = config.chunking.clone();
    let max_bytes = config.indexing.max_file_bytes;
    extract_windowed(files, config.indexing.workers, move |file: &SourceFile| {
        extract_and_chunk(file, &chunking, max_bytes)
    })
    .await
}

/// Run `extract` over `files` on the blocking pool in windows of `workers`.
///
/// A panic inside `extract` is reported as [`ExtractError::Panicked`] for
/// that file only.
async fn extract_windowed<F>(
    files: Vec<SourceFile>,
    workers: usize,
    extract: F,
) -> Result<Vec<(SourceFile, Result<Vec<Chunk>, ExtractError>)>, IndexError>
where
    F: Fn(&SourceFile) -> Result<Vec<Chunk>, ExtractError> + Send + Sync + 'static,
{
    let extract = Arc::new(extract);
    let mut out = Vec::with_capacity(files.len());
    for window in files.chunks(workers.max(1)) {
        let handles: Vec<_> = window
            .iter()
            .cloned()
            .map(|file| {
                let extract = Arc::clone(&extract);
                tokio::task::spawn_blocking(move || {
                    let result = extract(&file);
                    (file, result)
                })
            })
            .collect();
        for (file, handle) in window.iter().zip(handles) {
            match handle.await {
                Ok(pair) => out.push(pair),
                Err(err) if err.is_panic() => {
                    let reason = panic_reason(err.into_panic());
                    warn!(path = %file.path.display(), %reason, "extractor panicked");
                    out.push((file.clone(), Err(ExtractError::Panicked(reason))));
                }
                Err(err) => return Err(IndexError::Join(err)),
            }
        }
    }
    Ok(out)
}

fn panic_reason(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn extract_and_chunk(
    file: &SourceFile,
    chunking: &ChunkingConfig,
    max_bytes: u64,
) -> Result<Vec<Chunk>, ExtractError> {
    let units = extract_file(file.filetype, &file.path, max_bytes)?;
    let base = file.base_metadata();
    let preset = chunking.preset_for(file.filetype);
    let chunks: Vec<Chunk> = units
        .iter()
        .flat_map(|unit| chunk_unit(unit, &base, preset))
        .collect();
    debug!(path = %file.path.display(), units = units.len(), chunks = chunks.len(), "extracted");
    Ok(chunks)
}
