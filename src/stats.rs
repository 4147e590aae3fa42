//! Index statistics.
//!
//! Provides a quick summary of what's indexed: backend and location, the
//! embedding model, and chunk counts per course and per file type. Used by
//! `lectern stats` to confirm that runs are picking up the expected files.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Result};
use lectern_core::models::{FileType, MetadataFilter};
use lectern_core::store::VectorStore;

use crate::config::Config;
use crate::store::{open_store, store_location};

/// Chunk and file counts for one group.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub chunks: usize,
    pub files: usize,
}

#[derive(Debug, Default)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub by_course: BTreeMap<String, GroupStats>,
    pub by_filetype: BTreeMap<FileType, GroupStats>,
}

/// Collect per-course and per-filetype counts from the store.
pub async fn collect_stats(store: &dyn VectorStore) -> Result<IndexStats> {
    let chunks = store.scan(&MetadataFilter::new()).await?;

    let mut stats = IndexStats {
        total_chunks: chunks.len(),
        ..IndexStats::default()
    };
    let mut course_files: BTreeMap<String, BTreeSet<(String, String)>> = BTreeMap::new();
    let mut type_files: BTreeMap<FileType, BTreeSet<(String, String)>> = BTreeMap::new();

    for chunk in chunks {
        let meta = chunk.metadata;
        let file = (meta.directory.clone(), meta.filename.clone());
        stats.by_course.entry(meta.course.clone()).or_default().chunks += 1;
        stats.by_filetype.entry(meta.filetype).or_default().chunks += 1;
        course_files.entry(meta.course).or_default().insert(file.clone());
        type_files.entry(meta.filetype).or_default().insert(file);
    }
    for (course, files) in course_files {
        if let Some(s) = stats.by_course.get_mut(&course) {
            s.files = files.len();
        }
    }
    for (filetype, files) in type_files {
        if let Some(s) = stats.by_filetype.get_mut(&filetype) {
            s.files = files.len();
        }
    }

    Ok(stats)
}

/// Run the stats command: read the index and print a summary.
pub async fn run_stats(config: &Config, root: &Path) -> Result<()> {
    if !root.is_dir() {
        bail!("corpus root {} does not exist", root.display());
    }
    let location = store_location(config, root);
    let store = open_store(config, root).await?;
    let model = store.embedding_model().await?;
    let stats = collect_stats(&*store).await?;

    let size = std::fs::metadata(&location).map(|m| m.len()).unwrap_or(0);

    println!("Lectern Index Stats");
    println!("===================");
    println!();
    println!("  Backend:     {}", config.store.backend.as_str());
    println!("  Location:    {}", location.display());
    println!("  Size:        {}", format_bytes(size));
    match &model {
        Some(m) => {
            println!("  Model:       {}", m.name);
            println!("  Dims:        {}", m.dims);
        }
        None => println!("  Model:       (none, index is empty)"),
    }
    println!("  Chunks:      {}", stats.total_chunks);

    if !stats.by_course.is_empty() {
        println!();
        println!("  By course:");
        println!("  {:<32} {:>6} {:>8}", "COURSE", "FILES", "CHUNKS");
        println!("  {}", "-".repeat(48));
        for (course, s) in &stats.by_course {
            println!("  {:<32} {:>6} {:>8}", course, s.files, s.chunks);
        }
    }

    if !stats.by_filetype.is_empty() {
        println!();
        println!("  By file type:");
        println!("  {:<32} {:>6} {:>8}", "TYPE", "FILES", "CHUNKS");
        println!("  {}", "-".repeat(48));
        for (filetype, s) in &stats.by_filetype {
            println!("  {:<32} {:>6} {:>8}", filetype.tag(), s.files, s.chunks);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
