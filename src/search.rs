//! `lectern search`: filtered semantic search from the command line.
//!
//! Delegates to [`lectern_core::search::search`] against the configured
//! store and embedder, then prints ranked hits or JSON.

use std::path::Path;

use anyhow::{bail, Result};
use lectern_core::models::{ChunkMetadata, MetadataFilter, SearchHit};
use serde_json::Value;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::store::open_store;

const SNIPPET_CHARS: usize = 240;
const NUMERIC_KEYS: &[&str] = &["slide_number", "page_number"];

/// Build a [`MetadataFilter`] from `key=value` pairs.
///
/// Slide and page numbers are compared as integers; everything else as text.
pub fn parse_filters(pairs: &[(String, String)]) -> Result<MetadataFilter> {
    let mut filter = MetadataFilter::new();
    for (key, value) in pairs {
        if NUMERIC_KEYS.contains(&key.as_str()) {
            let n: u32 = value
                .parse()
                .map_err(|_| anyhow::anyhow!("filter {} expects a number, got '{}'", key, value))?;
            filter.insert(key.clone(), Value::from(n));
        } else {
            filter.insert(key.clone(), value.clone());
        }
    }
    Ok(filter)
}

pub async fn run_search(
    config: &Config,
    root: &Path,
    query: &str,
    k: usize,
    filters: &[(String, String)],
    json: bool,
) -> Result<()> {
    if !root.is_dir() {
        bail!("corpus root {} does not exist", root.display());
    }
    let filter = parse_filters(filters)?;
    let store = open_store(config, root).await?;
    let embedder = create_embedder(&config.embedding)?;

    let hits = lectern_core::search::search(&*store, &*embedder, query, k, &filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No relevant documents found.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        print_hit(i + 1, hit);
    }
    Ok(())
}

fn print_hit(rank: usize, hit: &SearchHit) {
    println!(
        "{}. [{:.3}] {}{}",
        rank,
        hit.score,
        hit.metadata.filename,
        locator(&hit.metadata)
    );
    println!("    course: {}", hit.metadata.course);
    println!("    directory: {}", hit.metadata.directory);
    if let Some(title) = &hit.metadata.title {
        println!("    title: {}", title);
    }
    println!("    excerpt: \"{}\"", snippet(&hit.text));
    println!();
}

fn locator(meta: &ChunkMetadata) -> String {
    match (meta.slide_number, meta.page_number) {
        (Some(n), _) => format!(" (slide {})", n),
        (None, Some(n)) => format!(" (page {})", n),
        (None, None) => String::new(),
    }
}

fn snippet(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::models::FileType;

    #[test]
    fn numeric_filters_become_numbers() {
        let filter = parse_filters(&[
            ("course".to_string(), "HMG6228".to_string()),
            ("slide_number".to_string(), "2".to_string()),
        ])
        .unwrap();
        let meta = ChunkMetadata {
            filename: "a.pptx".to_string(),
            filetype: FileType::Pptx,
            directory: "HMG6228".to_string(),
            course: "HMG6228".to_string(),
            slide_number: Some(2),
            page_number: None,
            title: None,
        };
        assert!(filter.matches(&meta));
    }

    #[test]
    fn bad_numeric_filter_is_rejected() {
        assert!(parse_filters(&[("page_number".to_string(), "two".to_string())]).is_err());
    }

    #[test]
    fn long_snippets_are_cut() {
        let text = "word ".repeat(200);
        let s = snippet(&text);
        assert!(s.ends_with("..."));
        assert!(s.chars().count() <= SNIPPET_CHARS + 3);
    }
}
