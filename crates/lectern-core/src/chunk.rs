//! Whitespace-boundary text chunker.
//!
//! Splits a [`ContentUnit`]'s text into [`Chunk`]s of at most `chunk_size`
//! characters. Splitting happens only at runs of whitespace, so words are
//! never cut in half.
//!
//! # Algorithm
//!
//! 1. Split the text before every whitespace run (regex `\s+`). Each piece
//!    after the first keeps the whitespace that preceded it.
//! 2. Greedily append pieces to a window while its length stays within
//!    `chunk_size`.
//! 3. When the next piece does not fit, emit the window and drop pieces from
//!    its front until at most `chunk_overlap` characters remain and the next
//!    piece fits.
//! 4. A single piece of `chunk_size` characters or more is emitted on its
//!    own and resets the window.
//! 5. Emitted chunks are trimmed; empty ones are dropped.
//!
//! Lengths are counted in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use lectern_core::chunk::{split_text, ChunkingPreset};
//!
//! let chunks = split_text("alpha beta gamma delta", &ChunkingPreset::new(12, 0));
//! assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
//! ```

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::models::{Chunk, ChunkMetadata, ContentUnit};

static SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Window size and overlap, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChunkingPreset {
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_overlap: usize,
}

impl ChunkingPreset {
    pub const fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Returns a description of the problem if the preset is unusable.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            ));
        }
        Ok(())
    }
}

/// Split `text` before each whitespace run, keeping the separator attached
/// to the following piece.
fn split_keep_separator(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for m in SEPARATOR.find_iter(text) {
        if m.start() > start {
            pieces.push(&text[start..m.start()]);
        }
        start = m.start();
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn flush(window: &VecDeque<(&str, usize)>, out: &mut Vec<String>) {
    if window.is_empty() {
        return;
    }
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    push_trimmed(out, &joined);
}

fn push_trimmed(out: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Split text into trimmed windows according to `preset`.
pub fn split_text(text: &str, preset: &ChunkingPreset) -> Vec<String> {
    let size = preset.chunk_size.max(1);
    let overlap = preset.chunk_overlap;

    let mut chunks = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for piece in split_keep_separator(text) {
        let len = piece.chars().count();

        if len >= size {
            flush(&window, &mut chunks);
            window.clear();
            total = 0;
            push_trimmed(&mut chunks, piece);
            continue;
        }

        if total + len > size && !window.is_empty() {
            flush(&window, &mut chunks);
            while total > overlap || (total + len > size && total > 0) {
                match window.pop_front() {
                    Some((_, dropped)) => total -= dropped,
                    None => break,
                }
            }
        }

        window.push_back((piece, len));
        total += len;
    }
    flush(&window, &mut chunks);

    chunks
}

/// Chunk one content unit. Every chunk carries `base` with the unit's
/// locator (and title, if any) applied.
pub fn chunk_unit(unit: &ContentUnit, base: &ChunkMetadata, preset: &ChunkingPreset) -> Vec<Chunk> {
    let mut metadata = base.clone().with_locator(unit.locator);
    if unit.title.is_some() {
        metadata.title = unit.title.clone();
    }

    split_text(&unit.text, preset)
        .into_iter()
        .map(|text| Chunk::new(text, metadata.clone()))
        .collect()
}
