//! Core data models used throughout Lectern.
//!
//! These types describe the source files, extracted content units, chunks,
//! and search hits that flow through the indexing and retrieval pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StoreError;

/// The closed set of document formats Lectern knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    #[serde(rename = ".pptx")]
    Pptx,
    #[serde(rename = ".pdf")]
    Pdf,
    #[serde(rename = ".html")]
    Html,
}

impl FileType {
    /// Stable enumeration order used by every indexing run.
    pub const ALL: [FileType; 3] = [FileType::Pptx, FileType::Pdf, FileType::Html];

    /// The metadata tag for this type, including the leading dot.
    pub fn tag(self) -> &'static str {
        match self {
            FileType::Pptx => ".pptx",
            FileType::Pdf => ".pdf",
            FileType::Html => ".html",
        }
    }

    /// Resolve a file type from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<FileType> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pptx" => Some(FileType::Pptx),
            "pdf" => Some(FileType::Pdf),
            "html" => Some(FileType::Html),
            _ => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A file discovered under a corpus root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    pub filetype: FileType,
    /// Collection (course) name: the first directory under the root.
    pub course: String,
    /// Parent directory relative to the root, `/`-separated.
    pub directory: String,
    pub filename: String,
}

impl SourceFile {
    /// Provenance shared by every chunk produced from this file.
    pub fn base_metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            filename: self.filename.clone(),
            filetype: self.filetype,
            directory: self.directory.clone(),
            course: self.course.clone(),
            slide_number: None,
            page_number: None,
            title: None,
        }
    }
}

/// Position of a content unit within its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// 1-based slide index.
    Slide(u32),
    /// Page number as reported by the PDF page tree.
    Page(u32),
    None,
}

/// One slide, one PDF page, or one whole HTML document.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentUnit {
    pub text: String,
    pub locator: Locator,
    pub title: Option<String>,
}

impl ContentUnit {
    pub fn new(text: impl Into<String>, locator: Locator) -> Self {
        Self {
            text: text.into(),
            locator,
            title: None,
        }
    }
}

/// Provenance attached to every stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    pub filetype: FileType,
    pub directory: String,
    pub course: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ChunkMetadata {
    /// Copy of this metadata with the unit's locator applied.
    pub fn with_locator(mut self, locator: Locator) -> Self {
        match locator {
            Locator::Slide(n) => self.slide_number = Some(n),
            Locator::Page(n) => self.page_number = Some(n),
            Locator::None => {}
        }
        self
    }

    /// Resolve a filter key to the stored field name.
    ///
    /// `course_name` and `collection_name` are accepted for `course`.
    pub fn canonical_key(key: &str) -> Option<&'static str> {
        match key {
            "filename" => Some("filename"),
            "filetype" => Some("filetype"),
            "directory" => Some("directory"),
            "course" | "course_name" | "collection_name" => Some("course"),
            "slide_number" => Some("slide_number"),
            "page_number" => Some("page_number"),
            "title" => Some("title"),
            _ => None,
        }
    }

    /// Look up a metadata field by key (stored name or alias).
    ///
    /// Absent optional fields return `None`, so a filter on them never matches.
    pub fn field(&self, key: &str) -> Option<Value> {
        match Self::canonical_key(key)? {
            "filename" => Some(Value::from(self.filename.as_str())),
            "filetype" => Some(Value::from(self.filetype.tag())),
            "directory" => Some(Value::from(self.directory.as_str())),
            "course" => Some(Value::from(self.course.as_str())),
            "slide_number" => self.slide_number.map(Value::from),
            "page_number" => self.page_number.map(Value::from),
            "title" => self.title.as_deref().map(Value::from),
            _ => None,
        }
    }
}

/// A bounded text fragment with provenance; the unit that gets embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        let text = text.into();
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        Self {
            id: Uuid::new_v4().to_string(),
            text,
            hash,
            metadata,
        }
    }
}

/// Identity of the embedding model an index was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModel {
    pub name: String,
    pub dims: usize,
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dims)", self.name, self.dims)
    }
}

/// Exact-match constraints over chunk metadata. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter(BTreeMap<String, Value>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a constraint.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copy of this filter with every key in its stored form.
    ///
    /// Unknown keys are [`StoreError::InvalidFilterKey`], whatever the backend.
    pub fn normalized(&self) -> Result<Self, StoreError> {
        let mut keys = BTreeMap::new();
        for (key, value) in &self.0 {
            let canonical = ChunkMetadata::canonical_key(key)
                .ok_or_else(|| StoreError::InvalidFilterKey(key.clone()))?;
            keys.insert(canonical.to_string(), value.clone());
        }
        Ok(Self(keys))
    }

    /// True if every constraint equals the corresponding metadata field.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.0
            .iter()
            .all(|(key, want)| metadata.field(key).as_ref() == Some(want))
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity in `[-1.0, 1.0]`; higher is more relevant.
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ChunkMetadata {
        ChunkMetadata {
            filename: "intro.pptx".to_string(),
            filetype: FileType::Pptx,
            directory: "HMG6228/Week 1".to_string(),
            course: "HMG6228".to_string(),
            slide_number: None,
            page_number: None,
            title: None,
        }
    }

    #[test]
    fn filetype_from_path_is_case_insensitive() {
        assert_eq!(FileType::from_path(Path::new("a/b/Deck.PPTX")), Some(FileType::Pptx));
        assert_eq!(FileType::from_path(Path::new("notes.pdf")), Some(FileType::Pdf));
        assert_eq!(FileType::from_path(Path::new("page.html")), Some(FileType::Html));
        assert_eq!(FileType::from_path(Path::new("page.htm")), None);
        assert_eq!(FileType::from_path(Path::new("README")), None);
    }

    #[test]
    fn filetype_serializes_with_dot() {
        let json = serde_json::to_string(&FileType::Pdf).unwrap();
        assert_eq!(json, "\".pdf\"");
        let back: FileType = serde_json::from_str("\".html\"").unwrap();
        assert_eq!(back, FileType::Html);
    }

    #[test]
    fn locator_applies_to_matching_field() {
        let m = meta().with_locator(Locator::Slide(7));
        assert_eq!(m.slide_number, Some(7));
        assert_eq!(m.page_number, None);

        let m = meta().with_locator(Locator::None);
        assert_eq!(m.slide_number, None);
    }

    #[test]
    fn filter_matches_exact_values_only() {
        let m = meta().with_locator(Locator::Slide(2));
        assert!(MetadataFilter::new().matches(&m));
        assert!(MetadataFilter::new().with("course", "HMG6228").matches(&m));
        assert!(MetadataFilter::new()
            .with("course", "HMG6228")
            .with("slide_number", 2)
            .matches(&m));
        assert!(!MetadataFilter::new().with("course", "hmg6228").matches(&m));
        assert!(!MetadataFilter::new().with("slide_number", "2").matches(&m));
    }

    #[test]
    fn filter_on_absent_field_never_matches() {
        let m = meta();
        assert!(!MetadataFilter::new().with("page_number", 1).matches(&m));
        assert!(!MetadataFilter::new().with("author", "x").matches(&m));
    }

    #[test]
    fn collection_aliases_resolve_to_course() {
        let m = meta();
        assert!(MetadataFilter::new().with("course_name", "HMG6228").matches(&m));
        assert!(MetadataFilter::new().with("collection_name", "HMG6228").matches(&m));

        let filter = MetadataFilter::new()
            .with("collection_name", "HMG6228")
            .normalized()
            .unwrap();
        assert_eq!(filter, MetadataFilter::new().with("course", "HMG6228"));
    }

    #[test]
    fn normalizing_rejects_unknown_keys() {
        let err = MetadataFilter::new()
            .with("course-name", "A")
            .normalized()
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilterKey(k) if k == "course-name"));
    }

    #[test]
    fn chunk_hash_is_sha256_of_text() {
        let a = Chunk::new("hello", meta());
        let b = Chunk::new("hello", meta());
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.id, b.id);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn metadata_json_omits_absent_locators() {
        let json = serde_json::to_value(meta().with_locator(Locator::Page(3))).unwrap();
        assert_eq!(json["filetype"], ".pptx");
        assert_eq!(json["page_number"], 3);
        assert!(json.get("slide_number").is_none());
    }
}
