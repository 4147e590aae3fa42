//! Single-directory file index.
//!
//! Two files live next to the corpus:
//!
//! ```text
//! index.vec   "LECTVEC1" | dims: u32 LE | count: u64 LE | count * dims f32 LE
//! index.json  { format_version, model, dims, created_at, updated_at, entries: [Chunk] }
//! ```
//!
//! Entry `i` in `index.json` owns vector `i` in `index.vec`. The whole index
//! is loaded into an [`InMemoryStore`] on open and rewritten on persist via
//! temporary files renamed into place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lectern_core::models::{Chunk, EmbeddingModel, MetadataFilter, SearchHit};
use lectern_core::store::memory::InMemoryStore;
use lectern_core::store::{StoredEntry, VectorStore};
use lectern_core::StoreError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const VECTORS_FILE: &str = "index.vec";
pub const MANIFEST_FILE: &str = "index.json";

const MAGIC: &[u8; 8] = b"LECTVEC1";
const HEADER_LEN: usize = 8 + 4 + 8;
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    model: Option<String>,
    dims: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    entries: Vec<Chunk>,
}

/// File-backed [`VectorStore`].
pub struct FileStore {
    vectors_path: PathBuf,
    manifest_path: PathBuf,
    created_at: DateTime<Utc>,
    inner: InMemoryStore,
}

impl FileStore {
    /// Load the index in `dir`, or start an empty one if neither file exists.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let vectors_path = dir.join(VECTORS_FILE);
        let manifest_path = dir.join(MANIFEST_FILE);

        match (vectors_path.exists(), manifest_path.exists()) {
            (false, false) => {
                debug!(dir = %dir.display(), "no index found, starting empty");
                Ok(Self {
                    vectors_path,
                    manifest_path,
                    created_at: Utc::now(),
                    inner: InMemoryStore::new(),
                })
            }
            (true, false) => Err(StoreError::corrupt(
                &manifest_path,
                format!("missing while {} exists", VECTORS_FILE),
            )),
            (false, true) => Err(StoreError::corrupt(
                &vectors_path,
                format!("missing while {} exists", MANIFEST_FILE),
            )),
            (true, true) => Self::load(vectors_path, manifest_path),
        }
    }

    fn load(vectors_path: PathBuf, manifest_path: PathBuf) -> Result<Self, StoreError> {
        let raw = fs::read(&vectors_path).map_err(|e| StoreError::io(&vectors_path, e))?;
        let (dims, vectors) = decode_vectors(&raw).map_err(|r| StoreError::corrupt(&vectors_path, r))?;

        let text = fs::read_to_string(&manifest_path).map_err(|e| StoreError::io(&manifest_path, e))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .map_err(|e| StoreError::corrupt(&manifest_path, e.to_string()))?;

        let corrupt = |reason: String| StoreError::corrupt(&manifest_path, reason);

        if manifest.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format_version {}",
                manifest.format_version
            )));
        }
        if manifest.dims != dims {
            return Err(corrupt(format!(
                "dims {} disagree with {} ({})",
                manifest.dims, VECTORS_FILE, dims
            )));
        }
        if manifest.entries.len() != vectors.len() {
            return Err(corrupt(format!(
                "{} entries but {} vectors",
                manifest.entries.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = manifest.entries.iter().position(|c| c.metadata.filename.is_empty()) {
            return Err(corrupt(format!("entry {} has no filename", bad)));
        }

        let model = match manifest.model {
            Some(name) => Some(EmbeddingModel { name, dims }),
            None if manifest.entries.is_empty() => None,
            None => return Err(corrupt("entries present but no model recorded".to_string())),
        };

        let entries: Vec<StoredEntry> = manifest
            .entries
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| StoredEntry { chunk, vector })
            .collect();
        debug!(entries = entries.len(), dims, "loaded file index");

        Ok(Self {
            vectors_path,
            manifest_path,
            created_at: manifest.created_at,
            inner: InMemoryStore::from_parts(model, entries),
        })
    }
}

fn decode_vectors(raw: &[u8]) -> Result<(usize, Vec<Vec<f32>>), String> {
    if raw.len() < HEADER_LEN {
        return Err(format!("file is {} bytes, shorter than the header", raw.len()));
    }
    if &raw[..8] != MAGIC {
        return Err("bad magic".to_string());
    }
    let dims = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&raw[12..20]);
    let count = u64::from_le_bytes(count_bytes);

    let expected = usize::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(dims))
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| format!("header claims {} vectors of {} dims", count, dims))?;
    if raw.len() != expected {
        return Err(format!(
            "expected {} bytes for {} vectors of {} dims, found {}",
            expected,
            count,
            dims,
            raw.len()
        ));
    }
    if dims == 0 && count > 0 {
        return Err("zero-dimensional vectors".to_string());
    }

    let vectors = if dims == 0 {
        Vec::new()
    } else {
        raw[HEADER_LEN..]
            .chunks_exact(dims * 4)
            .map(|v| {
                v.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect()
            })
            .collect()
    };
    Ok((dims, vectors))
}

fn encode_vectors(dims: usize, entries: &[StoredEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + entries.len() * dims * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(dims as u32).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for entry in entries {
        for x in &entry.vector {
            out.extend_from_slice(&x.to_le_bytes());
        }
    }
    out
}

/// Write `bytes` to `<path>.tmp` and fsync it; returns the temporary path.
fn write_tmp(path: &Path, bytes: &[u8]) -> Result<PathBuf, StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(bytes).map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    Ok(tmp)
}

#[async_trait]
impl VectorStore for FileStore {
    async fn embedding_model(&self) -> Result<Option<EmbeddingModel>, StoreError> {
        self.inner.embedding_model().await
    }

    async fn append(
        &self,
        model: &EmbeddingModel,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        self.inner.append(model, chunks, vectors).await
    }

    async fn vector_search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.inner.vector_search(query, k, filter).await
    }

    async fn scan(&self, filter: &MetadataFilter) -> Result<Vec<Chunk>, StoreError> {
        self.inner.scan(filter).await
    }

    async fn len(&self) -> Result<usize, StoreError> {
        self.inner.len().await
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let (model, entries) = self.inner.snapshot()?;
        let dims = model.as_ref().map_or(0, |m| m.dims);

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            model: model.map(|m| m.name),
            dims,
            created_at: self.created_at,
            updated_at: Utc::now(),
            entries: entries.iter().map(|e| e.chunk.clone()).collect(),
        };
        let json = serde_json::to_vec_pretty(&manifest).map_err(StoreError::backend)?;
        let vectors = encode_vectors(dims, &entries);

        let vectors_tmp = write_tmp(&self.vectors_path, &vectors)?;
        let manifest_tmp = write_tmp(&self.manifest_path, &json)?;
        fs::rename(&vectors_tmp, &self.vectors_path)
            .map_err(|e| StoreError::io(&self.vectors_path, e))?;
        fs::rename(&manifest_tmp, &self.manifest_path)
            .map_err(|e| StoreError::io(&self.manifest_path, e))?;

        info!(entries = entries.len(), path = %self.vectors_path.display(), "index saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::models::{ChunkMetadata, FileType};
    use tempfile::TempDir;

    fn model() -> EmbeddingModel {
        EmbeddingModel {
            name: "m".to_string(),
            dims: 2,
        }
    }

    fn chunk(text: &str) -> Chunk {
        Chunk::new(
            text,
            ChunkMetadata {
                filename: "deck.pptx".to_string(),
                filetype: FileType::Pptx,
                directory: "C1/w1".to_string(),
                course: "C1".to_string(),
                slide_number: Some(1),
                page_number: None,
                title: None,
            },
        )
    }

    #[tokio::test]
    async fn empty_dir_opens_empty_and_persists() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        assert!(store.is_empty().await.unwrap());
        store.persist().await.unwrap();

        assert!(tmp.path().join(VECTORS_FILE).exists());
        assert!(tmp.path().join(MANIFEST_FILE).exists());
        let reopened = FileStore::open(tmp.path()).unwrap();
        assert!(reopened.is_empty().await.unwrap());
        assert_eq!(reopened.embedding_model().await.unwrap(), None);
    }

    #[tokio::test]
    async fn persist_and_reopen_preserves_entries() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        let chunks = vec![chunk("a"), chunk("b")];
        store
            .append(&model(), &chunks, &[vec![1.0, 0.0], vec![0.25, -0.5]])
            .await
            .unwrap();
        store.persist().await.unwrap();

        let reopened = FileStore::open(tmp.path()).unwrap();
        assert_eq!(reopened.embedding_model().await.unwrap(), Some(model()));
        let (_, entries) = reopened.inner.snapshot().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].chunk, chunks[0]);
        assert_eq!(entries[1].vector, vec![0.25, -0.5]);
        assert!(!tmp.path().join("index.vec.tmp").exists());
    }

    #[tokio::test]
    async fn truncated_vectors_are_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        store
            .append(&model(), &[chunk("a")], &[vec![1.0, 0.0]])
            .await
            .unwrap();
        store.persist().await.unwrap();

        let path = tmp.path().join(VECTORS_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        match FileStore::open(tmp.path()) {
            Err(StoreError::Corrupt { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected corrupt, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn lone_manifest_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(MANIFEST_FILE), "{}").unwrap();
        assert!(matches!(
            FileStore::open(tmp.path()),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn garbage_manifest_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(VECTORS_FILE), encode_vectors(0, &[])).unwrap();
        fs::write(tmp.path().join(MANIFEST_FILE), "not json").unwrap();
        assert!(matches!(
            FileStore::open(tmp.path()),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut raw = encode_vectors(0, &[]);
        raw[0] = b'X';
        assert_eq!(decode_vectors(&raw).unwrap_err(), "bad magic");
    }
}
