//! Processed-file tracking.
//!
//! A file counts as indexed when the store already holds at least one chunk
//! whose `(directory, filename)` pair matches it. Tracking is file-level:
//! editing an already-indexed file does not cause it to be re-indexed.

use std::collections::HashSet;

use lectern_core::models::{FileType, MetadataFilter, SourceFile};
use lectern_core::store::VectorStore;
use lectern_core::StoreError;

/// `(directory, filename)` pairs already present for one file type.
pub async fn already_indexed<S: VectorStore + ?Sized>(
    store: &S,
    filetype: FileType,
) -> Result<HashSet<(String, String)>, StoreError> {
    let filter = MetadataFilter::new().with("filetype", filetype.tag());
    let chunks = store.scan(&filter).await?;
    Ok(chunks
        .into_iter()
        .map(|c| (c.metadata.directory, c.metadata.filename))
        .collect())
}

/// Indexed files of every type, read once before a run.
#[derive(Debug, Default)]
pub struct IndexedSnapshot {
    by_type: Vec<(FileType, HashSet<(String, String)>)>,
}

impl IndexedSnapshot {
    pub async fn load<S: VectorStore + ?Sized>(store: &S) -> Result<Self, StoreError> {
        let mut by_type = Vec::with_capacity(FileType::ALL.len());
        for filetype in FileType::ALL {
            by_type.push((filetype, already_indexed(store, filetype).await?));
        }
        Ok(Self { by_type })
    }

    pub fn contains(&self, file: &SourceFile) -> bool {
        self.by_type
            .iter()
            .find(|(t, _)| *t == file.filetype)
            .is_some_and(|(_, set)| {
                set.contains(&(file.directory.clone(), file.filename.clone()))
            })
    }

    /// Number of distinct indexed files across all types.
    pub fn len(&self) -> usize {
        self.by_type.iter().map(|(_, set)| set.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::models::{Chunk, EmbeddingModel};
    use lectern_core::store::memory::InMemoryStore;
    use std::path::PathBuf;

    fn source(dir: &str, name: &str, filetype: FileType) -> SourceFile {
        SourceFile {
            path: PathBuf::from(format!("/corpus/{dir}/{name}")),
            filetype,
            course: dir.split('/').next().unwrap().to_string(),
            directory: dir.to_string(),
            filename: name.to_string(),
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        let model = EmbeddingModel {
            name: "t".to_string(),
            dims: 1,
        };
        let a = source("A/w1", "intro.pptx", FileType::Pptx);
        let b = source("A/w2", "notes.pdf", FileType::Pdf);
        let chunks = vec![
            Chunk::new("one", a.base_metadata()),
            Chunk::new("two", a.base_metadata()),
            Chunk::new("three", b.base_metadata()),
        ];
        store
            .append(&model, &chunks, &[vec![1.0], vec![1.0], vec![1.0]])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn already_indexed_dedups_by_file() {
        let store = seeded().await;
        let pptx = already_indexed(&store, FileType::Pptx).await.unwrap();
        assert_eq!(pptx.len(), 1);
        assert!(pptx.contains(&("A/w1".to_string(), "intro.pptx".to_string())));
        assert!(already_indexed(&store, FileType::Html).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_matches_directory_and_name() {
        let store = seeded().await;
        let snapshot = IndexedSnapshot::load(&store).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&source("A/w1", "intro.pptx", FileType::Pptx)));
        assert!(!snapshot.contains(&source("B/w1", "intro.pptx", FileType::Pptx)));
        assert!(!snapshot.contains(&source("A/w3", "other.html", FileType::Html)));
    }

    #[tokio::test]
    async fn empty_store_has_nothing_indexed() {
        let snapshot = IndexedSnapshot::load(&InMemoryStore::new()).await.unwrap();
        assert!(snapshot.is_empty());
    }
}
