//! SQLite-backed [`VectorStore`].
//!
//! Chunks live in one `chunks` table with their metadata as JSON and the
//! embedding as a little-endian `f32` BLOB. Metadata filters run in SQL via
//! `json_extract`; ranking is brute-force cosine over the filtered rows.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lectern_core::embedding::{blob_to_vec, vec_to_blob};
use lectern_core::models::{Chunk, ChunkMetadata, EmbeddingModel, MetadataFilter, SearchHit};
use lectern_core::search::top_k;
use lectern_core::store::{validate_append, VectorStore};
use lectern_core::StoreError;
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row};
use tracing::debug;

use crate::{db, migrate};

pub const DEFAULT_DB_FILE: &str = "index.sqlite";

/// SQLite index opened from a database file.
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    /// Connect to (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let existed = path.exists();
        let classify = |e: sqlx::Error| {
            if existed {
                StoreError::corrupt(path, e.to_string())
            } else {
                StoreError::backend(e)
            }
        };

        let pool = db::connect(path).await.map_err(classify)?;
        migrate::run_migrations(&pool).await.map_err(classify)?;

        let store = Self {
            pool,
            path: path.to_path_buf(),
        };
        // Validate recorded model eagerly so corruption surfaces on open.
        store.embedding_model().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl Into<String>) -> StoreError {
        StoreError::corrupt(&self.path, reason)
    }

    fn push_filter(
        &self,
        builder: &mut QueryBuilder<'_, Sqlite>,
        filter: &MetadataFilter,
    ) -> Result<(), StoreError> {
        // Normalized keys are fixed field names, safe to splice into the path.
        let filter = filter.normalized()?;
        let mut first = true;
        for (key, value) in filter.iter() {
            builder.push(if first { " WHERE " } else { " AND " });
            first = false;

            let column = format!("json_extract(metadata_json, '$.{}') = ", key);
            match value {
                Value::String(s) => {
                    builder.push(column).push_bind(s.clone());
                }
                Value::Bool(b) => {
                    builder.push(column).push_bind(i64::from(*b));
                }
                Value::Number(n) => {
                    builder.push(column);
                    if let Some(i) = n.as_i64() {
                        builder.push_bind(i);
                    } else {
                        builder.push_bind(n.as_f64().unwrap_or(f64::NAN));
                    }
                }
                // Null and composite values never equal a metadata field.
                _ => {
                    builder.push("0");
                }
            }
        }
        Ok(())
    }

    fn decode_chunk(&self, row: &SqliteRow) -> Result<Chunk, StoreError> {
        let metadata_json: String = row.try_get("metadata_json").map_err(StoreError::backend)?;
        let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
            .map_err(|e| self.corrupt(format!("bad metadata_json: {}", e)))?;
        if metadata.filename.is_empty() {
            return Err(self.corrupt("row without filename"));
        }
        Ok(Chunk {
            id: row.try_get("id").map_err(StoreError::backend)?,
            text: row.try_get("text").map_err(StoreError::backend)?,
            hash: row.try_get("hash").map_err(StoreError::backend)?,
            metadata,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn embedding_model(&self) -> Result<Option<EmbeddingModel>, StoreError> {
        let rows = sqlx::query("SELECT key, value FROM index_meta WHERE key IN ('model', 'dims')")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        let mut name = None;
        let mut dims = None;
        for row in rows {
            let key: String = row.try_get("key").map_err(StoreError::backend)?;
            let value: String = row.try_get("value").map_err(StoreError::backend)?;
            match key.as_str() {
                "model" => name = Some(value),
                _ => {
                    dims = Some(
                        value
                            .parse::<usize>()
                            .map_err(|_| self.corrupt(format!("bad dims {:?}", value)))?,
                    )
                }
            }
        }

        match (name, dims) {
            (Some(name), Some(dims)) => Ok(Some(EmbeddingModel { name, dims })),
            (None, None) => Ok(None),
            _ => Err(self.corrupt("incomplete model record")),
        }
    }

    async fn append(
        &self,
        model: &EmbeddingModel,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        validate_append(model, chunks, vectors)?;
        if let Some(stored) = self.embedding_model().await? {
            if &stored != model {
                return Err(StoreError::ModelMismatch {
                    stored,
                    requested: model.clone(),
                });
            }
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        for (key, value) in [("model", model.name.clone()), ("dims", model.dims.to_string())] {
            sqlx::query("INSERT OR IGNORE INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::backend)?;
        }

        for (chunk, vector) in chunks.iter().zip(vectors) {
            let metadata_json = serde_json::to_string(&chunk.metadata).map_err(StoreError::backend)?;
            sqlx::query(
                "INSERT INTO chunks (id, text, hash, filename, filetype, directory, course, metadata_json, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(&chunk.metadata.filename)
            .bind(chunk.metadata.filetype.tag())
            .bind(&chunk.metadata.directory)
            .bind(&chunk.metadata.course)
            .bind(metadata_json)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        }

        tx.commit().await.map_err(StoreError::backend)?;
        debug!(added = chunks.len(), "appended to sqlite index");
        Ok(())
    }

    async fn vector_search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let dims = match self.embedding_model().await? {
            Some(model) => model.dims,
            None => return Ok(Vec::new()),
        };

        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT id, text, hash, metadata_json, embedding FROM chunks");
        self.push_filter(&mut builder, filter)?;
        builder.push(" ORDER BY seq");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = self.decode_chunk(row)?;
            let blob: Vec<u8> = row.try_get("embedding").map_err(StoreError::backend)?;
            if blob.len() != dims * 4 {
                return Err(self.corrupt(format!(
                    "embedding for chunk {} has {} bytes, expected {}",
                    chunk.id,
                    blob.len(),
                    dims * 4
                )));
            }
            candidates.push((chunk, blob_to_vec(&blob)));
        }

        Ok(top_k(
            query,
            candidates.iter().map(|(c, v)| (c, v.as_slice())),
            k,
        ))
    }

    async fn scan(&self, filter: &MetadataFilter) -> Result<Vec<Chunk>, StoreError> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT id, text, hash, metadata_json FROM chunks");
        self.push_filter(&mut builder, filter)?;
        builder.push(" ORDER BY seq");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        rows.iter().map(|row| self.decode_chunk(row)).collect()
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(count as usize)
    }

    async fn persist(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }
}
