use sqlx::SqlitePool;

/// Create the index schema if it does not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Chunks, in insertion order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            filename TEXT NOT NULL,
            filetype TEXT NOT NULL,
            directory TEXT NOT NULL,
            course TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Model identity and bookkeeping
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(filetype, directory, filename)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_course ON chunks(course)")
        .execute(pool)
        .await?;

    // Fails on a pre-existing table with a foreign layout
    sqlx::query(
        "SELECT seq, id, text, hash, filename, filetype, directory, course, metadata_json, embedding \
         FROM chunks LIMIT 0",
    )
    .execute(pool)
    .await?;

    Ok(())
}
