use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Create the chunk table if it does not exist yet.
///
/// Rows are read back in `rowid` order, which is insertion order.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Check that an existing index holds the chunk table, without writing.
///
/// Fails on files that are not SQLite databases or lack the table.
pub async fn verify_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT id, chunk_index, text, metadata_json, embedding, dims FROM chunks LIMIT 0")
        .execute(pool)
        .await
        .context("index has no readable chunk table")?;
    Ok(())
}
