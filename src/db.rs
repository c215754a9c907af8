use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

/// File name of the per-collection index inside its directory.
pub const INDEX_FILE: &str = "index.sqlite";

pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// Open the index database inside `dir`.
///
/// With `create`, the directory and database file are made if missing;
/// without it, a missing file is an error and nothing is written.
///
/// Rollback journaling (not WAL) keeps writes landing on the index file
/// itself, so the directory's modification time tracks ingestion.
pub async fn connect(dir: &Path, create: bool) -> Result<SqlitePool> {
    if create {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;
    }

    let db_path = index_path(dir);
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open index: {}", db_path.display()))?;

    Ok(pool)
}
