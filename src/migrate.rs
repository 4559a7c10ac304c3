use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per chunk; embedding is a little-endian f32 BLOB
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            project TEXT NOT NULL,
            file_name TEXT NOT NULL,
            text TEXT NOT NULL,
            page INTEGER NOT NULL DEFAULT 1,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            scanned INTEGER NOT NULL DEFAULT 0,
            scanned_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Keyword annotations, one row per (chunk, keyword)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_keywords (
            chunk_id TEXT NOT NULL,
            keyword TEXT NOT NULL,
            score REAL NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (chunk_id, keyword),
            FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_project_scanned ON chunks(project, scanned)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_project_file ON chunks(project, file_name)")
        .execute(pool)
        .await?;

    Ok(())
}
