//! SQLite-backed [`ChunkStore`] implementation.
//!
//! Chunks live in `chunks` (embedding stored as a little-endian f32 BLOB);
//! keyword annotations live in `chunk_keywords`, keyed by
//! `(chunk_id, keyword)` so a repeated keyword replaces its score. Every
//! mutating operation runs in its own transaction. Insertion order is the
//! implicit `rowid`.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use chunkscan_core::embedding::{blob_to_vec, vec_to_blob};
use chunkscan_core::error::ScanError;
use chunkscan_core::models::{
    ChunkDetail, EmbeddingRow, FileReport, KeywordMatch, NewChunk, ProjectStatus, StoredChunk,
};
use chunkscan_core::store::{merge_detail_matches, merge_report_matches, ChunkStore, IdPolicy};

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`ChunkStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    policy: IdPolicy,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, policy: IdPolicy) -> Self {
        Self { pool, policy }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool, config.ingest.id_policy()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Decode a stored score, dropping values that cannot be a cosine.
fn decode_match(chunk_id: &str, keyword: String, score: f64) -> Option<KeywordMatch> {
    let score = score as f32;
    if score.is_finite() {
        Some(KeywordMatch { keyword, score })
    } else {
        tracing::warn!(chunk_id, keyword = %keyword, "skipping non-finite stored score");
        None
    }
}

async fn matches_for(pool: &SqlitePool, chunk_id: &str) -> Result<Vec<KeywordMatch>> {
    let rows = sqlx::query(
        "SELECT keyword, score FROM chunk_keywords WHERE chunk_id = ? ORDER BY keyword ASC",
    )
    .bind(chunk_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| decode_match(chunk_id, row.get("keyword"), row.get("score")))
        .collect())
}

fn row_to_chunk(row: &SqliteRow) -> Result<StoredChunk> {
    let id: String = row.get("id");
    let blob: Vec<u8> = row.get("embedding");
    let embedding = blob_to_vec(&blob)
        .ok_or_else(|| anyhow::anyhow!("chunk {} has a malformed embedding BLOB", id))?;
    let page: i64 = row.get("page");
    let scanned: i64 = row.get("scanned");

    Ok(StoredChunk {
        id,
        project: row.get("project"),
        file_name: row.get("file_name"),
        text: row.get("text"),
        page: u32::try_from(page).unwrap_or(1),
        embedding,
        created_at: row.get("created_at"),
        scanned: scanned != 0,
        scanned_at: row.get("scanned_at"),
        matches: Vec::new(),
    })
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn insert(&self, project: &str, chunks: &[NewChunk]) -> Result<Vec<String>> {
        let now = now_ts();
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let id = self.policy.assign(project, chunk);
            sqlx::query(
                r#"
                INSERT INTO chunks (id, project, file_name, text, page, embedding, dims,
                                    created_at, scanned, scanned_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, NULL)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&id)
            .bind(project)
            .bind(&chunk.file_name)
            .bind(&chunk.text)
            .bind(chunk.page as i64)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(chunk.embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn export_embeddings(
        &self,
        project: &str,
        only_unscanned: bool,
    ) -> Result<Vec<EmbeddingRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, embedding FROM chunks
            WHERE project = ? AND (? = 0 OR scanned = 0)
            ORDER BY rowid ASC
            "#,
        )
        .bind(project)
        .bind(only_unscanned)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            match blob_to_vec(&blob) {
                Some(vector) => out.push(EmbeddingRow { id, vector }),
                None => tracing::warn!(
                    chunk_id = %id,
                    bytes = blob.len(),
                    "skipping chunk with malformed embedding"
                ),
            }
        }
        Ok(out)
    }

    async fn annotate(&self, id: &str, keywords: &[String], scores: &[f32]) -> Result<bool> {
        if keywords.len() != scores.len() {
            return Err(ScanError::LengthMismatch {
                keywords: keywords.len(),
                scores: scores.len(),
            }
            .into());
        }

        let now = now_ts();
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM chunks WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            tracing::warn!(chunk_id = %id, "annotation target no longer exists; skipping");
            return Ok(false);
        }

        for (keyword, &score) in keywords.iter().zip(scores) {
            sqlx::query(
                r#"
                INSERT INTO chunk_keywords (chunk_id, keyword, score, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(chunk_id, keyword) DO UPDATE SET
                    score = excluded.score,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(id)
            .bind(keyword)
            .bind(score as f64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn mark_scanned(&self, project: &str) -> Result<u64> {
        let result =
            sqlx::query("UPDATE chunks SET scanned = 1, scanned_at = ? WHERE project = ?")
                .bind(now_ts())
                .bind(project)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn report(&self, project: &str) -> Result<Vec<FileReport>> {
        let files = sqlx::query(
            r#"
            SELECT file_name, MIN(created_at) AS uploaded_at, MIN(scanned) AS all_scanned
            FROM chunks
            WHERE project = ?
            GROUP BY file_name
            ORDER BY file_name ASC
            "#,
        )
        .bind(project)
        .fetch_all(&self.pool)
        .await?;

        let match_rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, c.file_name, k.keyword, k.score
            FROM chunk_keywords k
            JOIN chunks c ON c.id = k.chunk_id
            WHERE c.project = ? AND c.scanned = 1
            "#,
        )
        .bind(project)
        .fetch_all(&self.pool)
        .await?;

        let mut by_file: HashMap<String, Vec<KeywordMatch>> = HashMap::new();
        for row in match_rows {
            let chunk_id: String = row.get("chunk_id");
            if let Some(m) = decode_match(&chunk_id, row.get("keyword"), row.get("score")) {
                by_file.entry(row.get("file_name")).or_default().push(m);
            }
        }

        Ok(files
            .into_iter()
            .map(|row| {
                let file_name: String = row.get("file_name");
                let all_scanned: i64 = row.get("all_scanned");
                let matches = by_file.remove(&file_name).unwrap_or_default();
                FileReport {
                    uploaded_at: row.get("uploaded_at"),
                    scanned: all_scanned != 0,
                    matches: merge_report_matches(matches),
                    file_name,
                }
            })
            .collect())
    }

    async fn chunk_detail(&self, project: &str, file_name: &str) -> Result<Vec<ChunkDetail>> {
        let chunk_rows = sqlx::query(
            r#"
            SELECT id, text, page FROM chunks
            WHERE project = ? AND file_name = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(project)
        .bind(file_name)
        .fetch_all(&self.pool)
        .await?;

        let match_rows = sqlx::query(
            r#"
            SELECT k.chunk_id, k.keyword, k.score
            FROM chunk_keywords k
            JOIN chunks c ON c.id = k.chunk_id
            WHERE c.project = ? AND c.file_name = ?
            "#,
        )
        .bind(project)
        .bind(file_name)
        .fetch_all(&self.pool)
        .await?;

        let mut by_chunk: HashMap<String, Vec<KeywordMatch>> = HashMap::new();
        for row in match_rows {
            let chunk_id: String = row.get("chunk_id");
            if let Some(m) = decode_match(&chunk_id, row.get("keyword"), row.get("score")) {
                by_chunk.entry(chunk_id).or_default().push(m);
            }
        }

        let mut order: Vec<(String, u32)> = Vec::new();
        let mut grouped: HashMap<(String, u32), Vec<KeywordMatch>> = HashMap::new();
        for row in chunk_rows {
            let id: String = row.get("id");
            let page: i64 = row.get("page");
            let key: (String, u32) = (row.get("text"), u32::try_from(page).unwrap_or(1));
            let matches = by_chunk.remove(&id).unwrap_or_default();
            grouped
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .extend(matches);
        }

        Ok(order
            .into_iter()
            .map(|key| {
                let matches = grouped.remove(&key).unwrap_or_default();
                ChunkDetail {
                    text: key.0,
                    page: key.1,
                    matches: merge_detail_matches(matches),
                }
            })
            .collect())
    }

    async fn delete_project(&self, project: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM chunk_keywords WHERE chunk_id IN (SELECT id FROM chunks WHERE project = ?)",
        )
        .bind(project)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query("DELETE FROM chunks WHERE project = ?")
            .bind(project)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn delete_file(&self, project: &str, file_name: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM chunk_keywords WHERE chunk_id IN
                (SELECT id FROM chunks WHERE project = ? AND file_name = ?)
            "#,
        )
        .bind(project)
        .bind(file_name)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query("DELETE FROM chunks WHERE project = ? AND file_name = ?")
            .bind(project)
            .bind(file_name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn reset(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_keywords")
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn list_projects(&self) -> Result<BTreeSet<String>> {
        let projects: Vec<String> = sqlx::query_scalar("SELECT DISTINCT project FROM chunks")
            .fetch_all(&self.pool)
            .await?;
        Ok(projects.into_iter().collect())
    }

    async fn project_status(&self, project: &str) -> Result<Option<ProjectStatus>> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS chunk_count,
                   COUNT(DISTINCT file_name) AS file_count,
                   MIN(created_at) AS created_at,
                   MIN(scanned) AS all_scanned
            FROM chunks
            WHERE project = ?
            "#,
        )
        .bind(project)
        .fetch_one(&self.pool)
        .await?;

        let chunk_count: i64 = row.get("chunk_count");
        let created_at: Option<i64> = row.get("created_at");
        let Some(created_at) = created_at.filter(|_| chunk_count > 0) else {
            return Ok(None);
        };
        let file_count: i64 = row.get("file_count");
        let all_scanned: i64 = row.get("all_scanned");

        Ok(Some(ProjectStatus {
            project: project.to_string(),
            created_at,
            scanned: all_scanned != 0,
            chunk_count: chunk_count as u64,
            file_count: file_count as u64,
        }))
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<StoredChunk>> {
        let row = sqlx::query(
            r#"
            SELECT id, project, file_name, text, page, embedding, created_at, scanned, scanned_at
            FROM chunks WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut chunk = row_to_chunk(&row)?;
        chunk.matches = matches_for(&self.pool, id).await?;
        Ok(Some(chunk))
    }
}
