//! End-to-end tests of the library against a real SQLite database.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use chunkscan::config::{load_config, Config};
use chunkscan::sqlite_store::SqliteStore;
use chunkscan::Scanner;
use chunkscan_core::embedding::EmbeddingProvider;
use chunkscan_core::models::{NewChunk, PageText, Scope, SearchRequest};
use chunkscan_core::store::{content_hash_id, ChunkStore};

/// Maps known texts to fixed vectors; anything else embeds as `[0, 0, 1]`.
struct FixedEmbedder;

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| match t.as_str() {
                "x" => vec![1.0, 0.0, 0.0],
                "y" => vec![0.0, 1.0, 0.0],
                t if t.contains("cargo") => vec![0.9, 0.1, 0.0],
                t if t.contains("python") => vec![0.1, 0.9, 0.0],
                _ => vec![0.0, 0.0, 1.0],
            })
            .collect())
    }
}

fn write_config(root: &Path, extra: &str) -> Config {
    let path = root.join("chunkscan.toml");
    fs::write(
        &path,
        format!(
            "[db]\npath = \"{}/data/chunkscan.sqlite\"\n{}",
            root.display(),
            extra
        ),
    )
    .unwrap();
    load_config(&path).unwrap()
}

async fn open_store(extra: &str) -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), extra);
    let store = SqliteStore::open(&config).await.unwrap();
    (tmp, store)
}

fn chunk(file: &str, text: &str, v: &[f32]) -> NewChunk {
    NewChunk {
        file_name: file.to_string(),
        text: text.to_string(),
        page: 1,
        embedding: v.to_vec(),
    }
}

async fn insert_demo(store: &SqliteStore) -> Vec<String> {
    store
        .insert(
            "demo",
            &[
                chunk("one.txt", "e1", &[1.0, 0.0, 0.0]),
                chunk("two.txt", "e2", &[0.0, 1.0, 0.0]),
                chunk("three.txt", "e3", &[0.9, 0.1, 0.0]),
            ],
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_embedding_round_trip_is_bit_identical() {
    let (_tmp, store) = open_store("").await;
    let vector = vec![0.1f32, -3.5e-8, f32::MAX, 1.0 / 3.0];
    let ids = store
        .insert("p", &[chunk("a.txt", "text", &vector)])
        .await
        .unwrap();

    let rows = store.export_embeddings("p", false).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, ids[0]);
    let bits: Vec<u32> = rows[0].vector.iter().map(|f| f.to_bits()).collect();
    let expected: Vec<u32> = vector.iter().map(|f| f.to_bits()).collect();
    assert_eq!(bits, expected);
}

#[tokio::test]
async fn test_demo_scan_through_sqlite() {
    let (_tmp, store) = open_store("").await;
    let ids = insert_demo(&store).await;
    let scanner = Scanner::new(Arc::new(store), Arc::new(FixedEmbedder));

    let outcome = scanner
        .search("demo", &SearchRequest::new(["x"], Scope::Focused))
        .await
        .unwrap();
    assert_eq!(outcome.candidates, 3);
    assert_eq!(outcome.annotated_chunks, 2);
    assert!(outcome.marked_scanned);

    let e1 = scanner.store().get_chunk(&ids[0]).await.unwrap().unwrap();
    let e2 = scanner.store().get_chunk(&ids[1]).await.unwrap().unwrap();
    let e3 = scanner.store().get_chunk(&ids[2]).await.unwrap().unwrap();
    assert!((e1.matches[0].score - 1.0).abs() < 1e-5);
    assert!(e2.matches.is_empty());
    assert!((e3.matches[0].score - 0.9939).abs() < 1e-3);
    assert!(e1.scanned && e2.scanned && e3.scanned);

    let report = scanner.report("demo").await.unwrap();
    let names: Vec<&str> = report.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["one.txt", "three.txt", "two.txt"]);
    assert!(report.iter().all(|f| f.scanned));
    assert_eq!(report[0].matches[0].keyword, "x");
    assert_eq!(report[1].matches[0].keyword, "x");
    assert!(report[2].matches.is_empty());

    let detail = scanner.chunk_detail("demo", "three.txt").await.unwrap();
    assert_eq!(detail.len(), 1);
    assert_eq!(detail[0].text, "e3");
    assert_eq!(detail[0].matches[0].keyword, "x");
}

#[tokio::test]
async fn test_incremental_scans_are_disjoint() {
    let (_tmp, store) = open_store("").await;
    insert_demo(&store).await;
    let scanner = Scanner::new(Arc::new(store), Arc::new(FixedEmbedder));
    let request = SearchRequest::new(["x"], Scope::Focused).incremental(true);

    let first = scanner.search("demo", &request).await.unwrap();
    assert_eq!(first.candidates, 3);

    let second = scanner.search("demo", &request).await.unwrap();
    assert_eq!(second.candidates, 0);
    assert!(!second.marked_scanned);

    let new_ids = scanner
        .store()
        .insert("demo", &[chunk("four.txt", "e4", &[1.0, 0.0, 0.0])])
        .await
        .unwrap();
    let rows = scanner.store().export_embeddings("demo", true).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, new_ids[0]);

    let third = scanner.search("demo", &request).await.unwrap();
    assert_eq!(third.candidates, 1);
    assert_eq!(third.annotated_chunks, 1);
    assert!(scanner.project_status("demo").await.unwrap().unwrap().scanned);
}

#[tokio::test]
async fn test_rescan_updates_scores_in_place() {
    let (_tmp, store) = open_store("").await;
    let ids = insert_demo(&store).await;
    let scanner = Scanner::new(Arc::new(store), Arc::new(FixedEmbedder));

    scanner
        .search("demo", &SearchRequest::new(["x"], Scope::Focused))
        .await
        .unwrap();
    scanner
        .search("demo", &SearchRequest::new(["x", "y"], Scope::Broad))
        .await
        .unwrap();

    let e1 = scanner.store().get_chunk(&ids[0]).await.unwrap().unwrap();
    assert_eq!(e1.matches.len(), 1);
    assert_eq!(e1.matches[0].keyword, "x");
    let e2 = scanner.store().get_chunk(&ids[1]).await.unwrap().unwrap();
    assert_eq!(e2.matches[0].keyword, "y");
}

#[tokio::test]
async fn test_annotate_replaces_one_keyword_and_keeps_others() {
    let (_tmp, store) = open_store("").await;
    let ids = store
        .insert("p", &[chunk("a.txt", "text", &[1.0, 0.0, 0.0])])
        .await
        .unwrap();
    let id = &ids[0];

    assert!(store
        .annotate(id, &["A".to_string(), "B".to_string()], &[0.8, 0.6])
        .await
        .unwrap());
    assert!(store.annotate(id, &["A".to_string()], &[0.3]).await.unwrap());

    let stored = store.get_chunk(id).await.unwrap().unwrap();
    let scores: Vec<(&str, f32)> = stored
        .matches
        .iter()
        .map(|m| (m.keyword.as_str(), m.score))
        .collect();
    assert_eq!(scores.len(), 2);
    assert!(scores.contains(&("A", 0.3)), "got {:?}", scores);
    assert!(scores.contains(&("B", 0.6)), "got {:?}", scores);

    let detail = store.chunk_detail("p", "a.txt").await.unwrap();
    assert_eq!(detail.len(), 1);
    let matches: Vec<(&str, f32)> = detail[0]
        .matches
        .iter()
        .map(|m| (m.keyword.as_str(), m.score))
        .collect();
    assert_eq!(matches, vec![("B", 0.6), ("A", 0.3)]);
}

#[tokio::test]
async fn test_content_hash_policy_dedupes() {
    let (_tmp, store) = open_store("[ingest]\ndedupe = true\n").await;
    let c = chunk("a.txt", "same text", &[1.0, 0.0, 0.0]);

    let first = store.insert("p", &[c.clone()]).await.unwrap();
    let second = store.insert("p", &[c.clone()]).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0], content_hash_id("p", &c));
    assert_eq!(store.export_embeddings("p", false).await.unwrap().len(), 1);

    let other = store.insert("q", &[c]).await.unwrap();
    assert_ne!(other, first);
}

#[tokio::test]
async fn test_random_policy_keeps_duplicates() {
    let (_tmp, store) = open_store("").await;
    let c = chunk("a.txt", "same text", &[1.0, 0.0, 0.0]);
    store.insert("p", &[c.clone(), c]).await.unwrap();
    assert_eq!(store.export_embeddings("p", false).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_and_status() {
    let (_tmp, store) = open_store("").await;
    insert_demo(&store).await;
    store
        .insert("other", &[chunk("x.txt", "x", &[1.0, 0.0, 0.0])])
        .await
        .unwrap();

    let status = store.project_status("demo").await.unwrap().unwrap();
    assert_eq!(status.chunk_count, 3);
    assert_eq!(status.file_count, 3);
    assert!(!status.scanned);

    assert_eq!(store.delete_file("demo", "two.txt").await.unwrap(), 1);
    assert_eq!(store.report("demo").await.unwrap().len(), 2);

    assert_eq!(store.delete_project("demo").await.unwrap(), 2);
    assert!(store.project_status("demo").await.unwrap().is_none());
    let projects: Vec<String> = store.list_projects().await.unwrap().into_iter().collect();
    assert_eq!(projects, vec!["other".to_string()]);

    assert_eq!(store.reset().await.unwrap(), 1);
    assert!(store.list_projects().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");
    {
        let store = SqliteStore::open(&config).await.unwrap();
        insert_demo(&store).await;
        store.mark_scanned("demo").await.unwrap();
        store.close().await;
    }
    let store = SqliteStore::open(&config).await.unwrap();
    assert_eq!(store.export_embeddings("demo", false).await.unwrap().len(), 3);
    assert!(store.export_embeddings("demo", true).await.unwrap().is_empty());
}

fn write_files(root: &Path) -> Vec<PathBuf> {
    let dir = root.join("files");
    fs::create_dir_all(&dir).unwrap();
    let alpha = dir.join("alpha.txt");
    fs::write(&alpha, "Notes about cargo and crates. Build with cargo.").unwrap();
    let beta = dir.join("beta.md");
    fs::write(&beta, "- Notes about python.\n- Deep learning.").unwrap();
    let sheet = dir.join("sheet.xlsx");
    fs::write(&sheet, "not supported").unwrap();
    vec![alpha, beta, sheet]
}

#[tokio::test]
async fn test_ingest_files_and_scan() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "[ingest]\nworkers = 2\n");
    let store = SqliteStore::open(&config).await.unwrap();
    let scanner = Scanner::new(Arc::new(store), Arc::new(FixedEmbedder)).with_workers(2);

    let paths = write_files(tmp.path());
    let summary = scanner.ingest_files("docs", &paths).await.unwrap();
    assert_eq!(summary.files, 2);
    assert_eq!(summary.chunks, 2);
    assert_eq!(summary.failed_files.len(), 1);
    assert!(summary.failed_files[0].0.ends_with("sheet.xlsx"));

    let status = scanner.project_status("docs").await.unwrap().unwrap();
    assert_eq!(status.file_count, 2);

    let detail = scanner.chunk_detail("docs", "beta.md").await.unwrap();
    assert_eq!(detail[0].text, "Notes about python. Deep learning.");

    let outcome = scanner
        .search("docs", &SearchRequest::new(["x"], Scope::Focused))
        .await
        .unwrap();
    assert_eq!(outcome.annotated_chunks, 1);
    let report = scanner.report("docs").await.unwrap();
    assert_eq!(report[0].file_name, "alpha.txt");
    assert_eq!(report[0].matches[0].keyword, "x");
    assert!(report[1].matches.is_empty());
}

#[tokio::test]
async fn test_insert_document_assigns_pages() {
    let (_tmp, store) = open_store("").await;
    let scanner = Scanner::new(Arc::new(store), Arc::new(FixedEmbedder));
    let ids = scanner
        .insert_document(
            "p",
            "paged.pdf",
            &[
                PageText::new(1, "First page."),
                PageText::new(2, "Second page."),
            ],
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    let second = scanner.store().get_chunk(&ids[1]).await.unwrap().unwrap();
    assert_eq!(second.page, 2);
    assert_eq!(second.file_name, "paged.pdf");
}
