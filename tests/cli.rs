//! Tests of the `chunkscan` binary. They only use the `disabled`
//! embedding provider, so no model download or network is needed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn chunkscan_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("chunkscan");
    path
}

fn setup_test_env(embedding: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.txt"),
        "Alpha notes. They mention cargo and crates.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/chunkscan.sqlite"

[chunking]
max_chars = 200

[search]
default_scope = "focused"

{}
"#,
        root.display(),
        embedding
    );

    let config_path = config_dir.join("chunkscan.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_chunkscan(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = chunkscan_binary();
    let output = Command::new(&binary)
        .env_remove("OPENAI_API_KEY")
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run chunkscan binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_is_idempotent() {
    let (tmp, config) = setup_test_env("");
    let (stdout, stderr, ok) = run_chunkscan(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/chunkscan.sqlite").exists());

    let (_, stderr, ok) = run_chunkscan(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_projects_empty() {
    let (_tmp, config) = setup_test_env("");
    run_chunkscan(&config, &["init"]);

    let (stdout, _, ok) = run_chunkscan(&config, &["projects"]);
    assert!(ok);
    assert!(stdout.contains("No projects."));

    let (stdout, _, ok) = run_chunkscan(&config, &["projects", "--json"]);
    assert!(ok);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed, serde_json::json!([]));
}

#[test]
fn test_search_empty_project_is_noop() {
    let (_tmp, config) = setup_test_env("");
    run_chunkscan(&config, &["init"]);

    let (stdout, stderr, ok) = run_chunkscan(&config, &["search", "nothing", "cargo"]);
    assert!(ok, "search failed: {}", stderr);
    assert!(stdout.contains("Nothing to scan"));

    let (stdout, _, ok) = run_chunkscan(
        &config,
        &["search", "nothing", "cargo", "--incremental", "--json"],
    );
    assert!(ok);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["candidates"], 0);
    assert_eq!(parsed["marked_scanned"], false);
    assert!((parsed["threshold"].as_f64().unwrap() - 0.7).abs() < 1e-6);
}

#[test]
fn test_search_scope_flag_overrides_default() {
    let (_tmp, config) = setup_test_env("");
    let (stdout, _, ok) = run_chunkscan(
        &config,
        &["search", "nothing", "cargo", "--scope", "broad", "--json"],
    );
    assert!(ok);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!((parsed["threshold"].as_f64().unwrap() - 0.4).abs() < 1e-6);
}

#[test]
fn test_search_rejects_threshold_outside_cosine_range() {
    let (_tmp, config) = setup_test_env("");
    for flag in ["--scope=5", "--scope=-1.5"] {
        let (_, stderr, ok) = run_chunkscan(&config, &["search", "nothing", "cargo", flag]);
        assert!(!ok, "{} accepted", flag);
        assert!(stderr.contains("[-1, 1]"), "unexpected stderr: {}", stderr);
    }

    let (stdout, stderr, ok) = run_chunkscan(
        &config,
        &["search", "nothing", "cargo", "--scope=-1", "--json"],
    );
    assert!(ok, "search failed: {}", stderr);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!((parsed["threshold"].as_f64().unwrap() + 1.0).abs() < 1e-6);
}

#[test]
fn test_ingest_without_provider_fails() {
    let (tmp, config) = setup_test_env("");
    let file = tmp.path().join("files/alpha.txt");
    let (_, stderr, ok) = run_chunkscan(&config, &["ingest", "docs", file.to_str().unwrap()]);
    assert!(!ok);
    assert!(stderr.contains("disabled"), "unexpected stderr: {}", stderr);
}

#[test]
fn test_status_unknown_project_fails() {
    let (_tmp, config) = setup_test_env("");
    let (_, stderr, ok) = run_chunkscan(&config, &["status", "ghost"]);
    assert!(!ok);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_report_unknown_project_is_empty() {
    let (_tmp, config) = setup_test_env("");
    let (stdout, _, ok) = run_chunkscan(&config, &["report", "ghost"]);
    assert!(ok);
    assert!(stdout.contains("No files in project 'ghost'."));
}

#[test]
fn test_reset_requires_confirmation() {
    let (_tmp, config) = setup_test_env("");
    let (_, stderr, ok) = run_chunkscan(&config, &["reset"]);
    assert!(!ok);
    assert!(stderr.contains("--yes"));

    let (stdout, _, ok) = run_chunkscan(&config, &["reset", "--yes"]);
    assert!(ok);
    assert!(stdout.contains("Removed 0 chunk(s)."));
}

#[test]
fn test_unknown_provider_rejected() {
    let (_tmp, config) = setup_test_env("[embedding]\nprovider = \"magic\"\n");
    let (_, stderr, ok) = run_chunkscan(&config, &["projects"]);
    assert!(!ok);
    assert!(stderr.contains("Unknown embedding provider"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_chunkscan(&tmp.path().join("absent.toml"), &["projects"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_store_commands_work_without_openai_key() {
    let (tmp, config) = setup_test_env(
        "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\nmax_retries = 0\n",
    );
    run_chunkscan(&config, &["init"]);

    let (stdout, stderr, ok) = run_chunkscan(&config, &["report", "docs"]);
    assert!(ok, "report failed: {}", stderr);
    assert!(stdout.contains("No files in project 'docs'."));

    let (_, stderr, ok) = run_chunkscan(&config, &["projects"]);
    assert!(ok, "projects failed: {}", stderr);
    let (_, stderr, ok) = run_chunkscan(&config, &["delete-project", "docs"]);
    assert!(ok, "delete-project failed: {}", stderr);

    let file = tmp.path().join("files/alpha.txt");
    let (_, stderr, ok) = run_chunkscan(&config, &["ingest", "docs", file.to_str().unwrap()]);
    assert!(!ok);
    assert!(stderr.contains("OPENAI_API_KEY"), "unexpected stderr: {}", stderr);
}
