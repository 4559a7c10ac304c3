//! # chunkscan CLI
//!
//! ```bash
//! chunkscan --config ./config/chunkscan.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chunkscan init` | Create the SQLite database and run schema migrations |
//! | `chunkscan ingest <project> <files…>` | Extract, chunk, embed and store documents |
//! | `chunkscan search <project> <keywords…>` | Scan a project for keywords |
//! | `chunkscan report <project>` | Per-file keyword matches |
//! | `chunkscan detail <project> <file>` | Per-chunk matches of one file |
//! | `chunkscan status <project>` | Chunk/file counts and scan state |
//! | `chunkscan projects` | List projects |
//! | `chunkscan delete-project` / `delete-file` / `reset` | Remove data |

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use chunkscan::config;
use chunkscan::migrate;
use chunkscan::Scanner;
use chunkscan_core::models::{ChunkDetail, FileReport, KeywordMatch, Scope, SearchRequest};

/// chunkscan: a project-scoped chunk index with incremental keyword
/// similarity scanning.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/chunkscan.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "chunkscan",
    about = "chunkscan: project-scoped chunk index and keyword similarity scanner",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chunkscan.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `chunks` and
    /// `chunk_keywords` tables. Safe to run repeatedly.
    Init,

    /// Ingest documents into a project.
    ///
    /// Supported formats: .txt, .md, .pdf, .docx. Documents that cannot be
    /// read are reported and skipped.
    Ingest {
        project: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Scan a project's chunks for keywords.
    ///
    /// Every keyword is compared to every chunk; matches at or above the
    /// scope's cosine threshold are recorded on the chunk.
    Search {
        project: String,
        #[arg(required = true)]
        keywords: Vec<String>,
        /// `focused`, `balanced`, `broad`, or a number in [-1, 1].
        #[arg(long, value_parser = parse_scope, allow_negative_numbers = true)]
        scope: Option<Scope>,
        /// Only scan chunks not covered by an earlier scan.
        #[arg(long)]
        incremental: bool,
        #[arg(long)]
        json: bool,
    },

    /// Show keyword matches per file.
    Report {
        project: String,
        #[arg(long)]
        json: bool,
    },

    /// Show keyword matches per chunk of one file.
    Detail {
        project: String,
        file: String,
        #[arg(long)]
        json: bool,
    },

    /// Show a project's chunk and file counts and scan state.
    Status {
        project: String,
        #[arg(long)]
        json: bool,
    },

    /// List all projects.
    Projects {
        #[arg(long)]
        json: bool,
    },

    /// Delete a project and all its chunks and annotations.
    DeleteProject { project: String },

    /// Delete one file's chunks from a project.
    DeleteFile { project: String, file: String },

    /// Delete every project.
    Reset {
        /// Required confirmation.
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Named scopes parse leniently; explicit thresholds must be cosine values.
fn parse_scope(raw: &str) -> std::result::Result<Scope, String> {
    let scope = raw.parse::<Scope>().unwrap_or_default();
    match scope {
        Scope::Threshold(t) if !(-1.0..=1.0).contains(&t) => {
            Err(format!("threshold {} is outside [-1, 1]", t))
        }
        _ => Ok(scope),
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn format_matches(matches: &[KeywordMatch]) -> String {
    matches
        .iter()
        .map(|m| format!("{} ({:.3})", m.keyword, m.score))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(project: &str, files: &[FileReport]) {
    if files.is_empty() {
        println!("No files in project '{}'.", project);
        return;
    }
    for f in files {
        let state = if f.scanned { "scanned" } else { "pending" };
        println!("{}  [{}]  uploaded {}", f.file_name, state, format_ts(f.uploaded_at));
        if !f.matches.is_empty() {
            println!("    {}", format_matches(&f.matches));
        }
    }
}

fn print_detail(details: &[ChunkDetail]) {
    for (i, d) in details.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("page {}: {}", d.page, d.text);
        if !d.matches.is_empty() {
            println!("    -> {}", format_matches(&d.matches));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    if matches!(cli.command, Commands::Init) {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let scanner = Scanner::from_config(&cfg).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Ingest {
            project,
            files,
            json,
        } => {
            let summary = scanner.ingest_files(&project, &files).await?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "Ingested {} file(s), {} chunk(s) into '{}'.",
                    summary.files, summary.chunks, project
                );
                for (file, reason) in &summary.failed_files {
                    println!("  skipped {}: {}", file, reason);
                }
            }
        }
        Commands::Search {
            project,
            keywords,
            scope,
            incremental,
            json,
        } => {
            let scope = scope.unwrap_or_else(|| scanner.default_scope());
            let request = SearchRequest::new(keywords, scope).incremental(incremental);
            let outcome = scanner.search(&project, &request).await?;
            if json {
                print_json(&outcome)?;
            } else if outcome.candidates == 0 {
                println!("Nothing to scan in '{}'.", project);
            } else {
                println!(
                    "Scanned {} chunk(s) at threshold {:.2}: {} match(es) on {} chunk(s).",
                    outcome.candidates, outcome.threshold, outcome.hits, outcome.annotated_chunks
                );
            }
        }
        Commands::Report { project, json } => {
            let files = scanner.report(&project).await?;
            if json {
                print_json(&files)?;
            } else {
                print_report(&project, &files);
            }
        }
        Commands::Detail {
            project,
            file,
            json,
        } => {
            let details = scanner.chunk_detail(&project, &file).await?;
            if json {
                print_json(&details)?;
            } else if details.is_empty() {
                println!("No chunks for '{}' in project '{}'.", file, project);
            } else {
                print_detail(&details);
            }
        }
        Commands::Status { project, json } => {
            let Some(status) = scanner.project_status(&project).await? else {
                bail!("project '{}' not found", project);
            };
            if json {
                print_json(&status)?;
            } else {
                println!("project:  {}", status.project);
                println!("created:  {}", format_ts(status.created_at));
                println!("files:    {}", status.file_count);
                println!("chunks:   {}", status.chunk_count);
                println!(
                    "scanned:  {}",
                    if status.scanned { "yes" } else { "no" }
                );
            }
        }
        Commands::Projects { json } => {
            let projects = scanner.list_projects().await?;
            if json {
                print_json(&projects)?;
            } else if projects.is_empty() {
                println!("No projects.");
            } else {
                for p in projects {
                    println!("{}", p);
                }
            }
        }
        Commands::DeleteProject { project } => {
            let removed = scanner.delete_project(&project).await?;
            println!("Removed {} chunk(s) from '{}'.", removed, project);
        }
        Commands::DeleteFile { project, file } => {
            let removed = scanner.delete_file(&project, &file).await?;
            println!("Removed {} chunk(s) of '{}' from '{}'.", removed, file, project);
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset deletes every project; pass --yes to confirm");
            }
            let removed = scanner.reset().await?;
            println!("Removed {} chunk(s).", removed);
        }
    }

    Ok(())
}
