//! # Knowledge Base CLI (`kb`)
//!
//! Ingest documents into named collections and query them by semantic
//! similarity, from the shell or over HTTP.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb serve` | Start the HTTP API |
//! | `kb ingest <file> --collection <name>` | Index a document |
//! | `kb query "<text>" --collection <name>` | Similarity search |
//! | `kb collections` | List collections |
//! | `kb stats <name>` | Per-file chunk statistics |
//! | `kb delete <name>` | Delete a collection |
//!
//! ## Examples
//!
//! ```bash
//! kb ingest ./handbook.pdf --collection hr
//! kb query "parental leave policy" --collection hr --top-k 3
//! kb --config ./kb.toml serve
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use knowledge_base::app::KnowledgeBase;
use knowledge_base::config::{self, Config};
use knowledge_base::embedding::DisabledProvider;
use knowledge_base::{logging, server};
use knowledge_base_core::collection::CollectionName;

/// Knowledge Base CLI: document ingestion and similarity search over
/// named collections.
///
/// Without `--config` every setting takes its default (storage under
/// `./kb_storage`, local embeddings).
#[derive(Parser)]
#[command(name = "kb", version, about = "Local knowledge base: ingest documents, query by similarity")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    Serve,

    /// Index a document (.pdf, .txt, .md, .docx) into a collection.
    ///
    /// The collection is created on first use; later uploads append.
    Ingest {
        /// Document to index.
        file: PathBuf,

        /// Target collection (letters, digits, `-`, `_`).
        #[arg(long, short)]
        collection: String,
    },

    /// Find the chunks of a collection most similar to a query.
    Query {
        /// Query text.
        text: String,

        #[arg(long, short)]
        collection: String,

        /// Number of results (defaults to `retrieval.default_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },

    /// List collections with chunk counts and timestamps.
    Collections {
        #[arg(long)]
        json: bool,
    },

    /// Show chunk counts per source file for a collection.
    Stats {
        name: String,

        #[arg(long)]
        json: bool,
    },

    /// Delete a collection and everything indexed in it.
    Delete { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    logging::init(&config.logging);

    match cli.command {
        Commands::Serve => {
            server::run_server(&config).await?;
        }
        Commands::Ingest { file, collection } => {
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .with_context(|| format!("Not a file path: {}", file.display()))?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let kb = KnowledgeBase::from_config(&config).await?;
            let outcome = kb.pipeline().ingest(bytes, &filename, &collection).await?;
            println!("{}", outcome.message);
            println!("  collection: {}", outcome.collection);
            println!("  chunks added: {}", outcome.chunks_added);
        }
        Commands::Query {
            text,
            collection,
            top_k,
            json,
        } => {
            let kb = KnowledgeBase::from_config(&config).await?;
            let response = kb.engine().query(&text, &collection, top_k).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if response.documents.is_empty() {
                println!("No results.");
            } else {
                for (i, doc) in response.documents.iter().enumerate() {
                    println!(
                        "{}. [{:.2}] {} (chunk {}, distance {:.4})",
                        i + 1,
                        doc.score,
                        doc.metadata.source_label(),
                        doc.metadata.chunk_index,
                        doc.distance
                    );
                    println!("    {}", snippet(&doc.content, 200));
                    println!();
                }
            }
        }
        Commands::Collections { json } => {
            let kb = metadata_only(&config)?;
            let collections = kb.collections().list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&collections)?);
            } else if collections.is_empty() {
                println!("No collections.");
            } else {
                println!("{:<24} {:>8}  {:<20}  LAST UPDATED", "NAME", "CHUNKS", "CREATED");
                for c in &collections {
                    println!(
                        "{:<24} {:>8}  {:<20}  {}",
                        c.name, c.document_count, c.created_at, c.last_updated
                    );
                }
            }
        }
        Commands::Stats { name, json } => {
            let kb = metadata_only(&config)?;
            let stats = kb.collections().stats(&CollectionName::parse(&name)?).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("collection: {}", stats.collection);
                println!("  total chunks: {}", stats.total_chunks);
                println!("  files: {}", stats.file_count);
                println!("  created: {}", stats.created_at);
                println!("  last updated: {}", stats.last_updated);
                for (file, count) in &stats.source_files {
                    println!("    {:<40} {:>6}", file, count);
                }
            }
        }
        Commands::Delete { name } => {
            let kb = metadata_only(&config)?;
            let name = CollectionName::parse(&name)?;
            kb.collections().delete(&name).await?;
            println!("Collection '{}' deleted successfully", name);
        }
    }

    Ok(())
}

/// Listing, stats, and delete never embed; skip loading the model.
fn metadata_only(config: &Config) -> anyhow::Result<KnowledgeBase> {
    KnowledgeBase::with_provider(config, Arc::new(DisabledProvider))
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
