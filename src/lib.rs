//! # Knowledge Base
//!
//! Ingest unstructured documents into named collections and answer
//! similarity queries against them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌──────────────────┐
//! │  Upload  │──▶│  Indexing Pipeline   │──▶│                  │
//! │ PDF/DOCX │   │ parse → chunk → meta │   │    Collection    │   ┌─────────────┐
//! │  TXT/MD  │   └──────────────────────┘   │     Manager      │──▶│ SQLite per  │
//! └──────────┘   ┌──────────────────────┐   │ embed + store    │   │ collection  │
//! ┌──────────┐   │     Query Engine     │──▶│                  │   └─────────────┘
//! │  Query   │──▶│ embed → k-NN → score │   └──────────────────┘
//! └──────────┘   └──────────────────────┘
//! ```
//!
//! Chunking, collection names, index traits, scoring, and the error
//! taxonomy live in `knowledge-base-core`; this crate supplies the
//! concrete parsers, embedding providers, SQLite storage, HTTP server, and
//! CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`extract`] | PDF, DOCX, text, and Markdown parsers |
//! | [`embedding`] | Embedding providers |
//! | [`db`] | Per-collection SQLite connection |
//! | [`migrate`] | Index schema |
//! | [`sqlite_index`] | SQLite vector index backend |
//! | [`collections`] | Collection lifecycle |
//! | [`ingest`] | Indexing pipeline |
//! | [`query`] | Query engine |
//! | [`app`] | Component wiring |
//! | [`server`] | HTTP API |

pub mod app;
pub mod collections;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod query;
pub mod server;
pub mod sqlite_index;
