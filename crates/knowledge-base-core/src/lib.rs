//! # Knowledge Base Core
//!
//! Shared, storage-agnostic logic for the knowledge base: the chunker,
//! collection-name validation, the vector index traits, similarity scoring,
//! the embedding trait, and the error taxonomy.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Concrete index backends, embedding providers,
//! and document parsers live in the `knowledge-base` app crate.

pub mod chunk;
pub mod collection;
pub mod embedding;
pub mod error;
pub mod models;
pub mod search;
pub mod store;

pub use error::{KbError, KbResult};
