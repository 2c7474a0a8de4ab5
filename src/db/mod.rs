//! Storage clients.
//!
//! - **Turso/SQLite**: restaurants, file records, ledger and chat history
//! - **Document index**: restaurant-scoped vector search over chunks and table descriptions
//!
//! The BigQuery-backed index lives in [`crate::warehouse::bigquery_index`]
//! because it shares the warehouse HTTP client.

#![allow(missing_docs)]

pub mod ares_vector;
pub mod connection;
pub mod turso;
pub mod vectorstore;

pub use ares_vector::LocalIndex;
pub use connection::{ConnectionSource, DbConnection};
pub use turso::TursoClient;
pub use vectorstore::{DocumentIndex, EmbeddedChunk, TableHit, TextHit};
