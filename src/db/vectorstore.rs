//! Document Index Abstraction
//!
//! Retrieval for the chat works over two kinds of entries per restaurant:
//!
//! - **text chunks** of uploaded documents, each carrying its file summary
//! - **table descriptions** of uploaded CSVs, pointing at a warehouse table
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     DocumentIndex Trait                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ index_text_chunks │ index_table │ search_* │ delete_*         │
//! └──────────────────────────────────────────────────────────────┘
//!            ▲                                  ▲
//!     ┌──────┴──────┐                   ┌───────┴───────┐
//!     │ LocalIndex  │                   │ BigQueryIndex │
//!     │ ares-vector │                   │ VECTOR_SEARCH │
//!     └─────────────┘                   └───────────────┘
//! ```
//!
//! Every call is scoped by restaurant id: an implementation must never return
//! another restaurant's entries.

use crate::types::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A chunk of document text with its embedding, ready for indexing.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A text excerpt returned by retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextHit {
    pub file_id: String,
    pub text: String,
    pub summary: String,
    pub score: f32,
}

/// A table whose description matched the question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableHit {
    pub file_id: String,
    pub table_name: String,
    pub description: String,
    pub score: f32,
}

/// Restaurant-scoped vector index over document chunks and table descriptions.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Name of the backing store, for logs.
    fn provider_name(&self) -> &'static str;

    /// Index the chunks of one file. Returns the number of chunks stored.
    async fn index_text_chunks(
        &self,
        restaurant_id: &str,
        file_id: &str,
        summary: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize>;

    /// Index the description of one CSV table.
    async fn index_table(
        &self,
        restaurant_id: &str,
        file_id: &str,
        table_name: &str,
        description: &str,
        embedding: &[f32],
    ) -> Result<()>;

    /// Best `k` text chunks of the restaurant, highest score first.
    async fn search_text(
        &self,
        restaurant_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<TextHit>>;

    /// Best `k` tables of the restaurant, highest score first.
    async fn search_tables(
        &self,
        restaurant_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<TableHit>>;

    /// Remove every entry of one file. Returns the number removed.
    async fn delete_file(&self, restaurant_id: &str, file_id: &str) -> Result<usize>;

    /// Remove every entry of a restaurant.
    async fn delete_restaurant(&self, restaurant_id: &str) -> Result<()>;
}
