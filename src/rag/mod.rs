//! Retrieval Augmented Generation (RAG) Pipeline
//!
//! Turns uploads into searchable entries and keeps embedding costs down.
//!
//! # Module Structure
//!
//! - [`rag::chunker`](crate::rag::chunker) - Fixed-window and semantic (embedding distance) chunking
//! - [`rag::extract`](crate::rag::extract) - Text from `.txt`/`.md`/`.pdf`, tables from `.csv`
//! - [`rag::profile`](crate::rag::profile) - Document summaries and CSV table descriptions
//! - [`rag::cache`](crate::rag::cache) - LRU embedding cache
//! - [`rag::ingest`](crate::rag::ingest) - The ingestion and deletion pipeline
//!
//! # Pipeline
//!
//! 1. **Extraction** - Text or table rows are read from the upload
//! 2. **Chunking** - Sentences are grouped where the topic shifts
//! 3. **Profiling** - The LLM summarises documents and describes tables
//! 4. **Storage** - Chunks and table descriptions are embedded and indexed per restaurant
//! 5. **Retrieval** - Chat questions are embedded and matched against the index

pub mod cache;
pub mod chunker;
pub mod extract;
pub mod ingest;
pub mod profile;

pub use cache::CachedEmbedder;
pub use ingest::{sanitize_table_name, IngestService};
