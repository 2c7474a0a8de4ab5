//! Upload ingestion
//!
//! ```text
//! text / pdf ──► extract ──► semantic chunks ──► summary ──► embed ──► index (text)
//! csv ─────────► parse ──► warehouse table ──► description ──► embed ──► index (table)
//! ```
//!
//! The raw upload is never stored. A failed ingestion removes whatever it had
//! already written to the index and the warehouse.

use crate::db::{DocumentIndex, EmbeddedChunk, TursoClient};
use crate::llm::{Embedder, LLMClient};
use crate::rag::chunker::{FixedChunker, SemanticChunker};
use crate::rag::extract::{extract_text, parse_csv};
use crate::rag::profile::Summarizer;
use crate::types::{AppError, FileKind, RestaurantFile, Result};
use crate::utils::text::fold_accents;
use crate::utils::toml_config::RagConfig;
use crate::warehouse::Warehouse;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

/// Warehouse table name for a CSV upload: the file stem lowercased, with
/// whitespace as `_`, anything outside `[a-z0-9_]` removed, a `t_` prefix when
/// it would start with a digit, and the short file id appended.
pub fn sanitize_table_name(file_name: &str, file_id: &str) -> String {
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);

    let mut name: String = fold_accents(stem.trim())
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();

    if name.is_empty() {
        name.push_str("table");
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "t_");
    }

    let short_id: String = file_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_lowercase();
    format!("{}_{}", name, short_id)
}

pub struct IngestService {
    turso: Arc<TursoClient>,
    index: Arc<dyn DocumentIndex>,
    embedder: Arc<dyn Embedder>,
    warehouse: Arc<dyn Warehouse>,
    summarizer: Summarizer,
    chunker: SemanticChunker,
}

impl IngestService {
    pub fn new(
        turso: Arc<TursoClient>,
        index: Arc<dyn DocumentIndex>,
        embedder: Arc<dyn Embedder>,
        warehouse: Arc<dyn Warehouse>,
        llm: Arc<dyn LLMClient>,
        rag: &RagConfig,
        summary_max_tokens: u32,
    ) -> Result<Self> {
        let fallback = FixedChunker::new(rag.chunk_size, rag.chunk_overlap)?;
        Ok(Self {
            turso,
            index,
            embedder,
            warehouse,
            summarizer: Summarizer::new(llm, summary_max_tokens),
            chunker: SemanticChunker::new(
                rag.buffer_size,
                rag.breakpoint_percentile,
                rag.min_sentences_for_semantic,
                fallback,
            ),
        })
    }

    /// Ingest one upload and record it. Unsupported extensions are rejected
    /// before anything is written.
    pub async fn ingest(
        &self,
        restaurant_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<RestaurantFile> {
        let kind = FileKind::from_file_name(file_name).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Unsupported file type for '{}': expected .txt, .md, .pdf or .csv",
                file_name
            ))
        })?;

        let started = Instant::now();
        let mut file = RestaurantFile {
            id: uuid::Uuid::new_v4().to_string(),
            restaurant_id: restaurant_id.to_string(),
            name: file_name.to_string(),
            kind,
            size_bytes: bytes.len() as i64,
            chunk_count: 0,
            table_name: None,
            created_at: Utc::now(),
        };

        let outcome = match kind {
            FileKind::Text | FileKind::Pdf => self.ingest_document(&mut file, bytes).await,
            FileKind::Csv => self.ingest_table(&mut file, bytes).await,
        };

        let outcome = match outcome {
            Ok(()) => self.turso.insert_file(&file).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            self.rollback(&file).await;
            return Err(e);
        }

        tracing::info!(
            restaurant_id,
            file_id = %file.id,
            kind = kind.as_str(),
            chunks = file.chunk_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "file ingested"
        );
        Ok(file)
    }

    async fn ingest_document(&self, file: &mut RestaurantFile, bytes: &[u8]) -> Result<()> {
        let text = extract_text(file.kind, bytes)?;
        if text.trim().is_empty() {
            return Err(AppError::InvalidInput(format!(
                "'{}' contains no text",
                file.name
            )));
        }

        let chunks = self.chunker.chunk(&text, self.embedder.as_ref()).await?;
        if chunks.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "'{}' contains no text",
                file.name
            )));
        }

        let summary = self.summarizer.summarize(&text).await?;
        let embeddings = self.embedder.embed_batch(&chunks).await?;

        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| EmbeddedChunk { text, embedding })
            .collect();

        let stored = self
            .index
            .index_text_chunks(&file.restaurant_id, &file.id, &summary, &embedded)
            .await?;
        file.chunk_count = stored as i64;
        Ok(())
    }

    async fn ingest_table(&self, file: &mut RestaurantFile, bytes: &[u8]) -> Result<()> {
        let table = parse_csv(bytes)?;
        if table.rows.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "'{}' has a header but no data rows",
                file.name
            )));
        }

        let table_name = sanitize_table_name(&file.name, &file.id);
        file.table_name = Some(table_name.clone());

        let loaded = self
            .warehouse
            .load_csv(&table_name, &file.restaurant_id, &table.headers, &table.rows)
            .await?;
        tracing::debug!(table = %table_name, rows = loaded, "CSV rows loaded");

        let description = self.summarizer.describe_table(&table).await?;
        let embedding = self.embedder.embed(&description).await?;

        self.index
            .index_table(
                &file.restaurant_id,
                &file.id,
                &table_name,
                &description,
                &embedding,
            )
            .await?;
        file.chunk_count = 1;
        Ok(())
    }

    async fn rollback(&self, file: &RestaurantFile) {
        if let Err(e) = self.index.delete_file(&file.restaurant_id, &file.id).await {
            tracing::warn!(file_id = %file.id, error = %e, "rollback: index cleanup failed");
        }
        if let Some(table) = &file.table_name {
            if let Err(e) = self.warehouse.drop_table(table).await {
                tracing::warn!(table = %table, error = %e, "rollback: table drop failed");
            }
        }
    }

    /// Remove a file's index entries, its warehouse table and its record.
    pub async fn delete_file(&self, restaurant_id: &str, file_id: &str) -> Result<()> {
        let file = self.turso.get_file(restaurant_id, file_id).await?;

        let removed = self.index.delete_file(restaurant_id, file_id).await?;
        if let Some(table) = &file.table_name {
            self.warehouse.drop_table(table).await?;
        }
        self.turso.delete_file(restaurant_id, file_id).await?;

        tracing::info!(restaurant_id, file_id, removed, "file deleted");
        Ok(())
    }

    /// Remove everything a restaurant owns outside the relational store,
    /// then the restaurant itself.
    pub async fn delete_restaurant(
        &self,
        user_id: &str,
        restaurant_id: &str,
        shared_tables: &[String],
    ) -> Result<()> {
        self.turso.get_restaurant(user_id, restaurant_id).await?;

        for file in self.turso.list_files(restaurant_id, None).await? {
            if let Some(table) = &file.table_name {
                self.warehouse.drop_table(table).await?;
            }
        }
        for table in shared_tables {
            self.warehouse.delete_rows(table, restaurant_id).await?;
        }
        self.index.delete_restaurant(restaurant_id).await?;
        self.turso.delete_restaurant(user_id, restaurant_id).await?;

        tracing::info!(restaurant_id, "restaurant deleted");
        Ok(())
    }
}
