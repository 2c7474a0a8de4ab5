//! Embedded document index on top of ares-vector
//!
//! Each restaurant gets two HNSW collections with cosine distance:
//! `r_{restaurant}_text` for document chunks and `r_{restaurant}_tables` for
//! CSV table descriptions. A search only ever opens the restaurant's own
//! collections.
//!
//! Chunk text and table descriptions live in a side map keyed by vector id,
//! persisted as `entries.json` next to the vector data when a path is set.
//!
//! # Example
//!
//! ```rust,ignore
//! let index = LocalIndex::new(Some("./data/vectors".into())).await?;
//! index.index_text_chunks("rest-1", "file-1", "Menu", &chunks).await?;
//! let hits = index.search_text("rest-1", &query, 5).await?;
//! ```

use crate::types::{AppError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::vectorstore::{DocumentIndex, EmbeddedChunk, TableHit, TextHit};
use ares_vector::types::MetadataValue;
use ares_vector::{Config, DistanceMetric, VectorDb, VectorMetadata};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum IndexedEntry {
    Text {
        file_id: String,
        text: String,
        summary: String,
    },
    Table {
        file_id: String,
        table_name: String,
        description: String,
    },
}

impl IndexedEntry {
    fn file_id(&self) -> &str {
        match self {
            IndexedEntry::Text { file_id, .. } | IndexedEntry::Table { file_id, .. } => file_id,
        }
    }
}

type EntryMap = HashMap<String, HashMap<String, IndexedEntry>>;

/// Pure Rust document index using the HNSW algorithm.
pub struct LocalIndex {
    /// The underlying vector database (Clone, Arc inside)
    db: VectorDb,
    /// Storage path (None for in-memory)
    path: Option<PathBuf>,
    /// collection -> vector id -> entry
    entries: Arc<RwLock<EntryMap>>,
}

fn text_collection(restaurant_id: &str) -> String {
    format!("r_{}_text", restaurant_id)
}

fn table_collection(restaurant_id: &str) -> String {
    format!("r_{}_tables", restaurant_id)
}

impl LocalIndex {
    /// Open the index. `None` keeps everything in memory.
    pub async fn new(path: Option<String>) -> Result<Self> {
        let path_buf = path.map(PathBuf::from);

        let config = match path_buf {
            Some(ref p) => Config::persistent(p.to_string_lossy().to_string()),
            None => Config::memory(),
        };

        let db = VectorDb::open(config).await.map_err(|e| {
            AppError::Configuration(format!("Failed to initialize vector index: {}", e))
        })?;

        let index = Self {
            db,
            path: path_buf,
            entries: Arc::new(RwLock::new(HashMap::new())),
        };

        if let Some(ref path) = index.path {
            index.load_entries(path).await?;
        }

        Ok(index)
    }

    async fn load_entries(&self, path: &Path) -> Result<()> {
        let entries_path = path.join("entries.json");
        if entries_path.exists() {
            let data = tokio::fs::read_to_string(&entries_path).await.map_err(|e| {
                AppError::Configuration(format!("Failed to read index entries: {}", e))
            })?;

            let loaded: EntryMap = serde_json::from_str(&data).map_err(|e| {
                AppError::Configuration(format!("Failed to parse index entries: {}", e))
            })?;

            *self.entries.write() = loaded;
        }
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        // Serialize before awaiting so the lock is not held across it
        let data = {
            let entries = self.entries.read();
            serde_json::to_string(&*entries)
                .map_err(|e| AppError::Internal(format!("Failed to serialize entries: {}", e)))?
        };

        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create index directory: {}", e)))?;
        tokio::fs::write(path.join("entries.json"), data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write index entries: {}", e)))?;

        self.db
            .persist()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to persist vectors: {}", e)))?;

        Ok(())
    }

    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.db.collection_exists(name) {
            return Ok(());
        }

        if let Err(e) = self
            .db
            .create_collection(name, dimensions, DistanceMetric::Cosine)
            .await
        {
            // Lost a creation race with a concurrent ingest
            if !self.db.collection_exists(name) {
                return Err(AppError::Internal(format!(
                    "Failed to create collection {}: {}",
                    name, e
                )));
            }
        }

        Ok(())
    }

    async fn search_collection(
        &self,
        collection: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(IndexedEntry, f32)>> {
        if k == 0 || !self.db.collection_exists(collection) {
            return Ok(Vec::new());
        }

        let results = self
            .db
            .search(collection, query_embedding, k)
            .await
            .map_err(|e| AppError::Internal(format!("Search failed: {}", e)))?;

        let entries = self.entries.read();
        let Some(collection_entries) = entries.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<(IndexedEntry, f32)> = results
            .into_iter()
            .filter_map(|r| {
                collection_entries
                    .get(&r.id)
                    .map(|entry| (entry.clone(), r.score))
            })
            .collect();

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);

        Ok(hits)
    }

    async fn delete_where<F>(&self, collection: &str, predicate: F) -> Result<usize>
    where
        F: Fn(&IndexedEntry) -> bool,
    {
        let ids: Vec<String> = {
            let entries = self.entries.read();
            match entries.get(collection) {
                Some(map) => map
                    .iter()
                    .filter(|(_, entry)| predicate(entry))
                    .map(|(id, _)| id.clone())
                    .collect(),
                None => return Ok(0),
            }
        };

        if ids.is_empty() {
            return Ok(0);
        }

        if self.db.collection_exists(collection) {
            let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            self.db
                .delete_batch(collection, &id_refs)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to delete vectors: {}", e)))?;
        }

        let mut entries = self.entries.write();
        if let Some(map) = entries.get_mut(collection) {
            for id in &ids {
                map.remove(id);
            }
        }

        Ok(ids.len())
    }
}

#[async_trait]
impl DocumentIndex for LocalIndex {
    fn provider_name(&self) -> &'static str {
        "ares-vector"
    }

    async fn index_text_chunks(
        &self,
        restaurant_id: &str,
        file_id: &str,
        summary: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize> {
        let Some(first) = chunks.first() else {
            return Ok(0);
        };

        let collection = text_collection(restaurant_id);
        self.ensure_collection(&collection, first.embedding.len())
            .await?;

        let ids: Vec<String> = (0..chunks.len())
            .map(|i| format!("{}:{}", file_id, i))
            .collect();

        let batch = ids.iter().zip(chunks).map(|(id, chunk)| {
            let meta = VectorMetadata::from_pairs([(
                "file_id",
                MetadataValue::String(file_id.to_string()),
            )]);
            (id.as_str(), chunk.embedding.as_slice(), Some(meta))
        });

        let inserted = self
            .db
            .insert_batch(&collection, batch)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to insert vectors: {}", e)))?;

        {
            let mut entries = self.entries.write();
            let map = entries.entry(collection).or_default();
            for (id, chunk) in ids.into_iter().zip(chunks) {
                map.insert(
                    id,
                    IndexedEntry::Text {
                        file_id: file_id.to_string(),
                        text: chunk.text.clone(),
                        summary: summary.to_string(),
                    },
                );
            }
        }

        self.persist().await?;

        Ok(inserted)
    }

    async fn index_table(
        &self,
        restaurant_id: &str,
        file_id: &str,
        table_name: &str,
        description: &str,
        embedding: &[f32],
    ) -> Result<()> {
        let collection = table_collection(restaurant_id);
        self.ensure_collection(&collection, embedding.len()).await?;

        let meta = VectorMetadata::from_pairs([
            ("file_id", MetadataValue::String(file_id.to_string())),
            ("table_name", MetadataValue::String(table_name.to_string())),
        ]);

        self.db
            .insert(&collection, file_id, embedding, Some(meta))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to insert vector: {}", e)))?;

        self.entries.write().entry(collection).or_default().insert(
            file_id.to_string(),
            IndexedEntry::Table {
                file_id: file_id.to_string(),
                table_name: table_name.to_string(),
                description: description.to_string(),
            },
        );

        self.persist().await
    }

    async fn search_text(
        &self,
        restaurant_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<TextHit>> {
        let hits = self
            .search_collection(&text_collection(restaurant_id), query_embedding, k)
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|(entry, score)| match entry {
                IndexedEntry::Text {
                    file_id,
                    text,
                    summary,
                } => Some(TextHit {
                    file_id,
                    text,
                    summary,
                    score,
                }),
                IndexedEntry::Table { .. } => None,
            })
            .collect())
    }

    async fn search_tables(
        &self,
        restaurant_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<TableHit>> {
        let hits = self
            .search_collection(&table_collection(restaurant_id), query_embedding, k)
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|(entry, score)| match entry {
                IndexedEntry::Table {
                    file_id,
                    table_name,
                    description,
                } => Some(TableHit {
                    file_id,
                    table_name,
                    description,
                    score,
                }),
                IndexedEntry::Text { .. } => None,
            })
            .collect())
    }

    async fn delete_file(&self, restaurant_id: &str, file_id: &str) -> Result<usize> {
        let mut removed = 0;
        for collection in [text_collection(restaurant_id), table_collection(restaurant_id)] {
            removed += self
                .delete_where(&collection, |entry| entry.file_id() == file_id)
                .await?;
        }

        self.persist().await?;
        Ok(removed)
    }

    async fn delete_restaurant(&self, restaurant_id: &str) -> Result<()> {
        for collection in [text_collection(restaurant_id), table_collection(restaurant_id)] {
            if self.db.collection_exists(&collection) {
                self.db.delete_collection(&collection).await.map_err(|e| {
                    AppError::Internal(format!("Failed to delete collection: {}", e))
                })?;
            }
            self.entries.write().remove(&collection);
        }

        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            text: text.to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_text_search_ranks_closest_first() {
        let index = LocalIndex::new(None).await.expect("index");

        index
            .index_text_chunks(
                "rest-a",
                "file-1",
                "Menu and opening hours",
                &[
                    chunk("We open at 11am", vec![1.0, 0.0, 0.0]),
                    chunk("Feijoada on Saturdays", vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .expect("index chunks");

        let hits = index
            .search_text("rest-a", &[0.9, 0.1, 0.0], 1)
            .await
            .expect("search");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "We open at 11am");
        assert_eq!(hits[0].summary, "Menu and opening hours");
        assert_eq!(hits[0].file_id, "file-1");
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_restaurant() {
        let index = LocalIndex::new(None).await.expect("index");

        index
            .index_text_chunks("rest-a", "file-1", "A", &[chunk("secret of A", vec![1.0, 0.0])])
            .await
            .expect("index a");

        let hits = index
            .search_text("rest-b", &[1.0, 0.0], 5)
            .await
            .expect("search");
        assert!(hits.is_empty());

        let tables = index
            .search_tables("rest-a", &[1.0, 0.0], 5)
            .await
            .expect("search tables");
        assert!(tables.is_empty());
    }

    #[tokio::test]
    async fn test_table_index_and_delete_file() {
        let index = LocalIndex::new(None).await.expect("index");

        index
            .index_table("rest-a", "file-9", "vendas_ab12", "## File description", &[0.0, 1.0])
            .await
            .expect("index table");
        index
            .index_text_chunks("rest-a", "file-1", "doc", &[chunk("text", vec![1.0, 0.0])])
            .await
            .expect("index text");

        let tables = index
            .search_tables("rest-a", &[0.0, 1.0], 1)
            .await
            .expect("search");
        assert_eq!(tables[0].table_name, "vendas_ab12");

        let removed = index.delete_file("rest-a", "file-9").await.expect("delete");
        assert_eq!(removed, 1);
        assert!(index
            .search_tables("rest-a", &[0.0, 1.0], 1)
            .await
            .expect("search")
            .is_empty());

        // Other files are untouched
        assert_eq!(
            index.search_text("rest-a", &[1.0, 0.0], 1).await.expect("search").len(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_restaurant_removes_everything() {
        let index = LocalIndex::new(None).await.expect("index");
        index
            .index_text_chunks("rest-a", "file-1", "doc", &[chunk("text", vec![1.0, 0.0])])
            .await
            .expect("index text");

        index.delete_restaurant("rest-a").await.expect("delete");

        assert!(index
            .search_text("rest-a", &[1.0, 0.0], 5)
            .await
            .expect("search")
            .is_empty());
    }

    #[tokio::test]
    async fn test_persistent_index_reloads_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vectors").to_string_lossy().to_string();

        {
            let index = LocalIndex::new(Some(path.clone())).await.expect("index");
            index
                .index_text_chunks("rest-a", "file-1", "doc", &[chunk("kept", vec![1.0, 0.0])])
                .await
                .expect("index text");
        }

        let reopened = LocalIndex::new(Some(path)).await.expect("reopen");
        let hits = reopened
            .search_text("rest-a", &[1.0, 0.0], 1)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "kept");
    }
}
