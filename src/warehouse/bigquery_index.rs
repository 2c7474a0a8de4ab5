use super::{BigQueryWarehouse, ParamValue, QueryParam, Warehouse};
use crate::db::vectorstore::{DocumentIndex, EmbeddedChunk, TableHit, TextHit};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Document index stored in two BigQuery tables and searched with
/// `VECTOR_SEARCH`.
///
/// Text table columns: `fileId, restaurantId, chunkIndex, text, summary,
/// embedding, createdAt`. Tabular table columns: `fileId, restaurantId,
/// tableName, text, embedding, createdAt`.
pub struct BigQueryIndex {
    warehouse: Arc<BigQueryWarehouse>,
    text_table: String,
    tabular_table: String,
}

impl BigQueryIndex {
    pub fn new(warehouse: Arc<BigQueryWarehouse>, text_table: String, tabular_table: String) -> Self {
        Self {
            warehouse,
            text_table,
            tabular_table,
        }
    }

    /// `VECTOR_SEARCH` over one table, restricted to a restaurant.
    pub fn search_sql(table: &str, columns: &[&str], k: usize) -> String {
        let base_columns = columns.join(", ");
        let selected = columns
            .iter()
            .map(|c| format!("base.{c} AS {c}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {selected}, distance
FROM VECTOR_SEARCH(
  (SELECT {base_columns}, embedding FROM {table} WHERE restaurantId = @restaurant_id),
  'embedding',
  (SELECT @query_embedding AS embedding),
  'embedding',
  top_k => {k},
  distance_type => 'COSINE'
)
ORDER BY distance ASC"
        )
    }

    async fn search(
        &self,
        table: &str,
        columns: &[&str],
        restaurant_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<Map<String, Value>>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let sql = Self::search_sql(&self.warehouse.qualified_table(table), columns, k);
        let params = [
            QueryParam::restaurant(restaurant_id),
            QueryParam {
                name: "query_embedding".to_string(),
                value: ParamValue::FloatArray(query_embedding.to_vec()),
            },
        ];
        Ok(self.warehouse.query(&sql, &params).await?.rows)
    }

    async fn delete_where(&self, table: &str, filter: &str, params: &[QueryParam]) -> Result<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.warehouse.qualified_table(table),
            filter
        );
        let result = self.warehouse.query(&sql, params).await?;
        Ok(result.affected_rows.unwrap_or(0) as usize)
    }
}

fn string_field(row: &Map<String, Value>, name: &str) -> String {
    row.get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Cosine distance in [0, 2] mapped to a similarity score.
fn score(row: &Map<String, Value>) -> f32 {
    let distance = row.get("distance").and_then(Value::as_f64).unwrap_or(1.0);
    (1.0 - distance) as f32
}

#[async_trait]
impl DocumentIndex for BigQueryIndex {
    fn provider_name(&self) -> &'static str {
        "bigquery"
    }

    async fn index_text_chunks(
        &self,
        restaurant_id: &str,
        file_id: &str,
        summary: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize> {
        let created_at = Utc::now().to_rfc3339();
        let rows: Vec<Value> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                json!({
                    "fileId": file_id,
                    "restaurantId": restaurant_id,
                    "chunkIndex": i,
                    "text": chunk.text,
                    "summary": summary,
                    "embedding": chunk.embedding,
                    "createdAt": created_at,
                })
            })
            .collect();

        self.warehouse.insert_rows(&self.text_table, rows).await?;
        Ok(chunks.len())
    }

    async fn index_table(
        &self,
        restaurant_id: &str,
        file_id: &str,
        table_name: &str,
        description: &str,
        embedding: &[f32],
    ) -> Result<()> {
        let row = json!({
            "fileId": file_id,
            "restaurantId": restaurant_id,
            "tableName": table_name,
            "text": description,
            "embedding": embedding,
            "createdAt": Utc::now().to_rfc3339(),
        });
        self.warehouse
            .insert_rows(&self.tabular_table, vec![row])
            .await
    }

    async fn search_text(
        &self,
        restaurant_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<TextHit>> {
        let rows = self
            .search(
                &self.text_table,
                &["fileId", "text", "summary"],
                restaurant_id,
                query_embedding,
                k,
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| TextHit {
                file_id: string_field(row, "fileId"),
                text: string_field(row, "text"),
                summary: string_field(row, "summary"),
                score: score(row),
            })
            .collect())
    }

    async fn search_tables(
        &self,
        restaurant_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<TableHit>> {
        let rows = self
            .search(
                &self.tabular_table,
                &["fileId", "tableName", "text"],
                restaurant_id,
                query_embedding,
                k,
            )
            .await?;

        rows.iter()
            .map(|row| {
                let table_name = string_field(row, "tableName");
                if table_name.is_empty() {
                    return Err(AppError::Warehouse(
                        "Tabular embedding row without tableName".to_string(),
                    ));
                }
                Ok(TableHit {
                    file_id: string_field(row, "fileId"),
                    table_name,
                    description: string_field(row, "text"),
                    score: score(row),
                })
            })
            .collect()
    }

    async fn delete_file(&self, restaurant_id: &str, file_id: &str) -> Result<usize> {
        let params = [
            QueryParam::restaurant(restaurant_id),
            QueryParam::string("file_id", file_id),
        ];
        let filter = "restaurantId = @restaurant_id AND fileId = @file_id";
        let text = self.delete_where(&self.text_table, filter, &params).await?;
        let tables = self
            .delete_where(&self.tabular_table, filter, &params)
            .await?;
        Ok(text + tables)
    }

    async fn delete_restaurant(&self, restaurant_id: &str) -> Result<()> {
        let params = [QueryParam::restaurant(restaurant_id)];
        let filter = "restaurantId = @restaurant_id";
        self.delete_where(&self.text_table, filter, &params).await?;
        self.delete_where(&self.tabular_table, filter, &params)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_sql_scopes_by_restaurant() {
        let sql = BigQueryIndex::search_sql("`p.d.embeddings_text`", &["fileId", "text"], 5);
        assert!(sql.contains("WHERE restaurantId = @restaurant_id"));
        assert!(sql.contains("SELECT base.fileId AS fileId, base.text AS text, distance"));
        assert!(sql.contains("top_k => 5"));
        assert!(sql.contains("distance_type => 'COSINE'"));
        assert!(sql.contains("FROM `p.d.embeddings_text`"));
    }

    #[test]
    fn test_score_from_distance() {
        let mut row = Map::new();
        row.insert("distance".into(), json!(0.25));
        assert_eq!(score(&row), 0.75);
    }
}
