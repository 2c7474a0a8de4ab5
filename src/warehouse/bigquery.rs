//! BigQuery warehouse over the v2 REST API
//!
//! Queries go through `jobs.query` with named parameters and standard SQL.
//! When the job does not finish within the synchronous wait, results are
//! polled with `getQueryResults` until the configured timeout. CSV uploads
//! use a multipart load job with schema autodetection.

use super::{load_columns, GoogleAuth, ParamValue, QueryParam, QueryResult, SqlDialect, Warehouse};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Rows requested per result page.
const PAGE_SIZE: u32 = 10_000;
/// Server-side wait of each `jobs.query` / `getQueryResults` call.
const POLL_WAIT_MS: u64 = 10_000;
const MULTIPART_BOUNDARY: &str = "foodatlas_load_boundary";

/// Connection settings for [`BigQueryWarehouse`].
#[derive(Debug, Clone)]
pub struct BigQuerySettings {
    pub api_base: String,
    pub project_id: String,
    pub dataset: String,
    pub location: String,
    pub query_timeout: Duration,
}

pub struct BigQueryWarehouse {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
    settings: BigQuerySettings,
}

// ============= Wire types =============

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct TableResource {
    #[serde(default)]
    schema: Option<TableSchema>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<Value>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    num_dml_affected_rows: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<Value>,
}

impl BigQueryWarehouse {
    pub fn new(settings: BigQuerySettings, auth: Arc<GoogleAuth>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.query_timeout + Duration::from_secs(POLL_WAIT_MS / 1000))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            auth,
            settings,
        })
    }

    pub fn settings(&self) -> &BigQuerySettings {
        &self.settings
    }

    fn project_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.project_id
        )
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/datasets/{}/tables/{}",
            self.project_url(),
            self.settings.dataset,
            table
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let token = self.auth.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Warehouse(format!("BigQuery request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body["error"]["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("BigQuery returned {}", status));
        Err(AppError::Warehouse(message))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Warehouse(format!("Invalid BigQuery response: {}", e)))
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let mut query: Vec<(&str, String)> = vec![
            ("maxResults", PAGE_SIZE.to_string()),
            ("timeoutMs", POLL_WAIT_MS.to_string()),
        ];
        let location = job
            .location
            .clone()
            .unwrap_or_else(|| self.settings.location.clone());
        query.push(("location", location));
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        self.send_json(
            self.http
                .get(format!("{}/queries/{}", self.project_url(), job.job_id))
                .query(&query),
        )
        .await
    }

    /// Stream rows into a table with `tabledata.insertAll`.
    pub async fn insert_rows(&self, table: &str, rows: Vec<Value>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let body = json!({
            "kind": "bigquery#tableDataInsertAllRequest",
            "rows": rows.into_iter().map(|r| json!({ "json": r })).collect::<Vec<_>>(),
        });

        let response: InsertAllResponse = self
            .send_json(
                self.http
                    .post(format!("{}/insertAll", self.table_url(table)))
                    .json(&body),
            )
            .await?;

        if let Some(first) = response.insert_errors.first() {
            let message = first["errors"][0]["message"]
                .as_str()
                .unwrap_or("row rejected");
            return Err(AppError::Warehouse(format!(
                "{} of the rows were rejected: {}",
                response.insert_errors.len(),
                message
            )));
        }
        Ok(())
    }

    async fn wait_for_job(&self, mut job: Job) -> Result<()> {
        let deadline = Instant::now() + self.settings.query_timeout;
        loop {
            if job.status.state == "DONE" {
                return match job.status.error_result {
                    Some(err) => Err(AppError::Warehouse(err.message)),
                    None => Ok(()),
                };
            }
            if Instant::now() >= deadline {
                return Err(AppError::Warehouse(format!(
                    "Job {} did not finish within {:?}",
                    job.job_reference.job_id, self.settings.query_timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;

            let location = job
                .job_reference
                .location
                .clone()
                .unwrap_or_else(|| self.settings.location.clone());
            job = self
                .send_json(
                    self.http
                        .get(format!(
                            "{}/jobs/{}",
                            self.project_url(),
                            job.job_reference.job_id
                        ))
                        .query(&[("location", location)]),
                )
                .await?;
        }
    }
}

// ============= Encoding and decoding =============

fn query_parameter(param: &QueryParam) -> Value {
    let scalar = |kind: &str, value: String| {
        json!({
            "name": param.name,
            "parameterType": { "type": kind },
            "parameterValue": { "value": value },
        })
    };
    match &param.value {
        ParamValue::String(s) => scalar("STRING", s.clone()),
        ParamValue::Int64(i) => scalar("INT64", i.to_string()),
        ParamValue::Float64(f) => scalar("FLOAT64", f.to_string()),
        ParamValue::Date(d) => scalar("DATE", d.format("%Y-%m-%d").to_string()),
        ParamValue::FloatArray(values) => json!({
            "name": param.name,
            "parameterType": { "type": "ARRAY", "arrayType": { "type": "FLOAT64" } },
            "parameterValue": {
                "arrayValues": values
                    .iter()
                    .map(|v| json!({ "value": v.to_string() }))
                    .collect::<Vec<_>>()
            },
        }),
    }
}

/// Decode one `{f: [{v}]}` row into a map keyed by field name.
pub fn decode_row(fields: &[FieldSchema], row: &Value) -> Map<String, Value> {
    let cells = row["f"].as_array().map(Vec::as_slice).unwrap_or_default();
    fields
        .iter()
        .zip(cells)
        .map(|(field, cell)| (field.name.clone(), decode_field(field, &cell["v"])))
        .collect()
}

fn decode_field(field: &FieldSchema, value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    if field.mode.as_deref() == Some("REPEATED") {
        let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
        return Value::Array(
            items
                .iter()
                .map(|item| decode_scalar(field, &item["v"]))
                .collect(),
        );
    }
    decode_scalar(field, value)
}

fn decode_scalar(field: &FieldSchema, value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match field.field_type.as_str() {
        "RECORD" | "STRUCT" => Value::Object(decode_row(&field.fields, value)),
        _ => {
            let Some(text) = value.as_str() else {
                return value.clone();
            };
            match field.field_type.as_str() {
                "INTEGER" | "INT64" => text
                    .parse::<i64>()
                    .map(|i| Value::Number(i.into()))
                    .unwrap_or_else(|_| Value::String(text.to_string())),
                "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => text
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(text.to_string())),
                "BOOLEAN" | "BOOL" => Value::Bool(text.eq_ignore_ascii_case("true")),
                "TIMESTAMP" => text
                    .parse::<f64>()
                    .ok()
                    .and_then(|secs| {
                        DateTime::<Utc>::from_timestamp(
                            secs.trunc() as i64,
                            (secs.fract() * 1e9).round() as u32,
                        )
                    })
                    .map(|dt| Value::String(dt.to_rfc3339()))
                    .unwrap_or_else(|| Value::String(text.to_string())),
                _ => Value::String(text.to_string()),
            }
        }
    }
}

fn csv_bytes(restaurant_id: &str, headers: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(load_columns(headers))
        .map_err(|e| AppError::Internal(format!("Failed to encode CSV: {}", e)))?;
    for row in rows {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(restaurant_id);
        record.extend(row.iter().map(String::as_str));
        writer
            .write_record(record)
            .map_err(|e| AppError::Internal(format!("Failed to encode CSV: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to encode CSV: {}", e)))
}

fn multipart_related(metadata: &Value, csv: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(csv.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: text/csv\r\n\r\n",
            b = MULTIPART_BOUNDARY,
            meta = metadata
        )
        .as_bytes(),
    );
    body.extend_from_slice(csv);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<QueryResult> {
        let started = Instant::now();
        let deadline = started + self.settings.query_timeout;

        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "queryParameters": params.iter().map(query_parameter).collect::<Vec<_>>(),
            "timeoutMs": POLL_WAIT_MS,
            "maxResults": PAGE_SIZE,
            "location": self.settings.location,
        });

        let mut page: QueryResponse = self
            .send_json(
                self.http
                    .post(format!("{}/queries", self.project_url()))
                    .json(&body),
            )
            .await?;

        while !page.job_complete {
            if Instant::now() >= deadline {
                return Err(AppError::Warehouse(format!(
                    "Query did not finish within {:?}",
                    self.settings.query_timeout
                )));
            }
            let job = page.job_reference.as_ref().ok_or_else(|| {
                AppError::Warehouse("Incomplete query without a job reference".to_string())
            })?;
            page = self.get_query_results(job, None).await?;
        }

        let fields = page.schema.take().unwrap_or_default().fields;
        let mut result = QueryResult {
            columns: fields.iter().map(|f| f.name.clone()).collect(),
            rows: page.rows.iter().map(|r| decode_row(&fields, r)).collect(),
            affected_rows: page
                .num_dml_affected_rows
                .as_deref()
                .and_then(|n| n.parse().ok()),
        };

        let job_reference = page.job_reference.take();
        let mut page_token = page.page_token.take();
        while let (Some(token), Some(job)) = (page_token.take(), job_reference.as_ref()) {
            let next = self.get_query_results(job, Some(&token)).await?;
            result
                .rows
                .extend(next.rows.iter().map(|r| decode_row(&fields, r)));
            page_token = next.page_token;
        }

        tracing::debug!(
            rows = result.rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "BigQuery query finished"
        );
        Ok(result)
    }

    async fn load_csv(
        &self,
        table: &str,
        restaurant_id: &str,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<usize> {
        let csv = csv_bytes(restaurant_id, headers, rows)?;
        let metadata = json!({
            "configuration": {
                "load": {
                    "destinationTable": {
                        "projectId": self.settings.project_id,
                        "datasetId": self.settings.dataset,
                        "tableId": table,
                    },
                    "sourceFormat": "CSV",
                    "skipLeadingRows": 1,
                    "autodetect": true,
                    "writeDisposition": "WRITE_APPEND",
                }
            },
            "jobReference": {
                "projectId": self.settings.project_id,
                "location": self.settings.location,
            }
        });

        let url = format!(
            "{}/upload/bigquery/v2/projects/{}/jobs",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.project_id
        );
        let job: Job = self
            .send_json(
                self.http
                    .post(url)
                    .query(&[("uploadType", "multipart")])
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
                    )
                    .body(multipart_related(&metadata, &csv)),
            )
            .await?;

        self.wait_for_job(job).await?;
        tracing::info!(table, rows = rows.len(), "loaded CSV into BigQuery");
        Ok(rows.len())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(self.table_url(table))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Warehouse(format!("BigQuery request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(AppError::Warehouse(format!(
                "Failed to read table {}: {}",
                table,
                response.status()
            )));
        }

        let body: TableResource = response
            .json()
            .await
            .map_err(|e| AppError::Warehouse(format!("Invalid table resource: {}", e)))?;
        Ok(body
            .schema
            .map(|schema| schema.fields.into_iter().map(|f| f.name).collect())
            .unwrap_or_default())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .delete(self.table_url(table))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Warehouse(format!("BigQuery request failed: {}", e)))?;

        match response.status() {
            s if s.is_success() || s == reqwest::StatusCode::NOT_FOUND => Ok(()),
            s => Err(AppError::Warehouse(format!(
                "Failed to drop table {}: {}",
                table, s
            ))),
        }
    }

    async fn delete_rows(&self, table: &str, restaurant_id: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE `{}` = @{}",
            self.qualified_table(table),
            super::RESTAURANT_COLUMN,
            super::RESTAURANT_PARAM
        );
        match self.query(&sql, &[QueryParam::restaurant(restaurant_id)]).await {
            Ok(_) => Ok(()),
            Err(AppError::Warehouse(msg)) if msg.contains("Not found") => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn qualified_table(&self, name: &str) -> String {
        format!(
            "`{}.{}.{}`",
            self.settings.project_id, self.settings.dataset, name
        )
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::BigQuery
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, kind: &str) -> FieldSchema {
        FieldSchema {
            name: name.into(),
            field_type: kind.into(),
            mode: None,
            fields: vec![],
        }
    }

    #[test]
    fn test_decode_row_by_schema_type() {
        let mut tags = field("tags", "STRING");
        tags.mode = Some("REPEATED".into());
        let mut address = field("address", "RECORD");
        address.fields = vec![field("city", "STRING")];

        let fields = vec![
            field("n", "INTEGER"),
            field("total", "FLOAT"),
            field("ok", "BOOLEAN"),
            field("at", "TIMESTAMP"),
            field("day", "DATE"),
            tags,
            address,
            field("missing", "STRING"),
        ];
        let row = json!({"f": [
            {"v": "42"},
            {"v": "10.5"},
            {"v": "true"},
            {"v": "1.7040672E9"},
            {"v": "2024-01-01"},
            {"v": [{"v": "a"}, {"v": "b"}]},
            {"v": {"f": [{"v": "Recife"}]}},
            {"v": null}
        ]});

        let decoded = decode_row(&fields, &row);
        assert_eq!(decoded["n"], json!(42));
        assert_eq!(decoded["total"], json!(10.5));
        assert_eq!(decoded["ok"], json!(true));
        assert_eq!(decoded["at"], json!("2024-01-01T00:00:00+00:00"));
        assert_eq!(decoded["day"], json!("2024-01-01"));
        assert_eq!(decoded["tags"], json!(["a", "b"]));
        assert_eq!(decoded["address"], json!({"city": "Recife"}));
        assert_eq!(decoded["missing"], Value::Null);
    }

    #[test]
    fn test_query_parameter_encoding() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).expect("date");
        assert_eq!(
            query_parameter(&QueryParam::date("start", date)),
            json!({
                "name": "start",
                "parameterType": {"type": "DATE"},
                "parameterValue": {"value": "2024-05-01"}
            })
        );
    }

    #[test]
    fn test_csv_bytes_prefix_tenant_column() {
        let csv = csv_bytes(
            "r1",
            &["data".to_string(), "total".to_string()],
            &[vec!["2024-01-01".to_string(), "1,5".to_string()]],
        )
        .expect("csv");
        assert_eq!(
            String::from_utf8(csv).expect("utf8"),
            "restaurant_id,data,total\nr1,2024-01-01,\"1,5\"\n"
        );
    }
}
