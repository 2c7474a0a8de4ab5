//! Tabular warehouse
//!
//! CSV uploads land in a SQL warehouse so numeric questions can be answered
//! with generated queries. Two backends implement [`Warehouse`]:
//!
//! - [`LocalWarehouse`]: one libsql (SQLite) database, the default
//! - [`BigQueryWarehouse`]: Google BigQuery through its REST API
//!
//! Both accept named parameters written as `@name` in the SQL text, so the
//! same tenant filter (`restaurant_id = @restaurant_id`) works everywhere.

pub mod bigquery;
pub mod bigquery_index;
pub mod gcp_auth;
pub mod local;

pub use bigquery::{BigQuerySettings, BigQueryWarehouse};
pub use bigquery_index::BigQueryIndex;
pub use gcp_auth::GoogleAuth;
pub use local::LocalWarehouse;

use crate::types::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Name of the tenant column prepended to every loaded table.
pub const RESTAURANT_COLUMN: &str = "restaurant_id";

/// Name of the query parameter carrying the tenant id.
pub const RESTAURANT_PARAM: &str = "restaurant_id";

/// SQL flavour of a warehouse, used when prompting for SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Sqlite,
    BigQuery,
}

impl SqlDialect {
    pub fn name(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "SQLite",
            SqlDialect::BigQuery => "BigQuery Standard SQL",
        }
    }

    /// Quote a column or table identifier.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            SqlDialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
            SqlDialect::BigQuery => format!("`{}`", ident.replace('`', "")),
        }
    }

    /// Dialect-specific rules appended to SQL generation prompts.
    pub fn prompt_rules(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => {
                "- Quote column names with double quotes, e.g. \"valor_total\".\n\
                 - Dates are stored as 'YYYY-MM-DD' text; use strftime('%Y-%m', \"col\") to group by month.\n\
                 - There is no DATE_TRUNC or FORMAT_DATE in SQLite."
            }
            SqlDialect::BigQuery => {
                "- Quote column names with backticks, the same way the table name is quoted.\n\
                 - Use FORMAT_DATE('%Y-%m', `col`) or DATE_TRUNC(`col`, MONTH) to group by month.\n\
                 - Use SAFE_DIVIDE for ratios."
            }
        }
    }
}

/// A typed value bound to a named query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Int64(i64),
    Float64(f64),
    Date(NaiveDate),
    /// Bound as `ARRAY<FLOAT64>` on BigQuery and as JSON text on SQLite
    FloatArray(Vec<f32>),
}

/// Named query parameter, referenced as `@name` in SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParam {
    pub name: String,
    pub value: ParamValue,
}

impl QueryParam {
    pub fn string(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::String(value.into()),
        }
    }

    pub fn date(name: &str, value: NaiveDate) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Date(value),
        }
    }

    pub fn int(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Int64(value),
        }
    }

    /// The `restaurant_id` tenant filter.
    pub fn restaurant(restaurant_id: &str) -> Self {
        Self::string(RESTAURANT_PARAM, restaurant_id)
    }
}

/// Rows of a query, each keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    /// Rows changed by a DML statement, when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// SQL warehouse holding restaurants' tabular uploads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a read query with named parameters.
    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<QueryResult>;

    /// Append CSV rows to `table`, creating it when missing. Each row is
    /// prefixed with the restaurant id column. Returns the number of rows loaded.
    async fn load_csv(
        &self,
        table: &str,
        restaurant_id: &str,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<usize>;

    /// Column names of a table, empty when the table does not exist.
    async fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Drop a table. Dropping a missing table is not an error.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Delete one restaurant's rows from a shared table.
    async fn delete_rows(&self, table: &str, restaurant_id: &str) -> Result<()>;

    /// The table reference to use in a `FROM` clause.
    fn qualified_table(&self, name: &str) -> String;

    fn dialect(&self) -> SqlDialect;
}

/// Column names for a loaded CSV: the tenant column first, then the headers
/// with blanks named `column_{n}` and repeats suffixed `_2`, `_3`, ...
pub fn load_columns(headers: &[String]) -> Vec<String> {
    let mut columns = vec![RESTAURANT_COLUMN.to_string()];
    for (i, header) in headers.iter().enumerate() {
        let base = match header.trim() {
            "" => format!("column_{}", i + 1),
            h => h.to_string(),
        };
        let mut name = base.clone();
        let mut n = 2;
        while columns.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        columns.push(name);
    }
    columns
}
