use super::{load_columns, ParamValue, QueryParam, QueryResult, SqlDialect, Warehouse};
use crate::db::{ConnectionSource, DbConnection};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use libsql::{params::Params, Builder, Connection, TransactionBehavior, Value};
use serde_json::{Map, Number, Value as Json};

/// SQLite warehouse over libsql.
///
/// Loaded tables keep CSV cells as typed columns: a column whose non-empty
/// cells all parse as integers is `INTEGER`, else as floats `REAL`, else
/// `TEXT`. Empty cells are stored as `NULL`.
pub struct LocalWarehouse {
    connections: ConnectionSource,
}

impl LocalWarehouse {
    pub async fn new_local(path: &str) -> Result<Self> {
        let db = Builder::new_local(path).build().await.map_err(|e| {
            AppError::Warehouse(format!("Failed to open warehouse {}: {}", path, e))
        })?;
        let connections = ConnectionSource::local(db, path)
            .map_err(|e| AppError::Warehouse(format!("Failed to get connection: {}", e)))?;

        Ok(Self { connections })
    }

    pub async fn new_memory() -> Result<Self> {
        Self::new_local(":memory:").await
    }

    async fn connection(&self) -> Result<DbConnection> {
        self.connections
            .get()
            .await
            .map_err(|e| AppError::Warehouse(format!("Failed to get connection: {}", e)))
    }

    fn quote(name: &str) -> String {
        SqlDialect::Sqlite.quote_ident(name)
    }
}

async fn columns_of(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut rows = conn
        .query(
            &format!("PRAGMA table_info({})", LocalWarehouse::quote(table)),
            (),
        )
        .await
        .map_err(|e| AppError::Warehouse(format!("Failed to inspect {}: {}", table, e)))?;

    let mut columns = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| AppError::Warehouse(e.to_string()))?
    {
        columns.push(
            row.get::<String>(1)
                .map_err(|e| AppError::Warehouse(e.to_string()))?,
        );
    }
    Ok(columns)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let mut kind = ColumnType::Integer;
        for cell in cells.filter(|c| !c.is_empty()) {
            if kind == ColumnType::Integer && cell.parse::<i64>().is_err() {
                kind = ColumnType::Real;
            }
            if kind == ColumnType::Real && cell.parse::<f64>().is_err() {
                return ColumnType::Text;
            }
        }
        kind
    }

    fn value(&self, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnType::Integer => cell
                .parse::<i64>()
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::Text(cell.to_string())),
            ColumnType::Real => cell
                .parse::<f64>()
                .map(Value::Real)
                .unwrap_or_else(|_| Value::Text(cell.to_string())),
            ColumnType::Text => Value::Text(cell.to_string()),
        }
    }
}

fn bind(params: &[QueryParam]) -> Params {
    if params.is_empty() {
        return Params::None;
    }
    Params::Named(
        params
            .iter()
            .map(|p| {
                let value = match &p.value {
                    ParamValue::String(s) => Value::Text(s.clone()),
                    ParamValue::Int64(i) => Value::Integer(*i),
                    ParamValue::Float64(f) => Value::Real(*f),
                    ParamValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
                    ParamValue::FloatArray(v) => {
                        Value::Text(serde_json::to_string(v).unwrap_or_default())
                    }
                };
                (format!("@{}", p.name), value)
            })
            .collect(),
    )
}

fn to_json(value: Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Integer(i) => Json::Number(i.into()),
        Value::Real(f) => Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null),
        Value::Text(s) => Json::String(s),
        Value::Blob(b) => Json::String(hex::encode(b)),
    }
}

#[async_trait]
impl Warehouse for LocalWarehouse {
    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<QueryResult> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(sql, bind(params))
            .await
            .map_err(|e| AppError::Warehouse(e.to_string()))?;

        let columns: Vec<String> = (0..rows.column_count())
            .map(|i| rows.column_name(i).unwrap_or_default().to_string())
            .collect();

        let mut result = QueryResult {
            columns,
            ..Default::default()
        };

        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Warehouse(e.to_string()))?
        {
            let mut map = Map::new();
            for (i, column) in result.columns.iter().enumerate() {
                let value = row
                    .get_value(i as i32)
                    .map_err(|e| AppError::Warehouse(e.to_string()))?;
                map.insert(column.clone(), to_json(value));
            }
            result.rows.push(map);
        }

        Ok(result)
    }

    async fn load_csv(
        &self,
        table: &str,
        restaurant_id: &str,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<usize> {
        let columns = load_columns(headers);
        let types: Vec<ColumnType> = (0..headers.len())
            .map(|i| {
                ColumnType::infer(rows.iter().map(move |r| r.get(i).map_or("", |c| c.as_str())))
            })
            .collect();

        let placeholders = vec!["?"; columns.len()].join(", ");
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            Self::quote(table),
            columns
                .iter()
                .map(|c| Self::quote(c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders
        );

        let conn = self.connection().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| AppError::Warehouse(format!("Failed to begin transaction: {}", e)))?;

        let loaded = async {
            let existing = columns_of(&tx, table).await?;
            if existing.is_empty() {
                let mut defs = vec![format!("{} TEXT NOT NULL", Self::quote(&columns[0]))];
                for (name, kind) in columns[1..].iter().zip(&types) {
                    defs.push(format!("{} {}", Self::quote(name), kind.sql()));
                }
                tx.execute(
                    &format!("CREATE TABLE {} ({})", Self::quote(table), defs.join(", ")),
                    (),
                )
                .await
                .map_err(|e| AppError::Warehouse(format!("Failed to create {}: {}", table, e)))?;
            } else if existing.len() != columns.len() {
                return Err(AppError::InvalidInput(format!(
                    "Table {} has {} columns, upload has {}",
                    table,
                    existing.len(),
                    columns.len()
                )));
            }

            for row in rows {
                let mut values = Vec::with_capacity(columns.len());
                values.push(Value::Text(restaurant_id.to_string()));
                for (i, kind) in types.iter().enumerate() {
                    values.push(kind.value(row.get(i).map_or("", |c| c.as_str())));
                }
                tx.execute(&insert, Params::Positional(values))
                    .await
                    .map_err(|e| AppError::Warehouse(format!("Failed to insert row: {}", e)))?;
            }
            Ok::<(), AppError>(())
        }
        .await;

        if let Err(e) = loaded {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(table, error = %rollback, "rollback of CSV load failed");
            }
            return Err(e);
        }
        tx.commit()
            .await
            .map_err(|e| AppError::Warehouse(format!("Failed to commit load: {}", e)))?;

        tracing::debug!(table, rows = rows.len(), "loaded CSV into local warehouse");
        Ok(rows.len())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.connection().await?;
        columns_of(&conn, table).await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.connection()
            .await?
            .execute(&format!("DROP TABLE IF EXISTS {}", Self::quote(table)), ())
            .await
            .map_err(|e| AppError::Warehouse(format!("Failed to drop {}: {}", table, e)))?;
        Ok(())
    }

    async fn delete_rows(&self, table: &str, restaurant_id: &str) -> Result<()> {
        let conn = self.connection().await?;
        if columns_of(&conn, table).await?.is_empty() {
            return Ok(());
        }
        conn.execute(
                &format!(
                    "DELETE FROM {} WHERE {} = ?",
                    Self::quote(table),
                    Self::quote(super::RESTAURANT_COLUMN)
                ),
                [restaurant_id],
            )
            .await
            .map_err(|e| AppError::Warehouse(format!("Failed to delete rows: {}", e)))?;
        Ok(())
    }

    fn qualified_table(&self, name: &str) -> String {
        Self::quote(name)
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }
}
