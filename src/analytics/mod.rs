//! Dashboard analytics
//!
//! - [`break_even`] - ledger and warehouse break-even figures
//! - [`dashboard`] - average ticket and client count widgets
//!
//! Warehouse figures come from three shared dashboard tables (stock,
//! integrated report, delivery report). Rows are read filtered by restaurant
//! and aggregated here, so the same code runs on SQLite and BigQuery.

pub mod break_even;
pub mod dashboard;

use crate::types::Result;
use crate::utils::toml_config::WarehouseConfig;
use crate::warehouse::{QueryParam, Warehouse, RESTAURANT_COLUMN};
use chrono::{Datelike, Months, NaiveDate};
use serde_json::{Map, Value};

/// Date column shared by the dashboard tables.
pub const DATE_COLUMN: &str = "data";

/// Names of the shared dashboard tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardTables {
    pub stock: String,
    pub integrated: String,
    pub delivery: String,
}

impl DashboardTables {
    pub fn from_config(config: &WarehouseConfig) -> Self {
        Self {
            stock: config.stock_table.clone(),
            integrated: config.integrated_table.clone(),
            delivery: config.delivery_table.clone(),
        }
    }

    pub fn all(&self) -> Vec<String> {
        vec![
            self.stock.clone(),
            self.integrated.clone(),
            self.delivery.clone(),
        ]
    }
}

// ============= Month helpers =============

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month before the one containing `date`.
pub fn previous_month_start(date: NaiveDate) -> NaiveDate {
    let start = month_start(date);
    start.checked_sub_months(Months::new(1)).unwrap_or(start)
}

/// Last day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    month_start(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// `YYYY-MM` of a date.
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// `YYYY-MM` prefix of a date-like cell (`2024-05-03`, RFC 3339 timestamps).
pub(crate) fn month_of(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?;
    let prefix = text.get(..7)?;
    let bytes = prefix.as_bytes();
    let well_formed = bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit);
    well_formed.then(|| prefix.to_string())
}

/// A numeric cell, accepting numbers and numeric strings. Anything else is 0.
pub(crate) fn number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<f64>()
                .or_else(|_| s.replace(',', ".").parse::<f64>())
                .unwrap_or(0.0)
        }
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============= Warehouse reads =============

/// Rows of one restaurant from a dashboard table, keyed by the requested
/// column names.
///
/// A missing table yields no rows, as does a table without the date column.
/// Requested columns the table lacks are left out of the rows.
pub(crate) async fn fetch_rows(
    warehouse: &dyn Warehouse,
    table: &str,
    columns: &[&str],
    restaurant_id: &str,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<Map<String, Value>>> {
    let existing = warehouse.table_columns(table).await?;
    if existing.is_empty() {
        tracing::debug!(table, "dashboard table not loaded");
        return Ok(Vec::new());
    }

    let find = |wanted: &str| {
        existing
            .iter()
            .find(|c| c.eq_ignore_ascii_case(wanted))
            .cloned()
    };

    let Some(date_column) = find(DATE_COLUMN) else {
        tracing::warn!(table, "dashboard table has no '{}' column", DATE_COLUMN);
        return Ok(Vec::new());
    };

    let dialect = warehouse.dialect();
    let select: Vec<String> = columns
        .iter()
        .filter_map(|wanted| {
            find(wanted).map(|actual| {
                format!(
                    "{} AS {}",
                    dialect.quote_ident(&actual),
                    dialect.quote_ident(wanted)
                )
            })
        })
        .collect();

    let mut sql = format!(
        "SELECT {} FROM {} WHERE {} = @restaurant_id",
        select.join(", "),
        warehouse.qualified_table(table),
        dialect.quote_ident(RESTAURANT_COLUMN),
    );
    let mut params = vec![QueryParam::restaurant(restaurant_id)];

    if let Some((start, end)) = range {
        sql.push_str(&format!(
            " AND DATE({}) BETWEEN DATE(@start) AND DATE(@end)",
            dialect.quote_ident(&date_column)
        ));
        params.push(QueryParam::date("start", start));
        params.push(QueryParam::date("end", end));
    }

    Ok(warehouse.query(&sql, &params).await?.rows)
}
