use super::{fetch_rows, month_key, month_of, number, previous_month_start, round2, DashboardTables, DATE_COLUMN};
use crate::types::{AvgTicketResponse, ClientCountResponse, Result};
use crate::warehouse::Warehouse;
use chrono::NaiveDate;
use std::collections::HashSet;

/// Optional column identifying the customer of a transaction.
pub const CLIENT_COLUMN: &str = "client_id";

const CURRENCY: &str = "BRL";
const PERIOD: &str = "month";
const COMPARED_TO: &str = "last_month";

/// A sale from the integrated or delivery report.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// `YYYY-MM`
    pub month: String,
    pub amount: f64,
    pub client_id: Option<String>,
}

/// Integrated gross sales and delivery totals between `start` and `end`.
pub async fn transactions(
    warehouse: &dyn Warehouse,
    tables: &DashboardTables,
    restaurant_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Transaction>> {
    let sources = [
        (tables.integrated.as_str(), "vendas_brutas_brl"),
        (tables.delivery.as_str(), "total_brl"),
    ];

    let mut transactions = Vec::new();
    for (table, amount_column) in sources {
        let rows = fetch_rows(
            warehouse,
            table,
            &[DATE_COLUMN, amount_column, CLIENT_COLUMN],
            restaurant_id,
            Some((start, end)),
        )
        .await?;

        transactions.extend(rows.iter().filter_map(|row| {
            Some(Transaction {
                month: month_of(row.get(DATE_COLUMN))?,
                amount: number(row.get(amount_column)),
                client_id: row.get(CLIENT_COLUMN).and_then(|v| match v {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) if s.trim().is_empty() => None,
                    serde_json::Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                }),
            })
        }));
    }

    Ok(transactions)
}

fn percentage(current: f64, last: f64) -> i64 {
    ((current - last) / last * 100.0).round() as i64
}

/// Average ticket of this month compared to the last one.
pub fn avg_ticket(transactions: &[Transaction], today: NaiveDate) -> AvgTicketResponse {
    let empty = AvgTicketResponse {
        avg_ticket: 0.0,
        percentage: 0,
        currency: CURRENCY.to_string(),
        period: PERIOD.to_string(),
        compared_to: COMPARED_TO.to_string(),
    };
    if transactions.is_empty() {
        return empty;
    }

    let average = |month: &str| {
        let amounts: Vec<f64> = transactions
            .iter()
            .filter(|t| t.month == month)
            .map(|t| t.amount)
            .collect();
        (!amounts.is_empty()).then(|| round2(amounts.iter().sum::<f64>() / amounts.len() as f64))
    };

    let current = average(&month_key(today)).unwrap_or(0.0);
    let last = average(&month_key(previous_month_start(today)))
        .filter(|avg| *avg != 0.0)
        .unwrap_or(1.0);

    AvgTicketResponse {
        avg_ticket: current,
        percentage: percentage(current, last),
        ..empty
    }
}

/// Clients of one month: distinct client ids when the rows carry them,
/// otherwise the number of transactions.
fn clients_in(transactions: &[Transaction], month: &str) -> u64 {
    let in_month: Vec<&Transaction> = transactions.iter().filter(|t| t.month == month).collect();
    let ids: HashSet<&str> = in_month
        .iter()
        .filter_map(|t| t.client_id.as_deref())
        .collect();
    if ids.is_empty() {
        in_month.len() as u64
    } else {
        ids.len() as u64
    }
}

/// Client count of this month compared to the last one.
pub fn count_clients(transactions: &[Transaction], today: NaiveDate) -> ClientCountResponse {
    let mut response = ClientCountResponse {
        total: 0,
        percentage: 0,
        period: PERIOD.to_string(),
        compared_to: COMPARED_TO.to_string(),
    };
    if transactions.is_empty() {
        return response;
    }

    let current = clients_in(transactions, &month_key(today));
    let last = match clients_in(transactions, &month_key(previous_month_start(today))) {
        0 => 1,
        n => n,
    };

    response.total = current;
    response.percentage = percentage(current as f64, last as f64);
    response
}

/// The transaction window of both widgets: start of last month to `today`.
pub async fn recent_transactions(
    warehouse: &dyn Warehouse,
    tables: &DashboardTables,
    restaurant_id: &str,
    today: NaiveDate,
) -> Result<Vec<Transaction>> {
    let start = previous_month_start(today);
    let result = transactions(warehouse, tables, restaurant_id, start, today).await?;
    tracing::debug!(
        restaurant_id,
        %start,
        %today,
        count = result.len(),
        "dashboard transactions"
    );
    Ok(result)
}
