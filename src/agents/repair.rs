use super::{
    sql_guard::SqlGuard,
    text_to_sql::{TableContext, TextToSqlAgent},
};
use crate::{
    types::{AppError, Result},
    warehouse::{QueryParam, Warehouse},
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};

/// One executed (or rejected) query of the loop.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptTrace {
    pub sql: String,
    pub error: Option<String>,
}

/// The query that finally ran and its rows.
#[derive(Debug, Clone)]
pub struct SqlOutcome {
    pub sql: String,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub attempts: u32,
    pub trace: Vec<AttemptTrace>,
}

/// Runs generated SQL, feeding failures back to the model for a fix.
///
/// Each attempt validates the query with a [`SqlGuard`] and executes it with
/// the tenant parameter bound, under `attempt_timeout`. At most
/// `max_attempts` queries are tried.
pub struct SqlRepairLoop {
    agent: Arc<TextToSqlAgent>,
    warehouse: Arc<dyn Warehouse>,
    max_attempts: u32,
    attempt_timeout: Duration,
}

impl SqlRepairLoop {
    pub fn new(
        agent: Arc<TextToSqlAgent>,
        warehouse: Arc<dyn Warehouse>,
        max_attempts: u32,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            agent,
            warehouse,
            max_attempts: max_attempts.max(1),
            attempt_timeout,
        }
    }

    async fn attempt(
        &self,
        sql: &str,
        guard: &SqlGuard,
        restaurant_id: &str,
    ) -> Result<(String, crate::warehouse::QueryResult)> {
        let guarded = guard
            .check(sql)
            .map_err(|e| AppError::InvalidInput(format!("Query rejected: {}", e)))?;

        let params = [QueryParam::restaurant(restaurant_id)];
        match tokio::time::timeout(self.attempt_timeout, self.warehouse.query(&guarded, &params))
            .await
        {
            Ok(result) => result.map(|rows| (guarded, rows)),
            Err(_) => Err(AppError::Warehouse(format!(
                "Query timed out after {} seconds",
                self.attempt_timeout.as_secs_f32()
            ))),
        }
    }

    /// Run `initial_sql`, repairing it until it succeeds or the attempt
    /// budget is spent. Returns the last error when every attempt failed.
    pub async fn run(
        &self,
        initial_sql: String,
        table: &TableContext,
        guard: &SqlGuard,
        restaurant_id: &str,
    ) -> Result<SqlOutcome> {
        let mut sql = initial_sql;
        let mut trace = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started = std::time::Instant::now();

            let error = match self.attempt(&sql, guard, restaurant_id).await {
                Ok((executed, mut result)) => {
                    result.rows.truncate(guard.row_cap());
                    tracing::info!(
                        restaurant_id,
                        attempt,
                        rows = result.rows.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "SQL query succeeded"
                    );
                    trace.push(AttemptTrace {
                        sql: executed.clone(),
                        error: None,
                    });
                    return Ok(SqlOutcome {
                        sql: executed,
                        rows: result.rows,
                        attempts: attempt,
                        trace,
                    });
                }
                Err(e) => e,
            };

            tracing::warn!(
                restaurant_id,
                attempt,
                max_attempts = self.max_attempts,
                error = %error,
                "SQL attempt failed"
            );
            trace.push(AttemptTrace {
                sql: sql.clone(),
                error: Some(error.to_string()),
            });

            if attempt >= self.max_attempts {
                tracing::debug!(?trace, "SQL repair loop exhausted");
                return Err(error);
            }

            sql = self.agent.repair(&sql, &error.to_string(), table).await?;
        }
    }
}
