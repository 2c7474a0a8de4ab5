//! LLM agents of the chat pipeline
//!
//! - [`IntentClassifier`] routes a question to text, numeric or mixed retrieval
//! - [`InsightsAgent`] proposes analysis angles for numeric questions
//! - [`TextToSqlAgent`] writes and repairs SQL for one warehouse table
//! - [`SqlGuard`] validates generated SQL before it runs
//! - [`SqlRepairLoop`] executes SQL with a bounded repair budget

pub mod insights;
pub mod repair;
pub mod router;
pub mod sql_guard;
pub mod text_to_sql;

pub use insights::InsightsAgent;
pub use repair::{AttemptTrace, SqlOutcome, SqlRepairLoop};
pub use router::IntentClassifier;
pub use sql_guard::{GuardError, SqlGuard};
pub use text_to_sql::{TableContext, TextToSqlAgent};
