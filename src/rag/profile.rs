//! File summaries and CSV table descriptions
//!
//! Summaries travel with every retrieved chunk so the answering model knows
//! which document (and which period) an excerpt comes from. Table
//! descriptions are what the question is matched against when looking for a
//! table to query.

use crate::llm::{GenerationOptions, LLMClient};
use crate::rag::extract::CsvTable;
use crate::types::Result;
use std::sync::Arc;

/// Characters of a document sent to the model for summarization.
const SUMMARY_INPUT_CHARS: usize = 12_000;

const SUMMARY_SYSTEM: &str = "You are an assistant specialised in analysing text files.";

const TABLE_SYSTEM: &str = "You are an assistant specialised in analysing CSV files from restaurants.";

#[derive(Clone)]
pub struct Summarizer {
    llm: Arc<dyn LLMClient>,
    max_tokens: u32,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LLMClient>, max_tokens: u32) -> Self {
        Self { llm, max_tokens }
    }

    /// Summary of a document in at most two sentences.
    pub async fn summarize(&self, text: &str) -> Result<String> {
        let excerpt: String = text.chars().take(SUMMARY_INPUT_CHARS).collect();
        let prompt = summary_prompt(&excerpt);

        let summary = self
            .llm
            .generate_with_options(
                SUMMARY_SYSTEM,
                &prompt,
                GenerationOptions::with_temperature(0.0).max_tokens(self.max_tokens),
            )
            .await?;

        Ok(summary.trim().to_string())
    }

    /// Description stored in the index for a CSV table.
    pub async fn describe_table(&self, table: &CsvTable) -> Result<String> {
        let samples: Vec<String> = table
            .sample_indices()
            .into_iter()
            .filter_map(|i| table.render_row(i))
            .collect();

        let summary = self
            .llm
            .generate_with_options(
                TABLE_SYSTEM,
                &table_prompt(&table.headers, &samples),
                GenerationOptions::with_temperature(0.0),
            )
            .await?;

        Ok(table_description(summary.trim(), table))
    }
}

/// Final stored form of a table description.
pub fn table_description(summary: &str, table: &CsvTable) -> String {
    let example = table
        .render_row(0)
        .unwrap_or_else(|| table.headers.join(", "));
    format!(
        "## File description and columns: {}\n## Example row: {}",
        summary, example
    )
}

fn summary_prompt(text: &str) -> String {
    format!(
        r#"# Task: read the whole file below and write a concise summary (at most 2 short sentences) covering:

- the main subject of the file;
- the period or time range it covers, if mentioned;
- any essential data point (metrics, results, audience).

### Instructions
- Do not include details that are not in the file.
- If the period or audience is not stated, do not invent it.
- Write the summary in the same language as the file.

Example structure: "This report covers [period], details [main subject] and highlights [key points]."

File:
{text}"#
    )
}

fn table_prompt(headers: &[String], samples: &[String]) -> String {
    let mut rows = String::new();
    for (i, sample) in samples.iter().enumerate() {
        rows.push_str(&format!("\n**Row {}**:\n{}\n", i + 1, sample));
    }

    format!(
        r#"# Context: restaurant data analysis (meals, sales, costs, profit).
# Task: you receive the header and a few sample rows (first and last) of a CSV file. Write a concise description covering:

- the main subject of the file;
- the period it covers, if visible in the rows;
- what information each column provides.

### Instructions
- Only describe what is present in the rows shown. Do not invent.
- Answer in this format:

File summary: <summary>

Column descriptions:
- <column 1>: <description>
- <column 2>: <description>

Columns: {columns}
{rows}"#,
        columns = headers.join(", "),
        rows = rows
    )
}
