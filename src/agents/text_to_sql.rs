use crate::{
    llm::{GenerationOptions, LLMClient},
    types::Result,
    warehouse::{SqlDialect, RESTAURANT_COLUMN, RESTAURANT_PARAM},
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static SQL_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```\s*sql\s*\n?(.*?)```").expect("valid regex"));
static ANY_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*\n?(.*?)```").expect("valid regex"));

/// What the SQL prompts know about the target table.
#[derive(Debug, Clone)]
pub struct TableContext {
    /// Reference to use in `FROM`, already quoted for the dialect
    pub qualified_name: String,
    pub description: String,
    pub dialect: SqlDialect,
    pub row_cap: usize,
}

impl TableContext {
    fn prompt_section(&self) -> String {
        format!(
            "### Table\n- Reference: {table}\n- SQL dialect: {dialect}\n{description}\n\n### Dialect rules\n{rules}\n\n### Mandatory rules\n- Query ONLY {table}. Never reference any other table.\n- Always filter with `{column} = @{param}` (a bound parameter; do not inline the id).\n- Write a single read-only SELECT (or WITH ... SELECT). No comments.\n- Return at most {cap} rows.",
            table = self.qualified_name,
            dialect = self.dialect.name(),
            description = self.description,
            rules = self.dialect.prompt_rules(),
            column = RESTAURANT_COLUMN,
            param = RESTAURANT_PARAM,
            cap = self.row_cap,
        )
    }
}

/// Writes and repairs SQL for one warehouse table.
pub struct TextToSqlAgent {
    llm: Arc<dyn LLMClient>,
    temperature: f32,
}

impl TextToSqlAgent {
    pub fn new(llm: Arc<dyn LLMClient>, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    /// A query answering `question`, guided by the analysis suggestions.
    pub async fn generate(
        &self,
        question: &str,
        table: &TableContext,
        insights: &[String],
    ) -> Result<String> {
        let mut prompt = table.prompt_section();
        if !insights.is_empty() {
            prompt.push_str("\n\n### Analyses suggested by the BI analyst\n");
            for insight in insights {
                prompt.push_str(&format!("- {}\n", insight));
            }
        }
        prompt.push_str(&format!(
            "\n\nNow write one SQL query that answers the owner's request:\n\"{}\"",
            question
        ));

        let response = self
            .llm
            .generate_with_options(
                GENERATE_SYSTEM,
                &prompt,
                GenerationOptions::with_temperature(self.temperature),
            )
            .await?;
        Ok(extract_sql(&response))
    }

    /// A corrected query after `failed_sql` was rejected with `error`.
    pub async fn repair(&self, failed_sql: &str, error: &str, table: &TableContext) -> Result<String> {
        let prompt = format!(
            "{}\n\n### Query with an error\n```sql\n{}\n```\n\n### Error returned\n```\n{}\n```\n\nFix the query so the error goes away. Analyse the error message carefully.",
            table.prompt_section(),
            failed_sql,
            error
        );

        let response = self
            .llm
            .generate_with_options(
                REPAIR_SYSTEM,
                &prompt,
                GenerationOptions::with_temperature(self.temperature),
            )
            .await?;
        Ok(extract_sql(&response))
    }
}

const GENERATE_SYSTEM: &str = r#"You are an expert data analyst for restaurants of every kind, familiar with the data common in this sector.
Write SQL queries over the restaurant's table based exclusively on the owner's request and the table information.

Guidelines:
- Use correct, standard syntax for the stated dialect, with no errors.
- Include only the columns relevant to the request. The date is important whenever the table has one.
- Use aggregations (COUNT, SUM, AVG, ...) with GROUP BY / HAVING where they add insight.
- If the table has no date column, do not invent one.
- Do not put quotes after AS.
- Do not invent columns. Use the names from the table information.

Return ONLY the SQL query, without instructions, explanations or comments."#;

const REPAIR_SYSTEM: &str = r#"You are an expert in debugging SQL.
You receive a query that failed, the error it produced and the table information.
Return ONLY the corrected SQL query, without explanations or comments."#;

/// The SQL in a model answer: every ```sql block, else any fenced block,
/// else the whole text. Trailing semicolons are removed.
pub fn extract_sql(response: &str) -> String {
    let blocks: Vec<&str> = SQL_FENCE
        .captures_iter(response)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
        .filter(|b| !b.is_empty())
        .collect();

    let sql = if !blocks.is_empty() {
        blocks.join(";\n")
    } else if let Some(block) = ANY_FENCE
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
    {
        block
    } else {
        response.trim().to_string()
    };

    sql.trim().trim_end_matches(';').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_sql_fenced() {
        let response = "Here you go:\n```sql\nSELECT 1\nFROM t;\n```\nEnjoy";
        assert_eq!(extract_sql(response), "SELECT 1\nFROM t");
    }

    #[test]
    fn test_extract_sql_uppercase_tag() {
        assert_eq!(extract_sql("```SQL\nSELECT 2;\n```"), "SELECT 2");
    }

    #[test]
    fn test_extract_sql_generic_fence() {
        assert_eq!(extract_sql("```\nSELECT 3\n```"), "SELECT 3");
    }

    #[test]
    fn test_extract_sql_plain() {
        assert_eq!(extract_sql("  SELECT 4 ;  "), "SELECT 4");
    }

    #[test]
    fn test_multiple_sql_blocks_are_joined() {
        let response = "```sql\nSELECT 1\n```\nand\n```sql\nSELECT 2\n```";
        assert_eq!(extract_sql(response), "SELECT 1;\nSELECT 2");
    }

    #[test]
    fn test_prompt_section_carries_rules() {
        let table = TableContext {
            qualified_name: "\"vendas_ab12\"".into(),
            description: "## File description and columns: sales".into(),
            dialect: SqlDialect::Sqlite,
            row_cap: 100,
        };
        let section = table.prompt_section();
        assert!(section.contains("Query ONLY \"vendas_ab12\""));
        assert!(section.contains("restaurant_id = @restaurant_id"));
        assert!(section.contains("at most 100 rows"));
    }
}
