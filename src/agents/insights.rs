use crate::{
    llm::{GenerationOptions, LLMClient},
    types::Result,
};
use std::sync::Arc;

/// Most analysis angles kept from the model's answer.
pub const MAX_INSIGHTS: usize = 3;

/// Suggests analysis angles for a numeric question before SQL is written.
pub struct InsightsAgent {
    llm: Arc<dyn LLMClient>,
    temperature: f32,
}

impl InsightsAgent {
    pub fn new(llm: Arc<dyn LLMClient>, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    /// Up to [`MAX_INSIGHTS`] one-line analysis suggestions.
    pub async fn suggest(&self, question: &str, table_description: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "## Table\n{}\n\n## Owner's question\n\"{}\"",
            table_description, question
        );
        let response = self
            .llm
            .generate_with_options(
                SYSTEM_PROMPT,
                &prompt,
                GenerationOptions::with_temperature(self.temperature),
            )
            .await?;

        Ok(parse_insights(&response))
    }
}

const SYSTEM_PROMPT: &str = r#"You are a business-intelligence analyst for restaurants.
Given a table description and an owner's question, propose the analyses a data analyst should run on that table to answer it well.

Rules:
- Propose at most 3 analyses, one per line, each starting with "- ".
- Only use columns that appear in the table description.
- Prefer analyses that include the date range covered by the data.
- Do not write SQL and do not add any other text."#;

/// Bullet or numbered lines of the answer, without their markers.
pub fn parse_insights(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches(['.', ')'])
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .take(MAX_INSIGHTS)
        .collect()
}
