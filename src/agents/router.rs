use crate::{
    llm::{GenerationOptions, LLMClient},
    types::{Intent, Result},
    utils::text::fold_accents,
};
use std::sync::Arc;

/// Labels the classifier may answer with, and the intent each maps to.
/// Portuguese labels are accepted because the model often answers in the
/// question's language.
const INTENT_LABELS: &[(&str, Intent)] = &[
    ("text", Intent::Text),
    ("texto", Intent::Text),
    ("textual", Intent::Text),
    ("numeric", Intent::Numeric),
    ("numerico", Intent::Numeric),
    ("numerical", Intent::Numeric),
    ("mixed", Intent::Mixed),
    ("misto", Intent::Mixed),
];

/// Classifies a chat question as text, numeric or mixed.
///
/// Uses the LLM at a fixed (normally zero) temperature with a few-shot
/// prompt, then parses its answer leniently.
pub struct IntentClassifier {
    llm: Arc<dyn LLMClient>,
    temperature: f32,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LLMClient>, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    /// Parse a classification from LLM output
    ///
    /// This handles various LLM output formats:
    /// - Clean output: "numeric"
    /// - Quoted or accented: "\"Numérico\""
    /// - With extra text: "Category: text."
    fn parse_intent(output: &str) -> Option<Intent> {
        let cleaned: String = fold_accents(output.trim())
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, '"' | '\'' | '`' | '*'))
            .collect();
        let cleaned = cleaned.trim();

        // First, try exact match
        if let Some((_, intent)) = INTENT_LABELS.iter().find(|(label, _)| *label == cleaned) {
            return Some(*intent);
        }

        // Then each word on its own
        for word in cleaned.split(|c: char| !c.is_alphanumeric()) {
            if let Some((_, intent)) = INTENT_LABELS.iter().find(|(label, _)| *label == word) {
                return Some(*intent);
            }
        }

        // Finally any label contained in the output
        INTENT_LABELS
            .iter()
            .find(|(label, _)| cleaned.contains(label))
            .map(|(_, intent)| *intent)
    }

    /// Classify `question`. Output that cannot be parsed routes to
    /// [`Intent::Mixed`] so both retrieval branches run.
    pub async fn classify(&self, question: &str) -> Result<Intent> {
        let response = self
            .llm
            .generate_with_options(
                Self::system_prompt(),
                question,
                GenerationOptions::with_temperature(self.temperature),
            )
            .await?;

        match Self::parse_intent(&response) {
            Some(intent) => Ok(intent),
            None => {
                tracing::debug!(
                    "Classifier could not parse output '{}', defaulting to mixed",
                    response
                );
                Ok(Intent::Mixed)
            }
        }
    }

    fn system_prompt() -> &'static str {
        r#"You classify questions that restaurant owners ask about their own business data.

Categories:
- text: the answer is in written documents (recipes, menus, procedures, contracts, reports written as prose).
- numeric: the answer needs calculations over tabular data (sales, costs, tickets, payment methods, hours, quantities).
- mixed: the answer clearly needs both.

Examples:
- "What is the lasagna recipe?" → text
- "What is the best-selling hour of the day?" → numeric
- "What share of payments were made by card?" → numeric
- "What was the average ticket last month?" → numeric
- "How can I optimise night-time sales?" → numeric
- "What does the lasagna cost to make?" → text
- "According to our promotion policy, did last month's promotions pay off?" → mixed

Respond with ONLY the category name (text, numeric or mixed), nothing else."#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("numeric", Some(Intent::Numeric))]
    #[case("  Text\n", Some(Intent::Text))]
    #[case("\"Numérico\"", Some(Intent::Numeric))]
    #[case("Categoria: texto.", Some(Intent::Text))]
    #[case("**mixed**", Some(Intent::Mixed))]
    #[case("misto", Some(Intent::Mixed))]
    #[case("this looks numerically heavy", Some(Intent::Numeric))]
    #[case("I am not sure", None)]
    #[case("", None)]
    fn test_parse_intent(#[case] output: &str, #[case] expected: Option<Intent>) {
        assert_eq!(IntentClassifier::parse_intent(output), expected);
    }
}
