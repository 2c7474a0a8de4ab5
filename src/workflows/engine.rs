//! Chat workflow
//!
//! Answers one question for one restaurant:
//!
//! ```text
//! embed question ─► classify ─┬─ text ────► TextFlow ──────────────┐
//!                             ├─ numeric ─► NumericFlow ───────────┼─► AnswerComposer ─► stream
//!                             └─ mixed ───► both, concurrently ────┘
//! ```
//!
//! Retrieval and SQL failures never abort the answer: the failing branch
//! contributes [`NO_TEXT_CONTEXT`] or [`NO_NUMERIC_DATA`] instead.

use crate::agents::{
    InsightsAgent, IntentClassifier, SqlGuard, SqlRepairLoop, TableContext, TextToSqlAgent,
};
use crate::db::{DocumentIndex, TableHit, TextHit, TursoClient};
use crate::llm::{Embedder, GenerationOptions, LLMClient};
use crate::types::{Intent, Result};
use crate::utils::toml_config::AtlasConfig;
use crate::warehouse::Warehouse;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Text context when no excerpt was retrieved.
pub const NO_TEXT_CONTEXT: &str = "No relevant excerpts";

/// Numeric context when no table matched or its query failed.
pub const NO_NUMERIC_DATA: &str = "No numeric data";

// ============= Events =============

/// Server-sent event of a chat answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// The routing decision, sent before any token
    Route { intent: Intent },
    /// A piece of the answer text
    Token(String),
    Done {
        intent: Intent,
        sql: Option<String>,
        attempts: Option<u32>,
    },
    Error(String),
}

#[derive(Serialize)]
struct DonePayload<'a> {
    intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    sql: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts: Option<u32>,
}

impl ChatEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Route { .. } => "route",
            ChatEvent::Token(_) => "token",
            ChatEvent::Done { .. } => "done",
            ChatEvent::Error(_) => "error",
        }
    }

    /// SSE data line(s). Tokens are sent as raw text, the rest as JSON.
    pub fn data(&self) -> String {
        match self {
            ChatEvent::Route { intent } => serde_json::json!({ "intent": intent }).to_string(),
            ChatEvent::Token(text) => text.clone(),
            ChatEvent::Done {
                intent,
                sql,
                attempts,
            } => serde_json::to_string(&DonePayload {
                intent: *intent,
                sql: sql.as_deref(),
                attempts: *attempts,
            })
            .unwrap_or_default(),
            ChatEvent::Error(message) => serde_json::json!({ "error": message }).to_string(),
        }
    }
}

// ============= Text Flow =============

/// Context entries of retrieved excerpts, separated by a blank line.
pub fn render_text_context(hits: &[TextHit]) -> String {
    if hits.is_empty() {
        return NO_TEXT_CONTEXT.to_string();
    }
    hits.iter()
        .map(|hit| {
            format!(
                "Original file summary: {}\nRelevant excerpt: \"{}\"",
                hit.summary, hit.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Retrieves document excerpts for a question.
pub struct TextFlow {
    index: Arc<dyn DocumentIndex>,
    top_k: usize,
}

impl TextFlow {
    pub fn new(index: Arc<dyn DocumentIndex>, top_k: usize) -> Self {
        Self { index, top_k }
    }

    pub async fn run(&self, restaurant_id: &str, query_embedding: Option<&[f32]>) -> String {
        let Some(embedding) = query_embedding else {
            return NO_TEXT_CONTEXT.to_string();
        };
        match self
            .index
            .search_text(restaurant_id, embedding, self.top_k)
            .await
        {
            Ok(hits) => {
                tracing::debug!(restaurant_id, hits = hits.len(), "text retrieval");
                render_text_context(&hits)
            }
            Err(e) => {
                tracing::warn!(restaurant_id, error = %e, "text retrieval failed");
                NO_TEXT_CONTEXT.to_string()
            }
        }
    }
}

// ============= Numeric Flow =============

/// What the numeric branch found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericContext {
    /// Rendered results, or [`NO_NUMERIC_DATA`]
    pub results: String,
    pub insights: Vec<String>,
    pub sql: Option<String>,
    pub attempts: Option<u32>,
}

impl NumericContext {
    fn no_data() -> Self {
        Self {
            results: NO_NUMERIC_DATA.to_string(),
            ..Default::default()
        }
    }
}

/// `Result {i}: {json}` per row, at most `limit` rows.
pub fn render_rows(rows: &[serde_json::Map<String, serde_json::Value>], limit: usize) -> String {
    if rows.is_empty() {
        return NO_NUMERIC_DATA.to_string();
    }
    rows.iter()
        .take(limit)
        .enumerate()
        .map(|(i, row)| {
            let json = serde_json::to_string_pretty(row).unwrap_or_else(|_| format!("{:?}", row));
            format!("Result {}: {}", i + 1, json)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Picks the best matching table and answers with generated SQL.
pub struct NumericFlow {
    index: Arc<dyn DocumentIndex>,
    warehouse: Arc<dyn Warehouse>,
    insights: InsightsAgent,
    sql_agent: Arc<TextToSqlAgent>,
    repair: SqlRepairLoop,
    top_k: usize,
    row_cap: usize,
    prompt_sample_rows: usize,
}

impl NumericFlow {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        index: Arc<dyn DocumentIndex>,
        warehouse: Arc<dyn Warehouse>,
        config: &AtlasConfig,
    ) -> Self {
        let sql_agent = Arc::new(TextToSqlAgent::new(llm.clone(), config.llm.sql_temperature));
        let repair = SqlRepairLoop::new(
            sql_agent.clone(),
            warehouse.clone(),
            config.sql.max_attempts,
            Duration::from_secs(config.sql.attempt_timeout_secs),
        );
        Self {
            index,
            warehouse,
            insights: InsightsAgent::new(llm, config.llm.sql_temperature),
            sql_agent,
            repair,
            top_k: config.rag.top_k_tables.max(1),
            row_cap: config.sql.row_cap,
            prompt_sample_rows: config.sql.prompt_sample_rows,
        }
    }

    pub async fn run(
        &self,
        restaurant_id: &str,
        question: &str,
        query_embedding: Option<&[f32]>,
    ) -> NumericContext {
        let Some(embedding) = query_embedding else {
            return NumericContext::no_data();
        };

        let table = match self
            .index
            .search_tables(restaurant_id, embedding, self.top_k)
            .await
        {
            Ok(hits) => match hits.into_iter().next() {
                Some(hit) => hit,
                None => {
                    tracing::debug!(restaurant_id, "no table matched the question");
                    return NumericContext::no_data();
                }
            },
            Err(e) => {
                tracing::warn!(restaurant_id, error = %e, "table retrieval failed");
                return NumericContext::no_data();
            }
        };

        match self.query_table(restaurant_id, question, &table).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(
                    restaurant_id,
                    table = %table.table_name,
                    error = %e,
                    "numeric branch failed"
                );
                NumericContext::no_data()
            }
        }
    }

    async fn query_table(
        &self,
        restaurant_id: &str,
        question: &str,
        table: &TableHit,
    ) -> Result<NumericContext> {
        let qualified = self.warehouse.qualified_table(&table.table_name);
        let dialect = self.warehouse.dialect();
        let context = TableContext {
            qualified_name: qualified.clone(),
            description: table.description.clone(),
            dialect,
            row_cap: self.row_cap,
        };

        let insights = match self.insights.suggest(question, &table.description).await {
            Ok(insights) => insights,
            Err(e) => {
                tracing::warn!(restaurant_id, error = %e, "insights unavailable");
                Vec::new()
            }
        };

        let sql = self.sql_agent.generate(question, &context, &insights).await?;
        let guard = SqlGuard::new(dialect, &qualified, &table.table_name, self.row_cap);
        let outcome = self.repair.run(sql, &context, &guard, restaurant_id).await?;

        Ok(NumericContext {
            results: render_rows(&outcome.rows, self.prompt_sample_rows),
            insights,
            sql: Some(outcome.sql),
            attempts: Some(outcome.attempts),
        })
    }
}

// ============= Answer Composer =============

/// Builds the final answer prompts.
pub struct AnswerComposer {
    support_url: String,
}

impl AnswerComposer {
    pub fn new(support_url: impl Into<String>) -> Self {
        Self {
            support_url: support_url.into(),
        }
    }

    /// Reply used when nothing relevant was found.
    pub fn fallback_message(&self) -> String {
        format!(
            "Unfortunately we don't have enough information about your restaurant to answer this question yet. \
             Check in file management whether similar information has been uploaded. \
             If you prefer, contact our support via [WhatsApp]({}).",
            self.support_url
        )
    }

    pub fn system_prompt(&self) -> String {
        format!(
            r#"You are a data assistant with broad experience in the restaurant sector. You answer the questions of restaurant owners using our platform, giving insights and recommendations based exclusively on the context and data provided to you.
Be direct and concise, but make sure the answer is correct and well supported.

Instructions:
- Analyse only the excerpts and numeric results given in the prompt. Do not invent information that is not there.
- Excerpts that share the same original file summary come from the same document; combine them when that makes sense.
- When numeric results are used, state the period (dates) they cover.
- If one of the categories (excerpts or numeric results) is not useful for the question, ignore it.
- Never mention "excerpts", "SQL", "queries" or any other internal mechanics. Act as a specialist assistant of this restaurant.
- Keep the answer short and well organised (bullet points, bold).
- Answer in the same language as the question.
- If the context is "{no_text}" and/or "{no_numeric}" and nothing relevant is left, the restaurant has not provided enough data yet. Reply exactly with:
"{fallback}""#,
            no_text = NO_TEXT_CONTEXT,
            no_numeric = NO_NUMERIC_DATA,
            fallback = self.fallback_message(),
        )
    }

    /// The user prompt for the branches that ran.
    pub fn compose(
        &self,
        question: &str,
        text_context: Option<&str>,
        numeric: Option<&NumericContext>,
    ) -> String {
        let mut prompt = format!("## The restaurant owner asked\n{}\n", question);

        if let Some(text) = text_context {
            prompt.push_str(&format!(
                "\n## Excerpts found in the restaurant's files, each with the summary of its file\n{}\n",
                text
            ));
        }

        if let Some(numeric) = numeric {
            if !numeric.insights.is_empty() {
                prompt.push_str("\n## Analyses recommended by our BI expert\n");
                for insight in &numeric.insights {
                    prompt.push_str(&format!("- {}\n", insight));
                }
            }
            prompt.push_str(&format!(
                "\n## Numeric results extracted from the restaurant's data\n{}\n",
                numeric.results
            ));
        }

        prompt.push_str("\nNow answer the owner's question.");
        prompt
    }
}

// ============= Chat Workflow =============

/// The full question-answering pipeline for one chat request.
pub struct ChatWorkflow {
    llm: Arc<dyn LLMClient>,
    embedder: Arc<dyn Embedder>,
    turso: Arc<TursoClient>,
    classifier: IntentClassifier,
    text_flow: TextFlow,
    numeric_flow: NumericFlow,
    composer: AnswerComposer,
    answer_temperature: f32,
}

impl ChatWorkflow {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn DocumentIndex>,
        warehouse: Arc<dyn Warehouse>,
        turso: Arc<TursoClient>,
        config: &AtlasConfig,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(llm.clone(), config.llm.classifier_temperature),
            text_flow: TextFlow::new(index.clone(), config.rag.top_k_text),
            numeric_flow: NumericFlow::new(llm.clone(), index, warehouse, config),
            composer: AnswerComposer::new(config.llm.support_url.clone()),
            answer_temperature: config.llm.answer_temperature,
            llm,
            embedder,
            turso,
        }
    }

    async fn route(&self, restaurant_id: &str, question: &str) -> Intent {
        match self.classifier.classify(question).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(restaurant_id, error = %e, "classification failed, using mixed");
                Intent::Mixed
            }
        }
    }

    async fn gather(
        &self,
        restaurant_id: &str,
        question: &str,
        intent: Intent,
        embedding: Option<&[f32]>,
    ) -> (Option<String>, Option<NumericContext>) {
        match intent {
            Intent::Text => (Some(self.text_flow.run(restaurant_id, embedding).await), None),
            Intent::Numeric => (
                None,
                Some(
                    self.numeric_flow
                        .run(restaurant_id, question, embedding)
                        .await,
                ),
            ),
            Intent::Mixed => {
                let (text, numeric) = tokio::join!(
                    self.text_flow.run(restaurant_id, embedding),
                    self.numeric_flow.run(restaurant_id, question, embedding)
                );
                (Some(text), Some(numeric))
            }
        }
    }

    /// Answer `question`, as a stream of [`ChatEvent`]s ending in `done` or
    /// `error`. The finished answer is written to the chat log.
    pub fn answer(
        self: Arc<Self>,
        restaurant_id: String,
        question: String,
    ) -> impl Stream<Item = ChatEvent> + Send {
        async_stream::stream! {
            let started = Instant::now();

            let embedding = match self.embedder.embed(&question).await {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    tracing::warn!(restaurant_id = %restaurant_id, error = %e, "question embedding failed");
                    None
                }
            };

            let intent = self.route(&restaurant_id, &question).await;
            tracing::info!(restaurant_id = %restaurant_id, intent = intent.as_str(), "question routed");
            yield ChatEvent::Route { intent };

            let (text, numeric) = self
                .gather(&restaurant_id, &question, intent, embedding.as_deref())
                .await;
            let prompt = self.composer.compose(&question, text.as_deref(), numeric.as_ref());

            let mut tokens = match self
                .llm
                .stream_with_system(
                    &self.composer.system_prompt(),
                    &prompt,
                    GenerationOptions::with_temperature(self.answer_temperature),
                )
                .await
            {
                Ok(tokens) => tokens,
                Err(e) => {
                    tracing::error!(restaurant_id = %restaurant_id, error = %e, "answer generation failed");
                    yield ChatEvent::Error(e.to_string());
                    return;
                }
            };

            let mut answer = String::new();
            while let Some(token) = tokens.next().await {
                match token {
                    Ok(delta) => {
                        if delta.is_empty() {
                            continue;
                        }
                        answer.push_str(&delta);
                        yield ChatEvent::Token(delta);
                    }
                    Err(e) => {
                        tracing::error!(restaurant_id = %restaurant_id, error = %e, "answer stream failed");
                        yield ChatEvent::Error(e.to_string());
                        return;
                    }
                }
            }

            if let Err(e) = self
                .turso
                .log_chat(&restaurant_id, &question, intent.as_str(), &answer)
                .await
            {
                tracing::warn!(restaurant_id = %restaurant_id, error = %e, "failed to log chat");
            }

            let (sql, attempts) = numeric
                .map(|n| (n.sql, n.attempts))
                .unwrap_or((None, None));
            tracing::info!(
                restaurant_id = %restaurant_id,
                intent = intent.as_str(),
                attempts,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "question answered"
            );
            yield ChatEvent::Done { intent, sql, attempts };
        }
    }
}
