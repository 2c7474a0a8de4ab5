//! Mock implementations for testing.
//!
//! Mock LLM clients, embedders and factories shared by the integration tests,
//! so no test needs network access.

use async_trait::async_trait;
use foodatlas::llm::client::{GenerationOptions, LLMClientFactoryTrait, Provider, TokenStream};
use foodatlas::llm::{Embedder, LLMClient};
use foodatlas::types::{AppError, Result};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;

type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Mock LLM client with scripted responses.
///
/// Responses are picked by matching a needle against the system prompt, so
/// one client can play classifier, SQL writer and answer writer in the same
/// pipeline. A later rule overrides an earlier one with a matching needle.
/// Calls are recorded for assertions.
///
/// ```ignore
/// let llm = MockLLMClient::new("final answer")
///     .on("You classify", "numeric")
///     .on_with("expert data analyst", |prompt| format!("SELECT 1 -- {}", prompt.len()));
/// ```
#[derive(Clone)]
pub struct MockLLMClient {
    default: String,
    rules: Vec<(String, Responder)>,
    should_fail: bool,
    fail_stream: bool,
    chunk_size: usize,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockLLMClient {
    /// A client that answers `response` to everything.
    pub fn new(response: &str) -> Self {
        Self {
            default: response.to_string(),
            rules: Vec::new(),
            should_fail: false,
            fail_stream: false,
            chunk_size: 5,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A client whose every call fails.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new("")
        }
    }

    /// Answer `response` when the system prompt contains `needle`.
    pub fn on(self, needle: &str, response: &str) -> Self {
        let response = response.to_string();
        self.on_with(needle, move |_| response.clone())
    }

    /// Compute the answer from the user prompt when the system prompt contains `needle`.
    pub fn on_with(
        mut self,
        needle: &str,
        responder: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.rules.push((needle.to_string(), Arc::new(responder)));
        self
    }

    /// Make streaming calls fail while plain generation still works.
    pub fn failing_stream(mut self) -> Self {
        self.fail_stream = true;
        self
    }

    /// `(system, prompt)` of every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    fn respond(&self, system: &str, prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .push((system.to_string(), prompt.to_string()));
        if self.should_fail {
            return Err(AppError::LLM("Mock LLM failure".to_string()));
        }
        Ok(self
            .rules
            .iter()
            .rev()
            .find(|(needle, _)| system.contains(needle.as_str()))
            .map(|(_, responder)| responder(prompt))
            .unwrap_or_else(|| self.default.clone()))
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.respond("", prompt)
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.respond(system, prompt)
    }

    async fn generate_with_history(&self, messages: &[(String, String)]) -> Result<String> {
        let system = messages
            .iter()
            .find(|(role, _)| role == "system")
            .map(|(_, content)| content.as_str())
            .unwrap_or_default();
        let prompt = messages
            .last()
            .map(|(_, content)| content.as_str())
            .unwrap_or_default();
        self.respond(system, prompt)
    }

    async fn generate_with_options(
        &self,
        system: &str,
        prompt: &str,
        _options: GenerationOptions,
    ) -> Result<String> {
        self.respond(system, prompt)
    }

    async fn stream_with_system(
        &self,
        system: &str,
        prompt: &str,
        _options: GenerationOptions,
    ) -> Result<TokenStream> {
        let response = self.respond(system, prompt)?;
        if self.fail_stream {
            return Err(AppError::LLM("Mock stream failure".to_string()));
        }

        // Split response into chunks for streaming simulation
        let chunks: Vec<String> = response
            .chars()
            .collect::<Vec<_>>()
            .chunks(self.chunk_size)
            .map(|c| c.iter().collect())
            .collect();

        Ok(Box::new(stream::iter(chunks.into_iter().map(Ok)).boxed()))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Mock LLM factory that hands out clones of one [`MockLLMClient`].
pub struct MockLLMFactory {
    provider: Provider,
    client: MockLLMClient,
}

impl MockLLMFactory {
    pub fn new(client: MockLLMClient) -> Self {
        Self {
            provider: Provider::OpenAI {
                api_key: "test".to_string(),
                api_base: "http://localhost:0/v1".to_string(),
                model: "mock-model".to_string(),
                request_timeout_secs: 5,
            },
            client,
        }
    }
}

#[async_trait]
impl LLMClientFactoryTrait for MockLLMFactory {
    fn default_provider(&self) -> &Provider {
        &self.provider
    }

    async fn create_default(&self) -> Result<Box<dyn LLMClient>> {
        Ok(Box::new(self.client.clone()))
    }

    async fn create_with_provider(&self, _provider: Provider) -> Result<Box<dyn LLMClient>> {
        Ok(Box::new(self.client.clone()))
    }
}

/// Deterministic bag-of-words embedder. Texts sharing words get close vectors.
#[derive(Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    should_fail: bool,
    calls: Arc<Mutex<usize>>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            dimensions: 16,
            should_fail: false,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    /// Number of texts embedded so far.
    pub fn embedded(&self) -> usize {
        *self.calls.lock()
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        // Constant component keeps every vector non-zero for cosine distance
        v[0] = 1.0;
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            v[1 + bucket % (self.dimensions - 1)] += 1.0;
        }
        v
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.should_fail {
            return Err(AppError::LLM("Mock embedding failure".to_string()));
        }
        *self.calls.lock() += texts.len();
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

/// The `- Reference: <table>` line of a SQL prompt.
pub fn table_reference(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|line| line.trim().strip_prefix("- Reference: "))
        .unwrap_or_default()
        .to_string()
}
