//! LLM Client abstractions and provider management
//!
//! Every model call in the chat pipeline goes through [`LLMClient`]. The only
//! concrete provider is an OpenAI-compatible chat completions endpoint, which
//! also covers Azure OpenAI, OpenRouter and local gateways that mimic the API.

use crate::types::Result;
use crate::utils::toml_config::LlmConfig;
use async_trait::async_trait;

/// Stream of text deltas from a streaming completion.
pub type TokenStream = Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>;

/// Sampling options for a single request.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    /// Options with only a temperature set.
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens: None,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Generic LLM client trait for provider abstraction
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with system prompt
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate with conversation history
    async fn generate_with_history(
        &self,
        messages: &[(String, String)], // (role, content) pairs
    ) -> Result<String>;

    /// Generate with a system prompt and explicit sampling options
    async fn generate_with_options(
        &self,
        system: &str,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String>;

    /// Stream a completion with a system prompt
    async fn stream_with_system(
        &self,
        system: &str,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<TokenStream>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Provider enum for runtime selection
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI API provider (including Azure OpenAI and compatible APIs)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    ///     request_timeout_secs: 60,
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
        request_timeout_secs: u64,
    },
}

impl Provider {
    /// The chat model described by the `[llm]` section.
    pub fn chat_from_config(llm: &LlmConfig, api_key: String) -> Self {
        Provider::OpenAI {
            api_key,
            api_base: llm.api_base.clone(),
            model: llm.chat_model.clone(),
            request_timeout_secs: llm.request_timeout_secs,
        }
    }

    /// Create a client instance for this provider
    ///
    /// # Errors
    ///
    /// Returns `AppError::Configuration` when the crate was built without the
    /// provider's feature.
    pub async fn create_client(&self) -> Result<Box<dyn LLMClient>> {
        match self {
            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
                request_timeout_secs,
            } => Ok(Box::new(super::openai::OpenAIClient::with_timeout(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
                std::time::Duration::from_secs(*request_timeout_secs),
            )?)),

            #[cfg(not(feature = "openai"))]
            Provider::OpenAI { .. } => Err(crate::types::AppError::Configuration(
                "OpenAI provider requires the 'openai' feature".to_string(),
            )),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. } => model,
        }
    }
}

/// Trait for creating LLM clients, so tests can swap in mock clients
#[async_trait]
pub trait LLMClientFactoryTrait: Send + Sync {
    /// Get the default provider configuration
    fn default_provider(&self) -> &Provider;

    /// Create a client using the default provider
    async fn create_default(&self) -> Result<Box<dyn LLMClient>>;

    /// Create a client using a specific provider
    async fn create_with_provider(&self, provider: Provider) -> Result<Box<dyn LLMClient>>;
}

/// Configuration-based client factory
///
/// # Example
///
/// ```rust,ignore
/// use foodatlas::llm::{LLMClientFactory, Provider};
///
/// let factory = LLMClientFactory::new(Provider::OpenAI {
///     api_key: "sk-...".to_string(),
///     api_base: "https://api.openai.com/v1".to_string(),
///     model: "gpt-4o-mini".to_string(),
///     request_timeout_secs: 60,
/// });
///
/// let client = factory.create_default().await?;
/// ```
pub struct LLMClientFactory {
    default_provider: Provider,
}

impl LLMClientFactory {
    /// Create a new factory with the specified default provider
    pub fn new(default_provider: Provider) -> Self {
        Self { default_provider }
    }
}

#[async_trait]
impl LLMClientFactoryTrait for LLMClientFactory {
    fn default_provider(&self) -> &Provider {
        &self.default_provider
    }

    async fn create_default(&self) -> Result<Box<dyn LLMClient>> {
        self.default_provider.create_client().await
    }

    async fn create_with_provider(&self, provider: Provider) -> Result<Box<dyn LLMClient>> {
        provider.create_client().await
    }
}
