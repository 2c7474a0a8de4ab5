//! LLM Provider Clients and Abstractions
//!
//! - [`LLMClient`] - chat completions, blocking and streaming
//! - [`LLMClientFactoryTrait`] - creates clients; mocked in tests
//! - [`Embedder`] - text embeddings
//!
//! # Example
//!
//! ```ignore
//! use foodatlas::llm::{GenerationOptions, LLMClientFactory, LLMClientFactoryTrait, Provider};
//!
//! let factory = LLMClientFactory::new(provider);
//! let client = factory.create_default().await?;
//!
//! let intent = client
//!     .generate_with_options(system, question, GenerationOptions::with_temperature(0.0))
//!     .await?;
//! ```

/// Core LLM client trait and provider selection.
pub mod client;
/// Embedding trait and the OpenAI embeddings client.
pub mod embeddings;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{
    GenerationOptions, LLMClient, LLMClientFactory, LLMClientFactoryTrait, Provider, TokenStream,
};
pub use embeddings::Embedder;
#[cfg(feature = "openai")]
pub use embeddings::OpenAIEmbedder;
