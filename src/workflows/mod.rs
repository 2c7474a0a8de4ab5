//! Chat Workflow Module
//!
//! Routes each chat question to document retrieval, generated SQL, or both,
//! and streams the composed answer.
//!
//! # Usage
//!
//! ```ignore
//! let workflow = Arc::new(ChatWorkflow::new(llm, embedder, index, warehouse, turso, &config));
//! let mut events = Box::pin(workflow.answer(restaurant_id, question));
//! while let Some(event) = events.next().await {
//!     println!("{}: {}", event.name(), event.data());
//! }
//! ```

pub mod engine;

pub use engine::{
    AnswerComposer, ChatEvent, ChatWorkflow, NumericContext, NumericFlow, TextFlow,
    NO_NUMERIC_DATA, NO_TEXT_CONTEXT,
};
