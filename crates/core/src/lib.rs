//! # ShopDesk Core
//!
//! Domain types, traits, and error definitions for the ShopDesk assistant.
//! This crate has **no I/O dependencies**. It defines the seams that the
//! other crates implement against:
//!
//! - [`Provider`]: chat completion and embeddings
//! - [`Retriever`]: knowledge-base similarity search
//! - [`ToolGateway`]: named tool invocation on the order-operations sidecar
//!
//! Every crate depends inward on this one, so the orchestrator can be tested
//! with in-memory fakes for all three.

pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, RetrievalError, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
    ToolDefinition, Usage,
};
pub use retrieval::{KnowledgeDocument, KnowledgeSnippet, Retriever};
pub use tool::{ToolDirective, ToolGateway};
