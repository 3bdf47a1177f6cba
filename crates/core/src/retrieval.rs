//! Retriever trait — similarity search over the store's knowledge base.
//!
//! Retrieval is best-effort: a failing [`Retriever`] degrades a chat turn to
//! "no context" and is never surfaced to the customer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::RetrievalError;

/// Number of snippets fetched when the caller asks for zero.
pub const DEFAULT_TOP_K: usize = 3;

/// A retrieved knowledge-base entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    /// Document id in the vector store
    pub id: String,

    /// The document text
    pub text: String,

    /// The `category` metadata string, when the document carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Distance from the query (lower is closer)
    #[serde(default)]
    pub distance: f32,
}

/// A document to be added to the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` snippets closest to `query`, best first.
    /// `k == 0` means [`DEFAULT_TOP_K`].
    async fn search(&self, query: &str, k: usize) -> Result<Vec<KnowledgeSnippet>, RetrievalError>;
}
