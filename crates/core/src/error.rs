//! Error types for the ShopDesk domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] aggregates them.

use thiserror::Error;

/// The top-level error type for all ShopDesk operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Completion / embedding endpoint ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Knowledge base ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Tool sidecar ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the hosted chat-completion / embedding endpoint.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    /// HTTP 200, but the body carried a non-success error code.
    #[error("Upstream error {code}: {message}")]
    Upstream { code: String, message: String },

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures fetching knowledge snippets. Never fatal to a chat turn.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Query embedding failed: {0}")]
    Embedding(ProviderError),

    #[error("Vector store request failed: {message} (status: {status_code})")]
    Query { status_code: u16, message: String },

    #[error("Malformed vector store response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures invoking a tool on the sidecar.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The sidecar answered the call with an RPC error object.
    #[error("tool call failed ({code}): {message}")]
    CallFailed { code: i64, message: String },

    #[error("tool {tool} returned no content")]
    EmptyResult { tool: String },

    /// The sidecar could not be started or is gone.
    #[error("tool gateway unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_call_error_keeps_code_and_message() {
        let err = ToolError::CallFailed {
            code: -32602,
            message: "unknown product".into(),
        };
        assert_eq!(err.to_string(), "tool call failed (-32602): unknown product");
    }

    #[test]
    fn retrieval_error_wraps_embedding_failure() {
        let err: Error = RetrievalError::Embedding(ProviderError::Network("refused".into())).into();
        let text = err.to_string();
        assert!(text.starts_with("Retrieval error"));
        assert!(text.contains("refused"));
    }
}
