//! In-memory fakes for orchestrator and tool-loop tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::{Map, Value};
use shopdesk_core::error::{ProviderError, RetrievalError, ToolError};
use shopdesk_core::message::{Message, MessageToolCall};
use shopdesk_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
use shopdesk_core::retrieval::{KnowledgeSnippet, Retriever};
use shopdesk_core::tool::ToolGateway;

/// A provider that returns scripted results in order and records every
/// request it receives.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![Ok(make_text_response(text))])
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("SequentialMockProvider: no more responses")
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        finish_reason: Some("stop".into()),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        request_id: None,
    }
}

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut response = make_text_response("");
    response.message.tool_calls = tool_calls;
    response.finish_reason = Some("tool_calls".into());
    response
}

pub fn make_tool_call(id: &str, name: &str, args: Value) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments: args.to_string(),
    }
}

/// A retriever with a fixed outcome.
pub struct FixedRetriever {
    result: Result<Vec<KnowledgeSnippet>, RetrievalError>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl FixedRetriever {
    pub fn returning(snippets: Vec<KnowledgeSnippet>) -> Self {
        Self {
            result: Ok(snippets),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: RetrievalError) -> Self {
        Self {
            result: Err(error),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Retriever for FixedRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<KnowledgeSnippet>, RetrievalError> {
        self.queries.lock().unwrap().push((query.to_string(), k));
        self.result.clone()
    }
}

pub fn snippet(text: &str, category: &str) -> KnowledgeSnippet {
    KnowledgeSnippet {
        id: format!("doc-{}", text.chars().count()),
        text: text.into(),
        category: Some(category.into()),
        distance: 0.3,
    }
}

/// A tool gateway that answers every call the same way and records calls.
pub struct RecordingGateway {
    reply: Result<String, ToolError>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl RecordingGateway {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ToolError) -> Self {
        Self {
            reply: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ToolGateway for RecordingGateway {
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        self.reply.clone()
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        Ok(Vec::new())
    }
}
