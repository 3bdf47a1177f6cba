//! Per-request control flow.
//!
//! Directive mode: retrieve → assemble → complete → extract → at most one
//! tool call. Tool-loop mode swaps the last two steps for [`tool_loop::run`].
//! Retrieval failures are absorbed. Completion failures abort the turn.
//! Tool failures become reply text.

use std::sync::Arc;
use std::time::Instant;

use shopdesk_config::{AppConfig, AssistantMode};
use shopdesk_core::message::Message;
use shopdesk_core::provider::{Provider, ProviderRequest, ToolDefinition};
use shopdesk_core::retrieval::{DEFAULT_TOP_K, KnowledgeSnippet, Retriever};
use shopdesk_core::tool::{ToolDirective, ToolGateway};
use tracing::{debug, info, warn};

use crate::assembler::ConversationAssembler;
use crate::directive;
use crate::intent::IntentMatcher;
use crate::prompt::tool_failure_reply;
use crate::tool_loop;

/// Model and sampling settings applied to every turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: usize,
    pub mode: AssistantMode,
    pub max_tool_rounds: u32,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            model: "qwen-max".into(),
            temperature: 0.1,
            top_p: Some(0.8),
            top_k: DEFAULT_TOP_K,
            mode: AssistantMode::Directive,
            max_tool_rounds: 5,
        }
    }
}

impl TurnSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.provider.chat_model.clone(),
            temperature: config.provider.temperature,
            top_p: Some(config.provider.top_p),
            top_k: config.knowledge.top_k,
            mode: config.assistant.mode,
            max_tool_rounds: config.assistant.max_tool_rounds,
        }
    }
}

/// One inbound chat message plus the history the client sent with it.
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    pub message: String,
    pub history: Vec<Message>,
}

impl ChatTurn {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

/// Ties retrieval, the model and the tool sidecar together for one turn.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    tools: Arc<dyn ToolGateway>,
    retriever: Option<Arc<dyn Retriever>>,
    assembler: ConversationAssembler,
    settings: TurnSettings,
    tool_definitions: Vec<ToolDefinition>,
    intents: Option<IntentMatcher>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<dyn ToolGateway>, settings: TurnSettings) -> Self {
        Self {
            provider,
            tools,
            retriever: None,
            assembler: ConversationAssembler::default(),
            settings,
            tool_definitions: Vec::new(),
            intents: None,
        }
    }

    /// Attach a knowledge base. Without one, turns run with no context.
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Replace the built-in system preamble.
    pub fn with_system_prompt(mut self, preamble: impl Into<String>) -> Self {
        self.assembler = ConversationAssembler::new(preamble);
        self
    }

    /// Tool definitions offered to the model in tool-loop mode.
    pub fn with_tool_definitions(mut self, definitions: Vec<ToolDefinition>) -> Self {
        self.tool_definitions = definitions;
        self
    }

    /// Enable keyword intent matching for turns without a directive.
    pub fn with_keyword_fallback(mut self, matcher: IntentMatcher) -> Self {
        self.intents = Some(matcher);
        self
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Produce the reply for one turn.
    pub async fn respond(&self, turn: &ChatTurn) -> shopdesk_core::Result<String> {
        let started = Instant::now();
        let snippets = self.retrieve(&turn.message).await;
        let messages = self.assembler.build(&snippets, &turn.history, &turn.message);
        debug!(
            messages = messages.len(),
            snippets = snippets.len(),
            history = turn.history.len(),
            "Conversation assembled"
        );

        let reply = match self.settings.mode {
            AssistantMode::Directive => self.directive_turn(&turn.message, messages).await?,
            AssistantMode::ToolLoop => {
                let mut request = self.request(messages);
                request.tools = self.tool_definitions.clone();
                tool_loop::run(
                    self.provider.as_ref(),
                    self.tools.as_ref(),
                    request,
                    self.settings.max_tool_rounds,
                )
                .await?
            }
        };

        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Turn complete");
        Ok(reply)
    }

    async fn retrieve(&self, query: &str) -> Vec<KnowledgeSnippet> {
        let Some(retriever) = &self.retriever else {
            return Vec::new();
        };
        match retriever.search(query, self.settings.top_k).await {
            Ok(snippets) => {
                debug!(count = snippets.len(), "Retrieved knowledge snippets");
                snippets
            }
            Err(e) => {
                warn!(error = %e, "Knowledge retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }

    fn request(&self, messages: Vec<Message>) -> ProviderRequest {
        let mut request = ProviderRequest::new(&self.settings.model, messages);
        request.temperature = self.settings.temperature;
        request.top_p = self.settings.top_p;
        request
    }

    async fn directive_turn(&self, message: &str, messages: Vec<Message>) -> shopdesk_core::Result<String> {
        let response = self.provider.complete(self.request(messages)).await?;
        let text = response.message.content;

        if let Some(directive) = directive::extract(&text) {
            info!(tool = %directive.name, "Directive found in model output");
            let narrative = directive::strip_directives(&text);
            return Ok(match self.dispatch(&directive).await {
                Ok(result) => directive::splice_reply(&narrative, &result),
                Err(reply) => reply,
            });
        }

        if let Some(directive) = self.intents.as_ref().and_then(|m| m.match_intent(message)) {
            info!(tool = %directive.name, "Keyword intent matched");
            return Ok(self.dispatch(&directive).await.unwrap_or_else(|reply| reply));
        }

        debug!("No directive in model output");
        Ok(text)
    }

    /// Call the tool. The error side is already the user-facing reply.
    async fn dispatch(&self, directive: &ToolDirective) -> Result<String, String> {
        let started = Instant::now();
        match self.tools.call_tool(&directive.name, &directive.arguments).await {
            Ok(result) => {
                info!(
                    tool = %directive.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool dispatched"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(tool = %directive.name, error = %e, "Tool dispatch failed");
                Err(tool_failure_reply(e))
            }
        }
    }
}
