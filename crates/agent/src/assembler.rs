//! Conversation assembly: the ordered message list for one completion call.
//!
//! Order is fixed: instruction preamble, retrieved context (only when there
//! is any), client history, then the current user message. Assembly is pure;
//! the orchestrator does the logging.

use shopdesk_core::message::{Message, Role};
use shopdesk_core::retrieval::KnowledgeSnippet;

use crate::prompt::{CONTEXT_HEADER, SYSTEM_PREAMBLE};

/// Builds the message list for a turn.
#[derive(Debug, Clone)]
pub struct ConversationAssembler {
    preamble: String,
}

impl Default for ConversationAssembler {
    fn default() -> Self {
        Self::new(SYSTEM_PREAMBLE)
    }
}

impl ConversationAssembler {
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
        }
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Assemble the messages for one turn.
    ///
    /// A history entry is dropped when it is a user message whose content
    /// equals `current`: clients often echo the turn being sent into their
    /// own history array.
    pub fn build(
        &self,
        snippets: &[KnowledgeSnippet],
        history: &[Message],
        current: &str,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(Message::system(&self.preamble));

        if let Some(context) = format_snippets(snippets) {
            messages.push(Message::system(context));
        }

        messages.extend(
            history
                .iter()
                .filter(|m| !(m.role == Role::User && m.content == current))
                .cloned(),
        );

        messages.push(Message::user(current));
        messages
    }
}

/// Render snippets as the enumerated context block, or `None` when empty.
pub fn format_snippets(snippets: &[KnowledgeSnippet]) -> Option<String> {
    if snippets.is_empty() {
        return None;
    }

    let mut block = String::from(CONTEXT_HEADER);
    for (i, snippet) in snippets.iter().enumerate() {
        block.push('\n');
        block.push_str(&format!("{}. {}", i + 1, snippet.text));
        if let Some(category) = &snippet.category {
            block.push_str(&format!("\n   category: {category}"));
        }
    }
    Some(block)
}
