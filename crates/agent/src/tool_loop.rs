//! Iterative structured tool calling.
//!
//! Tool definitions ride along with every completion request. While the
//! model answers with tool calls, each call is executed and its result is
//! appended as a `tool` message, then the model is asked again. The loop is
//! bounded; running out of rounds yields a canned apology.

use std::time::Instant;

use serde_json::{Map, Value};
use shopdesk_core::error::ProviderError;
use shopdesk_core::message::{Message, MessageToolCall};
use shopdesk_core::provider::{Provider, ProviderRequest};
use shopdesk_core::tool::ToolGateway;
use tracing::{debug, info, warn};

use crate::prompt::{TOOL_LOOP_EXHAUSTED_REPLY, tool_loop_failure};

/// Run the loop starting from `request`, which already carries messages
/// and tool definitions.
pub async fn run(
    provider: &dyn Provider,
    tools: &dyn ToolGateway,
    mut request: ProviderRequest,
    max_rounds: u32,
) -> Result<String, ProviderError> {
    for round in 1..=max_rounds {
        let response = provider.complete(request.clone()).await?;
        if !response.wants_tool_calls() {
            debug!(round, "Model answered without tool calls");
            return Ok(response.message.content);
        }

        let calls = response.message.tool_calls.clone();
        info!(round, calls = calls.len(), "Model requested tool calls");
        request.messages.push(response.message);

        for call in &calls {
            let content = execute(tools, call).await;
            request.messages.push(Message::tool_result(&call.id, content));
        }
    }

    warn!(max_rounds, "Tool loop exhausted without a final answer");
    Ok(TOOL_LOOP_EXHAUSTED_REPLY.to_string())
}

/// Execute one structured call. Failures become the message content so
/// the model can see them.
async fn execute(tools: &dyn ToolGateway, call: &MessageToolCall) -> String {
    let arguments = match parse_arguments(&call.arguments) {
        Ok(arguments) => arguments,
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Tool call arguments are not a JSON object");
            return tool_loop_failure(format!("invalid arguments: {e}"));
        }
    };

    let started = Instant::now();
    match tools.call_tool(&call.name, &arguments).await {
        Ok(text) => {
            info!(tool = %call.name, elapsed_ms = started.elapsed().as_millis() as u64, "Tool executed");
            pretty_json(&text).unwrap_or(text)
        }
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Tool execution failed");
            tool_loop_failure(e)
        }
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(raw)
}

/// Re-indent a result that is a JSON object.
fn pretty_json(text: &str) -> Option<String> {
    let object: Map<String, Value> = serde_json::from_str(text).ok()?;
    serde_json::to_string_pretty(&object).ok()
}
