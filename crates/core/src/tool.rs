//! Tool invocation seam.
//!
//! Order operations live in an external sidecar. The orchestrator only ever
//! sees the [`ToolGateway`] trait: a named call with a flat argument map that
//! yields a single text result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A tool invocation extracted from model output (or matched by keyword).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDirective {
    /// Tool name, e.g. `create_order`
    pub name: String,

    /// Flat argument map. Values are JSON strings or integers.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolDirective {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    /// Builder-style argument insertion. Later inserts replace earlier ones.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// Access to the tool sidecar.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Invoke `name` with `arguments` and return the first text block of the result.
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError>;

    /// Enumerate the tools the sidecar offers.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_arg_last_write_wins() {
        let directive = ToolDirective::new("query_order")
            .with_arg("orderNumber", "ORD-1")
            .with_arg("orderNumber", "ORD-2");
        assert_eq!(directive.arguments.len(), 1);
        assert_eq!(directive.arguments["orderNumber"], "ORD-2");
    }
}
