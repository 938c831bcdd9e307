//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are how the agent reads and edits the metadata document. Each tool
//! reaches the document only through a [`ToolContext`], which exposes the
//! current document and a single mutation entry point.

use crate::error::ToolError;
use crate::message::ChatMessage;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use dandiclaw_patch::{Operation, PatchError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: Value,
}

/// What a tool hands back to the agent loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Text relayed to the model as the tool result
    pub result: String,

    /// Extra messages to append after the tool result
    pub new_messages: Vec<ChatMessage>,

    /// Whether the tool achieved what was asked
    pub success: bool,
}

impl ToolOutput {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            new_messages: Vec::new(),
            success: true,
        }
    }

    pub fn failure(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            new_messages: Vec::new(),
            success: false,
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.new_messages = messages;
        self
    }
}

/// The narrow view of the document a tool gets.
pub trait ToolContext: Send {
    /// The document as it currently stands.
    fn document(&self) -> &Value;

    /// Apply one path operation to the document.
    fn modify(&mut self, operation: Operation, path: &str, value: Option<Value>) -> Result<(), PatchError>;
}

/// The core Tool trait.
///
/// Each tool implements this trait. Tools are registered in the
/// [`ToolRegistry`] and made available to the agent loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_metadata").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Longer guidance included in the system prompt.
    fn usage_guide(&self) -> &str {
        ""
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Value, ctx: &mut dyn ToolContext) -> Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Parse tool arguments into their typed form.
pub fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Look up and execute tools when the model requests them
///
/// Tools are kept sorted by name so the declarations sent to the model are
/// stable from turn to turn.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// `(name, guide)` pairs for tools that carry a usage guide.
    pub fn usage_guides(&self) -> Vec<(&str, &str)> {
        self.tools
            .values()
            .filter(|t| !t.usage_guide().is_empty())
            .map(|t| (t.name(), t.usage_guide()))
            .collect()
    }

    /// Execute a tool call.
    pub async fn execute(&self, call: &ToolCall, ctx: &mut dyn ToolContext) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(call.arguments.clone(), ctx).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A bare document context for unit tests.
    struct Doc(Value);

    impl ToolContext for Doc {
        fn document(&self) -> &Value {
            &self.0
        }

        fn modify(&mut self, operation: Operation, path: &str, value: Option<Value>) -> Result<(), PatchError> {
            self.0 = dandiclaw_patch::apply_operation(&self.0, operation, path, value)?;
            Ok(())
        }
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct RenameParams {
        name: String,
    }

    /// A simple test tool that renames the document.
    struct RenameTool;

    #[async_trait]
    impl Tool for RenameTool {
        fn name(&self) -> &str {
            "rename"
        }
        fn description(&self) -> &str {
            "Sets the document name"
        }
        fn usage_guide(&self) -> &str {
            "Use rename to change the title."
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" }
                },
                "required": ["name"]
            })
        }
        async fn execute(&self, arguments: Value, ctx: &mut dyn ToolContext) -> Result<ToolOutput, ToolError> {
            let params: RenameParams = parse_arguments(arguments)?;
            ctx.modify(Operation::Set, "name", Some(Value::String(params.name)))
                .map_err(|e| ToolError::ExecutionFailed { tool_name: "rename".into(), reason: e.to_string() })?;
            Ok(ToolOutput::success("renamed"))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(RenameTool));
        assert!(registry.get("rename").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.usage_guides(), vec![("rename", "Use rename to change the title.")]);
    }

    #[test]
    fn registry_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(RenameTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "rename");
    }

    #[tokio::test]
    async fn registry_execute_tool_mutates_through_context() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(RenameTool));
        let mut doc = Doc(serde_json::json!({"name": "old"}));

        let call = ToolCall {
            id: "call_1".into(),
            name: "rename".into(),
            arguments: serde_json::json!({"name": "new"}),
        };
        let output = registry.execute(&call, &mut doc).await.unwrap();
        assert!(output.success);
        assert_eq!(doc.0["name"], "new");
    }

    #[tokio::test]
    async fn unknown_fields_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(RenameTool));
        let mut doc = Doc(serde_json::json!({}));
        let call = ToolCall {
            id: "call_1".into(),
            name: "rename".into(),
            arguments: serde_json::json!({"name": "x", "force": true}),
        };
        let err = registry.execute(&call, &mut doc).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let mut doc = Doc(Value::Null);
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.execute(&call, &mut doc).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
