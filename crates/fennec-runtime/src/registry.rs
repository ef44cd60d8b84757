use std::collections::HashMap;
use std::sync::Arc;
use serde_json::Value;
use tracing::{debug, info, warn};

use fennec_core::{Tool, ToolCall, ToolExecutor, ToolResult};

/// Registry of the tool collaborators the agent may invoke.
///
/// The registry holds no tool logic itself: it looks up executors by name,
/// validates arguments against the tool's declared input schema before
/// dispatch, and wraps every failure — unknown tool, schema mismatch, or a
/// collaborator error — as an error-flagged [`ToolResult`] rather than
/// propagating, so a bad tool call never aborts the reasoning loop.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its declared name.
    pub fn register(&mut self, tool: Arc<dyn ToolExecutor>) {
        let name = tool.definition().name;
        debug!(tool = %name, "tool registered");
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolExecutor>> {
        self.tools.get(name)
    }

    /// All tool definitions, for the LLM request.
    pub fn definitions(&self) -> Vec<Tool> {
        let mut defs: Vec<Tool> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A new registry with only the named tools. Used to restrict what a
    /// delegated sub-agent may touch.
    pub fn subset(&self, names: &[String]) -> ToolRegistry {
        let mut subset = ToolRegistry::new();
        for name in names {
            if let Some(tool) = self.tools.get(name) {
                subset.register(Arc::clone(tool));
            }
        }
        subset
    }

    /// Execute a tool call: validate the arguments against the input schema,
    /// dispatch, and wrap any failure as an error result.
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.tool_name) else {
            warn!(tool = %call.tool_name, "unknown tool requested");
            return ToolResult::error(
                &call.id,
                format!("Error: unknown tool '{}'", call.tool_name),
            );
        };

        let definition = tool.definition();
        if let Err(reason) = validate_arguments(&definition.input_schema, &call.arguments) {
            warn!(tool = %call.tool_name, reason = %reason, "tool arguments failed schema validation");
            return ToolResult::error(
                &call.id,
                format!(
                    "Error: invalid arguments for '{}': {}",
                    call.tool_name, reason
                ),
            );
        }

        match tool.execute(&call.arguments).await {
            Ok(output) => {
                info!(tool = %call.tool_name, output_len = output.len(), "tool executed");
                ToolResult::ok(&call.id, output)
            }
            Err(e) => {
                warn!(tool = %call.tool_name, error = %e, "tool execution failed");
                ToolResult::error(
                    &call.id,
                    format!("Error executing tool '{}': {}", call.tool_name, e),
                )
            }
        }
    }
}

/// Check an arguments object against a JSON Schema fragment: the top-level
/// type, required properties, and declared property types. Deliberately not
/// a full JSON Schema implementation — just the contract tools declare.
fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(()); // no schema declared — accept anything
    };

    if schema_obj.get("type").and_then(|t| t.as_str()) == Some("object")
        && !arguments.is_object()
    {
        return Err(format!("expected an object, got {}", type_name(arguments)));
    }

    if let Some(required) = schema_obj.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if arguments.get(field).is_none() {
                return Err(format!("missing required field '{field}'"));
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(|p| p.as_object()) {
        for (name, prop_schema) in properties {
            let Some(value) = arguments.get(name) else {
                continue;
            };
            let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) else {
                continue;
            };
            let ok = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !ok {
                return Err(format!(
                    "field '{}' should be {}, got {}",
                    name,
                    expected,
                    type_name(value)
                ));
            }
        }
    }

    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl ToolExecutor for EchoTool {
        fn definition(&self) -> Tool {
            Tool {
                name: "echo".into(),
                description: "Echo the input text".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"],
                }),
                output_schema: serde_json::json!({ "type": "string" }),
            }
        }

        async fn execute(&self, arguments: &Value) -> fennec_core::Result<String> {
            Ok(arguments["text"].as_str().unwrap_or("").to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl ToolExecutor for FailingTool {
        fn definition(&self) -> Tool {
            Tool {
                name: "broken".into(),
                description: "Always fails".into(),
                input_schema: serde_json::json!({ "type": "object" }),
                output_schema: Value::Null,
            }
        }

        async fn execute(&self, _arguments: &Value) -> fennec_core::Result<String> {
            Err(fennec_core::FennecError::ToolInvocation {
                tool: "broken".into(),
                reason: "collaborator exploded".into(),
            })
        }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(FailingTool));
        reg
    }

    fn call(tool: &str, args: Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            tool_name: tool.into(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let result = registry()
            .invoke(&call("echo", serde_json::json!({"text": "hi"})))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "hi");
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool_is_error_result() {
        let result = registry().invoke(&call("nope", serde_json::json!({}))).await;
        assert!(result.is_error);
        assert!(result.content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_invoke_missing_required_field() {
        let result = registry().invoke(&call("echo", serde_json::json!({}))).await;
        assert!(result.is_error);
        assert!(result.content.contains("missing required field"));
    }

    #[tokio::test]
    async fn test_invoke_wrong_field_type() {
        let result = registry()
            .invoke(&call("echo", serde_json::json!({"text": 42})))
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("should be string"));
    }

    #[tokio::test]
    async fn test_invoke_wraps_executor_error() {
        let result = registry().invoke(&call("broken", serde_json::json!({}))).await;
        assert!(result.is_error);
        assert!(result.content.contains("collaborator exploded"));
    }

    #[test]
    fn test_subset_restricts_tools() {
        let reg = registry();
        let subset = reg.subset(&["echo".to_string()]);
        assert_eq!(subset.names(), vec!["echo"]);
        assert!(subset.get("broken").is_none());
    }
}
