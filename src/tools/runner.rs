//! Tool runner - an agent's private tool set

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::ToolCallRequest;
use crate::error::Error;
use crate::Result;

use super::Tool;

/// Tool definition for LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool call matched to its tool, with parsed arguments
pub struct ResolvedCall {
    pub id: String,
    pub tool: Arc<dyn Tool>,
    pub args: Value,
}

/// Tool runner manages registered tools and executes them
#[derive(Clone, Default)]
pub struct ToolRunner {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRunner {
    /// Create an empty tool runner
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_shared(Arc::new(tool));
    }

    /// Register a tool instance that other runners may also hold
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        debug!("Registering tool: {}", tool.name());
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get tool definitions for LLM, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Match a model tool call to a registered tool and parse its arguments.
    ///
    /// Fails with [`Error::UnknownTool`] when the name is not registered and
    /// [`Error::MalformedArguments`] when the payload is not a JSON object
    /// carrying every key the schema marks as required.
    pub fn resolve(&self, call: &ToolCallRequest) -> Result<ResolvedCall> {
        let tool = self
            .tools
            .get(&call.name)
            .cloned()
            .ok_or_else(|| Error::UnknownTool(call.name.clone()))?;

        let args = parse_arguments(&call.name, &call.arguments)?;
        check_required(&call.name, &tool.parameters(), &args)?;

        Ok(ResolvedCall {
            id: call.id.clone(),
            tool,
            args,
        })
    }

    /// Run a resolved call and format its result
    pub async fn execute(&self, call: ResolvedCall) -> Result<String> {
        let name = call.tool.name().to_string();
        debug!("Executing tool: {} with args: {}", name, call.args);

        match call.tool.run(call.args).await {
            Ok(output) => {
                let text = call.tool.format(&output);
                debug!("Tool {} succeeded: {} chars", name, text.len());
                Ok(text)
            }
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                Err(match e {
                    Error::MalformedArguments { .. } | Error::ToolExecution { .. } => e,
                    other => Error::tool_execution(&name, other),
                })
            }
        }
    }

    /// Get a registered tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List registered tool names
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn parse_arguments(tool: &str, raw: &str) -> Result<Value> {
    // Some models send an empty string for parameterless calls
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    let value: Value =
        serde_json::from_str(raw).map_err(|e| Error::malformed(tool, format!("invalid JSON: {}", e)))?;

    if !value.is_object() {
        return Err(Error::malformed(tool, "arguments must be a JSON object"));
    }
    Ok(value)
}

fn check_required(tool: &str, schema: &Value, args: &Value) -> Result<()> {
    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|k| k.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    for key in required {
        if args.get(key).map_or(true, Value::is_null) {
            return Err(Error::malformed(tool, format!("missing required argument '{}'", key)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{json_schema, DummyTool, ToolOutput};
    use async_trait::async_trait;

    struct NeedsKeyword;

    #[async_trait]
    impl Tool for NeedsKeyword {
        fn name(&self) -> &str {
            "needs_keyword"
        }

        fn description(&self) -> String {
            "requires a keyword".to_string()
        }

        fn parameters(&self) -> Value {
            json_schema(serde_json::json!({"keyword": {"type": "string"}}), &["keyword"])
        }

        async fn run(&self, args: Value) -> Result<ToolOutput> {
            Ok(ToolOutput::Text(format!("searched {}", args["keyword"])))
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> String {
            "always fails".to_string()
        }

        fn parameters(&self) -> Value {
            json_schema(serde_json::json!({}), &[])
        }

        async fn run(&self, _args: Value) -> Result<ToolOutput> {
            Err(Error::Other("backend unreachable".to_string()))
        }
    }

    async fn execute_call(runner: &ToolRunner, call: &ToolCallRequest) -> Result<String> {
        let resolved = runner.resolve(call)?;
        runner.execute(resolved).await
    }

    fn runner() -> ToolRunner {
        let mut runner = ToolRunner::new();
        runner.register(DummyTool {
            name: "test_tool".to_string(),
            result: "success".to_string(),
        });
        runner.register(NeedsKeyword);
        runner.register(Broken);
        runner
    }

    #[tokio::test]
    async fn test_tool_runner_register_and_execute() {
        let runner = runner();
        assert!(runner.get("test_tool").is_some());

        let call = ToolCallRequest::new("c1", "test_tool", "{}");
        assert_eq!(execute_call(&runner, &call).await.unwrap(), "success");
    }

    #[tokio::test]
    async fn test_tool_runner_unknown_tool() {
        let call = ToolCallRequest::new("c1", "unknown", "{}");
        let result = execute_call(&runner(), &call).await;
        assert!(matches!(result, Err(Error::UnknownTool(name)) if name == "unknown"));
    }

    #[test]
    fn test_resolve_malformed_arguments() {
        let runner = runner();

        let bad_json = ToolCallRequest::new("c1", "needs_keyword", "{keyword:");
        assert!(matches!(runner.resolve(&bad_json), Err(Error::MalformedArguments { .. })));

        let not_object = ToolCallRequest::new("c2", "needs_keyword", "[1, 2]");
        assert!(matches!(runner.resolve(&not_object), Err(Error::MalformedArguments { .. })));

        let missing = ToolCallRequest::new("c3", "needs_keyword", r#"{"other": 1}"#);
        assert!(matches!(runner.resolve(&missing), Err(Error::MalformedArguments { .. })));

        let empty = ToolCallRequest::new("c4", "test_tool", "");
        assert!(runner.resolve(&empty).is_ok());
    }

    #[tokio::test]
    async fn test_backend_failure_is_tool_execution() {
        let call = ToolCallRequest::new("c1", "broken", "{}");
        let result = execute_call(&runner(), &call).await;
        assert!(matches!(result, Err(Error::ToolExecution { tool, .. }) if tool == "broken"));
    }

    #[test]
    fn test_definitions_sorted() {
        let names: Vec<String> = runner().definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["broken", "needs_keyword", "test_tool"]);
    }
}
