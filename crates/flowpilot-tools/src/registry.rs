use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use flowpilot_core::config::ToolsConfig;
use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::traits::Tool;
use flowpilot_core::types::{ToolContext, ToolDefinition, ToolResult};

use crate::builtin;

/// Registry of available tools.
///
/// Declarations are listed in name order so prompts built from the catalog
/// are reproducible.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool declarations for the model.
    pub fn declarations(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Run exactly one tool body for one requested call.
    ///
    /// Fails with `ToolNotFound` for undeclared names and `ToolTimeout` when
    /// the tool outlives its own timeout. Errors from the tool body are
    /// returned unchanged; turning them into model-visible results is the
    /// caller's job.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| FlowError::ToolNotFound(name.to_string()))?;

        debug!(tool = %name, node_id = %ctx.node_id, "Invoking tool");

        let timeout = std::time::Duration::from_secs(tool.timeout_secs());
        match tokio::time::timeout(timeout, tool.execute(arguments, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(FlowError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }

    /// Create a registry with the builtin catalog registered.
    pub fn with_builtins(config: &ToolsConfig) -> Self {
        let mut registry = Self::new();

        registry.register(builtin::calculator::CalculatorTool);
        registry.register(builtin::current_time::CurrentTimeTool);
        registry.register(builtin::json_query::JsonQueryTool);
        registry.register(builtin::web_fetch::WebFetchTool::new(config.fetch_max_length));

        if let Some(key) = config.web_search_api_key.as_deref().filter(|k| !k.is_empty()) {
            registry.register(builtin::web_search::WebSearchTool::new(key));
        }

        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
