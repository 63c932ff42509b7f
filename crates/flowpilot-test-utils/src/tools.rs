use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::traits::Tool;
use flowpilot_core::types::{ToolContext, ToolResult};

/// Returns `echo: <text>` and counts its invocations.
#[derive(Clone, Default)]
pub struct EchoTool {
    calls: Arc<AtomicUsize>,
}

impl EchoTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string", "description": "Text to echo" } },
            "required": ["text"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = input["text"]
                .as_str()
                .ok_or_else(|| FlowError::ToolValidation("'text' must be a string".into()))?;
            Ok(ToolResult::success(format!("echo: {}", text)))
        })
    }
}

/// Always fails with `ToolExecution`.
pub struct FailingTool;

impl Tool for FailingTool {
    fn name(&self) -> &str {
        "always_fails"
    }

    fn description(&self) -> &str {
        "A tool whose body always fails."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            Err(FlowError::ToolExecution {
                tool: "always_fails".into(),
                message: "simulated failure".into(),
            })
        })
    }
}

/// Sleeps past its own one-second timeout.
pub struct SlowTool;

impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "A tool that never finishes in time."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    fn timeout_secs(&self) -> u64 {
        1
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolResult::success("too late"))
        })
    }
}
