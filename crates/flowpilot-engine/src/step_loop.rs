//! The model/tool exchange for a single node.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flowpilot_core::config::EngineConfig;
use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::types::{ChatMessage, ContentBlock, ToolContext, ToolResult};
use flowpilot_llm::{ModelGateway, ModelReply};
use flowpilot_tools::ToolRegistry;

use crate::graph::Node;
use crate::prompt;
use crate::state::ToolCallRecord;

/// What a step produced.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub output: String,
    /// Every tool call made, in request order.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Model round-trips used.
    pub turns: usize,
}

/// Runs one node: prompt the model, execute requested tools, feed results
/// back, until the model answers without requesting tools.
pub struct StepRunner {
    gateway: Arc<ModelGateway>,
    tools: Arc<ToolRegistry>,
    config: EngineConfig,
}

impl StepRunner {
    pub fn new(gateway: Arc<ModelGateway>, tools: Arc<ToolRegistry>, config: EngineConfig) -> Self {
        Self {
            gateway,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute `node` with `input`.
    ///
    /// Tool failures, including requests for unknown tools, are handed back
    /// to the model as error results. Model failures, cancellation and
    /// exceeding `max_tool_iterations` end the step with an error.
    /// `on_tool_call` fires after each tool call is recorded.
    pub async fn run(
        &self,
        execution_id: &str,
        node: &Node,
        input: &str,
        cancel: &CancellationToken,
        on_tool_call: &mut (dyn FnMut(&ToolCallRecord) + Send),
    ) -> Result<StepOutcome> {
        let declarations = self.tools.declarations();
        let mut conversation =
            prompt::step_conversation(node, input, self.config.system_prompt.as_deref());
        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();
        let mut total_input_tokens = 0u64;
        let mut total_output_tokens = 0u64;

        for turn in 1..=self.config.max_tool_iterations {
            if cancel.is_cancelled() {
                return Err(FlowError::Cancelled);
            }

            let completion = tokio::select! {
                result = self.gateway.complete(&conversation, &declarations) => result?,
                _ = cancel.cancelled() => return Err(FlowError::Cancelled),
            };
            total_input_tokens += completion.input_tokens;
            total_output_tokens += completion.output_tokens;

            let requests = match completion.reply {
                ModelReply::FinalAnswer(text) => {
                    debug!(
                        node_id = %node.id,
                        turns = turn,
                        input_tokens = total_input_tokens,
                        output_tokens = total_output_tokens,
                        "Step answered"
                    );
                    let output = if text.trim().is_empty() {
                        warn!(node_id = %node.id, "Model returned no answer, using placeholder");
                        self.config.missing_answer_text.clone()
                    } else {
                        text
                    };
                    return Ok(StepOutcome {
                        output,
                        tool_calls,
                        turns: turn,
                    });
                }
                ModelReply::ToolRequests(requests) => requests,
            };

            info!(node_id = %node.id, turn, count = requests.len(), "Executing tool calls");
            conversation.push(completion.message);

            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                if cancel.is_cancelled() {
                    return Err(FlowError::Cancelled);
                }

                let ctx = ToolContext::new(execution_id, node.id.as_str());
                let result = match self
                    .tools
                    .invoke(&request.name, request.arguments.clone(), ctx)
                    .await
                {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(node_id = %node.id, tool = %request.name, error = %e, "Tool call failed");
                        ToolResult::error(e.to_string())
                    }
                };
                debug!(
                    tool = %request.name,
                    is_error = result.is_error,
                    len = result.content.len(),
                    "Tool result"
                );

                results.push(ContentBlock::ToolResult {
                    tool_use_id: request.call_id,
                    tool_name: request.name.clone(),
                    content: result.content.clone(),
                    is_error: result.is_error,
                });

                let record = ToolCallRecord {
                    name: request.name,
                    arguments: request.arguments,
                    result,
                };
                on_tool_call(&record);
                tool_calls.push(record);
            }

            conversation.push(ChatMessage::tool_results(results));
        }

        Err(FlowError::ToolLoopExceeded(self.config.max_tool_iterations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_core::traits::LlmClient;
    use flowpilot_core::types::Role;
    use flowpilot_test_utils::{test_model_config, EchoTool, FailingTool, ScriptedLlm, ScriptedTurn};
    use serde_json::json;

    fn runner(llm: &ScriptedLlm, config: EngineConfig) -> StepRunner {
        let client: Arc<dyn LlmClient> = Arc::new(llm.clone());
        let gateway = Arc::new(ModelGateway::new(client, test_model_config()));
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool::new());
        tools.register(FailingTool);
        StepRunner::new(gateway, Arc::new(tools), config)
    }

    async fn run_step(runner: &StepRunner, cancel: &CancellationToken) -> Result<StepOutcome> {
        let node = Node::new("n1", "Step").with_instruction("Do the thing.");
        runner.run("exec-1", &node, "hello", cancel, &mut |_| {}).await
    }

    #[tokio::test]
    async fn test_final_answer_without_tools() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::text("done")]);
        let runner = runner(&llm, EngineConfig::default());
        let outcome = run_step(&runner, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.output, "done");
        assert!(outcome.tool_calls.is_empty());
        assert_eq!(outcome.turns, 1);

        let requests = llm.requests();
        assert_eq!(requests[0][0].role, Role::System);
        assert!(requests[0][1].text().ends_with("## Input\n\nhello"));
        assert_eq!(llm.tool_catalogs()[0], vec!["always_fails", "echo"]);
    }

    #[tokio::test]
    async fn test_tool_calls_recorded_in_request_order() {
        let llm = ScriptedLlm::new(vec![
            ScriptedTurn::tool_calls(vec![
                ("echo", json!({"text": "one"})),
                ("echo", json!({"text": "two"})),
            ]),
            ScriptedTurn::tool_call("echo", json!({"text": "three"})),
            ScriptedTurn::text("finished"),
        ]);
        let runner = runner(&llm, EngineConfig::default());

        let mut seen = Vec::new();
        let node = Node::new("n1", "Step");
        let outcome = runner
            .run("exec-1", &node, "go", &CancellationToken::new(), &mut |r| {
                seen.push(r.arguments["text"].as_str().unwrap_or_default().to_string())
            })
            .await
            .unwrap();

        assert_eq!(outcome.output, "finished");
        assert_eq!(outcome.turns, 3);
        let contents: Vec<&str> = outcome
            .tool_calls
            .iter()
            .map(|c| c.result.content.as_str())
            .collect();
        assert_eq!(contents, vec!["echo: one", "echo: two", "echo: three"]);
        assert_eq!(seen, vec!["one", "two", "three"]);

        // Second request carries the assistant turn and both results keyed by call id
        let second = &llm.requests()[1];
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].tool_uses().len(), 2);
        let results = second[3].tool_result_blocks();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, second[2].tool_uses()[0].0);
        assert_eq!(results[1].1, "echo: two");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let llm = ScriptedLlm::new(vec![
            ScriptedTurn::tool_call("does_not_exist", json!({})),
            ScriptedTurn::text("recovered"),
        ]);
        let runner = runner(&llm, EngineConfig::default());
        let outcome = run_step(&runner, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.output, "recovered");
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(outcome.tool_calls[0].result.is_error);
        assert!(outcome.tool_calls[0].result.content.contains("Tool not found"));

        let requests = llm.requests();
        let fed_back = requests[1][3].tool_result_blocks();
        assert!(fed_back[0].2);
    }

    #[tokio::test]
    async fn test_tool_execution_error_is_fed_back() {
        let llm = ScriptedLlm::new(vec![
            ScriptedTurn::tool_call("always_fails", json!({})),
            ScriptedTurn::text("ok anyway"),
        ]);
        let runner = runner(&llm, EngineConfig::default());
        let outcome = run_step(&runner, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.output, "ok anyway");
        assert!(outcome.tool_calls[0].result.content.contains("simulated failure"));
    }

    #[tokio::test]
    async fn test_missing_answer_uses_placeholder() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::Empty]);
        let config = EngineConfig {
            missing_answer_text: "(nothing)".into(),
            ..EngineConfig::default()
        };
        let outcome = run_step(&runner(&llm, config), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.output, "(nothing)");
    }

    #[tokio::test]
    async fn test_tool_loop_exceeded() {
        let llm = ScriptedLlm::new(vec![])
            .repeating(ScriptedTurn::tool_call("echo", json!({"text": "again"})));
        let config = EngineConfig {
            max_tool_iterations: 3,
            ..EngineConfig::default()
        };
        let err = run_step(&runner(&llm, config), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::ToolLoopExceeded(3)));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let llm = ScriptedLlm::new(vec![
            ScriptedTurn::tool_call("echo", json!({"text": "x"})),
            ScriptedTurn::fail("connection reset"),
        ]);
        let err = run_step(&runner(&llm, EngineConfig::default()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_model_failure());
    }

    #[tokio::test]
    async fn test_malformed_arguments_fail_step() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::raw_tool_call("echo", "{not json")]);
        let err = run_step(&runner(&llm, EngineConfig::default()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::LlmParse(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_model_call() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::text("never")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_step(&runner(&llm, EngineConfig::default()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Cancelled));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_between_tool_calls() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::tool_calls(vec![
            ("echo", json!({"text": "first"})),
            ("echo", json!({"text": "second"})),
        ])]);
        let runner = runner(&llm, EngineConfig::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let node = Node::new("n1", "Step");

        let err = runner
            .run("exec-1", &node, "go", &cancel, &mut |_| trigger.cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Cancelled));
    }
}
