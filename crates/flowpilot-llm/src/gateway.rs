//! Model gateway: one request/response exchange with the language model.
//!
//! Providers stream deltas; the gateway drains a stream into a single
//! [`Completion`] and makes the "final answer" vs "more tool calls" decision
//! explicit for the step loop.

use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;

use flowpilot_core::config::ModelConfig;
use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::traits::LlmClient;
use flowpilot_core::types::*;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// What the model asked for on this turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// No tool calls; the text is the answer (possibly empty).
    FinalAnswer(String),
    /// At least one tool call, in the order the model emitted them.
    ToolRequests(Vec<ToolRequest>),
}

/// A drained model turn.
#[derive(Debug, Clone)]
pub struct Completion {
    pub reply: ModelReply,
    /// The assistant turn to append to the conversation before any tool results.
    pub message: ChatMessage,
    pub stop_reason: Option<StopReason>,
    /// Largest count reported during the turn; providers report running totals.
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Accumulator for streaming tool call deltas.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    input_json: String,
}

/// Sends conversations to one configured model.
///
/// The client is injected so each orchestrator can carry its own credentials.
pub struct ModelGateway {
    client: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl ModelGateway {
    pub fn new(client: impl Into<Arc<dyn LlmClient>>, config: ModelConfig) -> Self {
        Self {
            client: client.into(),
            config,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Send the conversation and the tool catalog, and collect the model's reply.
    ///
    /// Transport and stream failures are returned as-is; nothing is retried here.
    /// Tool arguments that are not a JSON object fail with `LlmParse`.
    pub async fn complete(
        &self,
        conversation: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Completion> {
        let mut stream = self
            .client
            .chat_stream(&self.config, conversation.to_vec(), tools)
            .await?;

        let mut text = String::new();
        let mut calls: Vec<ToolCallAccumulator> = Vec::new();
        let mut stop_reason = None;
        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;

        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::TextDelta(chunk) => text.push_str(&chunk),
                StreamDelta::ToolUseStart { index, id, name } => {
                    if calls.len() <= index {
                        calls.resize_with(index + 1, ToolCallAccumulator::default);
                    }
                    calls[index].id = id;
                    calls[index].name = name;
                }
                StreamDelta::ToolInputDelta { index, delta } => {
                    if let Some(call) = calls.get_mut(index) {
                        call.input_json.push_str(&delta);
                    }
                }
                StreamDelta::Stop(reason) => stop_reason = Some(reason),
                StreamDelta::Usage {
                    input_tokens: input,
                    output_tokens: output,
                } => {
                    input_tokens = input_tokens.max(input);
                    output_tokens = output_tokens.max(output);
                }
            }
        }

        // Providers number blocks including text, which can leave gaps
        calls.retain(|c| !c.name.is_empty());

        let requests = calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| {
                let arguments = parse_arguments(&call.name, &call.input_json)?;
                let call_id = if call.id.is_empty() {
                    format!("call_{}", i)
                } else {
                    call.id
                };
                Ok(ToolRequest {
                    call_id,
                    name: call.name,
                    arguments,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            tool_requests = requests.len(),
            text_len = text.len(),
            input_tokens,
            output_tokens,
            "Model turn complete"
        );

        let mut content = Vec::new();
        if !text.is_empty() {
            content.push(ContentBlock::Text { text: text.clone() });
        }
        for req in &requests {
            content.push(ContentBlock::ToolUse {
                id: req.call_id.clone(),
                name: req.name.clone(),
                input: req.arguments.clone(),
            });
        }
        let message = ChatMessage {
            role: Role::Assistant,
            content,
            timestamp: Some(chrono::Utc::now()),
        };

        let reply = if requests.is_empty() {
            ModelReply::FinalAnswer(text)
        } else {
            ModelReply::ToolRequests(requests)
        };

        Ok(Completion {
            reply,
            message,
            stop_reason,
            input_tokens,
            output_tokens,
        })
    }
}

fn parse_arguments(tool: &str, raw: &str) -> Result<serde_json::Value> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
        FlowError::LlmParse(format!("arguments for tool '{}' are not valid JSON: {}", tool, e))
    })?;
    if !value.is_object() {
        return Err(FlowError::LlmParse(format!(
            "arguments for tool '{}' must be a JSON object, got {}",
            tool, value
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_test_utils::{test_model_config, ScriptedLlm, ScriptedTurn};
    use serde_json::json;

    fn gateway(llm: &ScriptedLlm) -> ModelGateway {
        let client: Arc<dyn LlmClient> = Arc::new(llm.clone());
        ModelGateway::new(client, test_model_config())
    }

    #[tokio::test]
    async fn test_final_answer() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::text("All done.")]);
        let completion = gateway(&llm)
            .complete(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap();
        assert_eq!(completion.reply, ModelReply::FinalAnswer("All done.".into()));
        assert_eq!(completion.message.text(), "All done.");
        assert_eq!(completion.stop_reason, Some(StopReason::EndTurn));
    }

    #[tokio::test]
    async fn test_tool_requests_in_order() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::tool_calls(vec![
            ("calculator", json!({"operation": "add", "a": 1, "b": 2})),
            ("echo", json!({"text": "x"})),
        ])]);
        let completion = gateway(&llm).complete(&[], &[]).await.unwrap();
        match completion.reply {
            ModelReply::ToolRequests(reqs) => {
                let names: Vec<_> = reqs.iter().map(|r| r.name.as_str()).collect();
                assert_eq!(names, vec!["calculator", "echo"]);
                assert_ne!(reqs[0].call_id, reqs[1].call_id);
                assert_eq!(reqs[1].arguments, json!({"text": "x"}));
            }
            other => panic!("expected tool requests, got {:?}", other),
        }
        assert_eq!(completion.message.tool_uses().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_parse_error() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::raw_tool_call("echo", "{\"text\": ")]);
        let err = gateway(&llm).complete(&[], &[]).await.unwrap_err();
        assert!(matches!(err, FlowError::LlmParse(_)));
    }

    #[tokio::test]
    async fn test_non_object_arguments_are_parse_error() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::raw_tool_call("echo", "[1, 2]")]);
        let err = gateway(&llm).complete(&[], &[]).await.unwrap_err();
        assert!(matches!(err, FlowError::LlmParse(ref m) if m.contains("JSON object")));
    }

    #[tokio::test]
    async fn test_empty_arguments_default_to_object() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::raw_tool_call("current_time", "")]);
        let completion = gateway(&llm).complete(&[], &[]).await.unwrap();
        match completion.reply {
            ModelReply::ToolRequests(reqs) => assert_eq!(reqs[0].arguments, json!({})),
            other => panic!("expected tool requests, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::fail("HTTP 503"), ScriptedTurn::text("late")]);
        let err = gateway(&llm).complete(&[], &[]).await.unwrap_err();
        assert!(matches!(err, FlowError::LlmRequest(_)));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_turn_is_empty_final_answer() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::Empty]);
        let completion = gateway(&llm).complete(&[], &[]).await.unwrap();
        assert_eq!(completion.reply, ModelReply::FinalAnswer(String::new()));
        assert!(completion.message.content.is_empty());
    }

    #[tokio::test]
    async fn test_usage_reported_once() {
        let llm = ScriptedLlm::new(vec![ScriptedTurn::text("x")]).with_usage(10, 4);
        let completion = gateway(&llm).complete(&[], &[]).await.unwrap();
        assert_eq!(completion.input_tokens, 10);
        assert_eq!(completion.output_tokens, 4);
    }

    /// Replays fixed deltas, for provider-shaped usage reporting.
    struct FixedDeltas(Vec<StreamDelta>);

    impl LlmClient for FixedDeltas {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
            _tools: &[ToolDefinition],
        ) -> futures::future::BoxFuture<'_, Result<futures::stream::BoxStream<'_, Result<StreamDelta>>>>
        {
            let deltas: Vec<Result<StreamDelta>> = self.0.iter().cloned().map(Ok).collect();
            Box::pin(async move {
                Ok(Box::pin(futures::stream::iter(deltas))
                    as futures::stream::BoxStream<'_, Result<StreamDelta>>)
            })
        }
    }

    #[tokio::test]
    async fn test_repeated_running_totals_are_not_summed() {
        let client: Arc<dyn LlmClient> = Arc::new(FixedDeltas(vec![
            StreamDelta::Usage { input_tokens: 100, output_tokens: 1 },
            StreamDelta::TextDelta("partial ".into()),
            StreamDelta::Usage { input_tokens: 100, output_tokens: 7 },
            StreamDelta::TextDelta("answer".into()),
            StreamDelta::Stop(StopReason::EndTurn),
            StreamDelta::Usage { input_tokens: 0, output_tokens: 12 },
        ]));
        let gateway = ModelGateway::new(client, test_model_config());
        let completion = gateway.complete(&[ChatMessage::user("hi")], &[]).await.unwrap();

        assert_eq!(completion.reply, ModelReply::FinalAnswer("partial answer".into()));
        assert_eq!(completion.input_tokens, 100);
        assert_eq!(completion.output_tokens, 12);
    }
}
