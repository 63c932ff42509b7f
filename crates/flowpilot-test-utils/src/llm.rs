use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};

use flowpilot_core::config::ModelConfig;
use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::traits::LlmClient;
use flowpilot_core::types::{ChatMessage, StopReason, StreamDelta, ToolDefinition};

/// One scripted model response.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Plain text answer, no tool calls.
    Text(String),
    /// One or more tool calls with well-formed arguments.
    ToolCalls(Vec<(String, serde_json::Value)>),
    /// A single tool call whose argument string is sent verbatim.
    RawToolCall { name: String, arguments: String },
    /// Neither text nor tool calls.
    Empty,
    /// The request itself fails with `LlmRequest`.
    Fail(String),
}

impl ScriptedTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::ToolCalls(vec![(name.into(), arguments)])
    }

    pub fn tool_calls(calls: Vec<(&str, serde_json::Value)>) -> Self {
        Self::ToolCalls(
            calls
                .into_iter()
                .map(|(name, args)| (name.to_string(), args))
                .collect(),
        )
    }

    pub fn raw_tool_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::RawToolCall {
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

#[derive(Default)]
struct Inner {
    turns: VecDeque<ScriptedTurn>,
    repeat: Option<ScriptedTurn>,
    usage: Option<(u64, u64)>,
    requests: Vec<Vec<ChatMessage>>,
    tool_catalogs: Vec<Vec<String>>,
    next_call_id: usize,
}

/// An `LlmClient` that replays scripted turns and records every request.
///
/// Clones share the same script and history.
#[derive(Clone, Default)]
pub struct ScriptedLlm {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedLlm {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        let llm = Self::default();
        llm.lock().turns = turns.into();
        llm
    }

    /// Turn replayed forever once the script runs out.
    pub fn repeating(self, turn: ScriptedTurn) -> Self {
        self.lock().repeat = Some(turn);
        self
    }

    /// Usage reported at the end of every turn.
    pub fn with_usage(self, input_tokens: u64, output_tokens: u64) -> Self {
        self.lock().usage = Some((input_tokens, output_tokens));
        self
    }

    pub fn push(&self, turn: ScriptedTurn) {
        self.lock().turns.push_back(turn);
    }

    /// Number of `chat_stream` calls received.
    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Conversations received, one per call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.lock().requests.clone()
    }

    /// Tool names offered on each call.
    pub fn tool_catalogs(&self) -> Vec<Vec<String>> {
        self.lock().tool_catalogs.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl LlmClient for ScriptedLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let mut inner = self.lock();
        inner.requests.push(messages);
        inner
            .tool_catalogs
            .push(tools.iter().map(|t| t.name.clone()).collect());

        let turn = inner.turns.pop_front().or_else(|| inner.repeat.clone());
        let mut deltas: Vec<Result<StreamDelta>> = Vec::new();

        let outcome = match turn {
            None => Err(FlowError::LlmRequest("scripted LLM has no turns left".into())),
            Some(ScriptedTurn::Fail(message)) => Err(FlowError::LlmRequest(message)),
            Some(ScriptedTurn::Text(text)) => {
                deltas.push(Ok(StreamDelta::TextDelta(text)));
                deltas.push(Ok(StreamDelta::Stop(StopReason::EndTurn)));
                Ok(())
            }
            Some(ScriptedTurn::Empty) => {
                deltas.push(Ok(StreamDelta::Stop(StopReason::EndTurn)));
                Ok(())
            }
            Some(ScriptedTurn::ToolCalls(calls)) => {
                for (index, (name, args)) in calls.into_iter().enumerate() {
                    let id = format!("call_{}", inner.next_call_id);
                    inner.next_call_id += 1;
                    deltas.push(Ok(StreamDelta::ToolUseStart { index, id, name }));
                    deltas.push(Ok(StreamDelta::ToolInputDelta {
                        index,
                        delta: args.to_string(),
                    }));
                }
                deltas.push(Ok(StreamDelta::Stop(StopReason::ToolUse)));
                Ok(())
            }
            Some(ScriptedTurn::RawToolCall { name, arguments }) => {
                let id = format!("call_{}", inner.next_call_id);
                inner.next_call_id += 1;
                deltas.push(Ok(StreamDelta::ToolUseStart { index: 0, id, name }));
                deltas.push(Ok(StreamDelta::ToolInputDelta {
                    index: 0,
                    delta: arguments,
                }));
                deltas.push(Ok(StreamDelta::Stop(StopReason::ToolUse)));
                Ok(())
            }
        };

        if let Some((input_tokens, output_tokens)) = inner.usage {
            deltas.push(Ok(StreamDelta::Usage {
                input_tokens,
                output_tokens,
            }));
        }
        drop(inner);

        Box::pin(async move {
            outcome?;
            Ok(Box::pin(stream::iter(deltas)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}
