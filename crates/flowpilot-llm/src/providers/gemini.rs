use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use flowpilot_core::config::ModelConfig;
use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::traits::LlmClient;
use flowpilot_core::types::*;

use crate::streaming::{SseEvent, SseStream};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini native API client.
pub struct GeminiClient {
    http: Client,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiToolDecl>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFnCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFnResp,
    },
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiFnCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiFnResp {
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiToolDecl {
    function_declarations: Vec<GeminiFnDecl>,
}

#[derive(Serialize)]
struct GeminiFnDecl {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

// ── Conversion ───────────────────────────────────────────────────

fn convert_messages(messages: Vec<ChatMessage>) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    let mut system = None;
    let mut contents = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::System => {
                system = Some(GeminiContent {
                    role: None,
                    parts: vec![GeminiPart::Text { text: msg.text() }],
                });
                continue;
            }
            Role::User => "user",
            Role::Assistant => "model",
        };

        let parts: Vec<GeminiPart> = msg
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.is_empty() => Some(GeminiPart::Text { text }),
                ContentBlock::Text { .. } => None,
                ContentBlock::ToolUse { name, input, .. } => Some(GeminiPart::FunctionCall {
                    function_call: GeminiFnCall { name, args: input },
                }),
                // Gemini matches responses to calls by function name
                ContentBlock::ToolResult {
                    tool_name,
                    content,
                    is_error,
                    ..
                } => Some(GeminiPart::FunctionResponse {
                    function_response: GeminiFnResp {
                        name: tool_name,
                        response: if is_error {
                            serde_json::json!({ "error": content })
                        } else {
                            serde_json::json!({ "result": content })
                        },
                    },
                }),
            })
            .collect();

        if !parts.is_empty() {
            contents.push(GeminiContent {
                role: Some(role.to_string()),
                parts,
            });
        }
    }

    (system, contents)
}

/// Turns Gemini chunks into deltas. Gemini has no call ids, and every chunk
/// restarts part numbering, so calls are numbered across the whole response.
#[derive(Default)]
struct ChunkDecoder {
    calls: usize,
}

impl ChunkDecoder {
    fn decode(&mut self, event: SseEvent) -> Vec<Result<StreamDelta>> {
        let chunk: GeminiStreamChunk = match serde_json::from_str(&event.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(data = %event.data, error = %e, "Failed to parse Gemini SSE chunk");
                return vec![];
            }
        };

        let mut deltas = Vec::new();

        if let Some(candidate) = chunk.candidates.into_iter().next() {
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                match part {
                    GeminiPart::Text { text } if !text.is_empty() => {
                        deltas.push(Ok(StreamDelta::TextDelta(text)));
                    }
                    GeminiPart::FunctionCall { function_call } => {
                        let index = self.calls;
                        self.calls += 1;
                        deltas.push(Ok(StreamDelta::ToolUseStart {
                            index,
                            id: format!("call_{}", index),
                            name: function_call.name,
                        }));
                        deltas.push(Ok(StreamDelta::ToolInputDelta {
                            index,
                            delta: function_call.args.to_string(),
                        }));
                    }
                    _ => {}
                }
            }

            if let Some(reason) = candidate.finish_reason {
                let stop = match reason.as_str() {
                    "MAX_TOKENS" => StopReason::MaxTokens,
                    _ if self.calls > 0 => StopReason::ToolUse,
                    _ => StopReason::EndTurn,
                };
                deltas.push(Ok(StreamDelta::Stop(stop)));
            }
        }

        if let Some(usage) = chunk.usage_metadata {
            deltas.push(Ok(StreamDelta::Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            }));
        }

        deltas
    }
}

impl LlmClient for GeminiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let tools = tools.to_vec();

        Box::pin(async move {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| FlowError::Config("Gemini: api_key is required".into()))?;

            let base = config.base_url.as_deref().unwrap_or(GEMINI_API_BASE);
            let url = format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                base.trim_end_matches('/'),
                config.model_id
            );

            let (system_instruction, contents) = convert_messages(messages);

            let gemini_tools = if tools.is_empty() {
                vec![]
            } else {
                vec![GeminiToolDecl {
                    function_declarations: tools
                        .into_iter()
                        .map(|t| GeminiFnDecl {
                            name: t.name,
                            description: t.description,
                            parameters: t.input_schema,
                        })
                        .collect(),
                }]
            };

            let body = GeminiRequest {
                contents,
                system_instruction,
                tools: gemini_tools,
                generation_config: GenerationConfig {
                    max_output_tokens: config.max_tokens,
                    temperature: (config.temperature > 0.0).then_some(config.temperature),
                },
            };

            let response = self
                .http
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| FlowError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(FlowError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let mut decoder = ChunkDecoder::default();
            let delta_stream = SseStream::new(response.bytes_stream())
                .map(move |event| match event {
                    Ok(event) => stream::iter(decoder.decode(event)),
                    Err(e) => stream::iter(vec![Err(e)]),
                })
                .flatten();

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}
