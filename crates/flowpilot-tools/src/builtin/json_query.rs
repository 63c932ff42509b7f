use futures::future::BoxFuture;
use serde::Deserialize;

use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::traits::Tool;
use flowpilot_core::types::{ToolContext, ToolResult};

/// Extract a value from a JSON document with a dotted path such as
/// `data.items[0].name`.
pub struct JsonQueryTool;

#[derive(Deserialize)]
struct JsonQueryInput {
    /// The document, either as a JSON string or an inline value.
    json: serde_json::Value,
    path: String,
}

impl Tool for JsonQueryTool {
    fn name(&self) -> &str {
        "json_query"
    }

    fn description(&self) -> &str {
        "Query a JSON document with a dot path (e.g. 'data.items[0].name')."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "json": { "type": "string", "description": "JSON document to query" },
                "path": { "type": "string", "description": "Dot path, e.g. 'data.items[0].name'" }
            },
            "required": ["json", "path"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: JsonQueryInput = serde_json::from_value(input)
                .map_err(|e| FlowError::ToolValidation(e.to_string()))?;

            let document = match params.json {
                serde_json::Value::String(raw) => match serde_json::from_str(&raw) {
                    Ok(v) => v,
                    Err(e) => return Ok(ToolResult::error(format!("Invalid JSON: {}", e))),
                },
                other => other,
            };

            match json_path_query(&document, &params.path) {
                Some(value) => Ok(ToolResult::success(
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
                )),
                None => Ok(ToolResult::error(format!(
                    "Path '{}' not found in document",
                    params.path
                ))),
            }
        })
    }
}

/// Walk `path` through `value`. Each segment is an object key optionally
/// followed by one or more `[n]` indexes.
fn json_path_query<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let (key, mut rest) = match segment.find('[') {
            Some(pos) => (&segment[..pos], &segment[pos..]),
            None => (segment, ""),
        };
        if !key.is_empty() {
            current = current.get(key)?;
        }
        while let Some(stripped) = rest.strip_prefix('[') {
            let end = stripped.find(']')?;
            let idx: usize = stripped[..end].trim().parse().ok()?;
            current = current.get(idx)?;
            rest = &stripped[end + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    Some(current)
}
