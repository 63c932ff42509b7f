use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::traits::Tool;
use flowpilot_core::types::{ToolContext, ToolResult};

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// Web search backed by the Tavily API.
pub struct WebSearchTool {
    api_key: String,
    http: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct WebSearchInput {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: u32,
}

fn default_max_results() -> u32 {
    5
}

fn exec_error(message: impl Into<String>) -> FlowError {
    FlowError::ToolExecution {
        tool: "web_search".into(),
        message: message.into(),
    }
}

impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns relevant results with snippets."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results (default 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: WebSearchInput = serde_json::from_value(input)
                .map_err(|e| FlowError::ToolValidation(e.to_string()))?;
            if params.query.trim().is_empty() {
                return Err(FlowError::ToolValidation("'query' must not be empty".into()));
            }

            debug!(query = %params.query, max_results = params.max_results, "Web search");

            let resp = self
                .http
                .post(TAVILY_URL)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": params.query,
                    "max_results": params.max_results,
                }))
                .send()
                .await
                .map_err(|e| exec_error(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(exec_error(format!("search API returned {}: {}", status, text)));
            }

            let body: serde_json::Value =
                resp.json().await.map_err(|e| exec_error(e.to_string()))?;

            Ok(ToolResult::success(format_results(&body)))
        })
    }
}

fn format_results(body: &serde_json::Value) -> String {
    let Some(results) = body["results"].as_array().filter(|r| !r.is_empty()) else {
        return "No results found.".into();
    };

    results
        .iter()
        .map(|r| {
            format!(
                "**{}**\n{}\nURL: {}",
                r["title"].as_str().unwrap_or(""),
                r["content"].as_str().unwrap_or(""),
                r["url"].as_str().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
