use std::sync::OnceLock;

use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::traits::Tool;
use flowpilot_core::types::{ToolContext, ToolResult};

pub struct WebFetchTool {
    default_max_length: usize,
}

impl WebFetchTool {
    pub fn new(default_max_length: usize) -> Self {
        Self { default_max_length }
    }
}

#[derive(Deserialize)]
struct WebFetchInput {
    url: String,
    #[serde(default)]
    max_length: Option<usize>,
}

fn exec_error(message: String) -> FlowError {
    FlowError::ToolExecution {
        tool: "web_fetch".to_string(),
        message,
    }
}

impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn timeout_secs(&self) -> u64 {
        60
    }

    fn description(&self) -> &str {
        "Fetch content from a URL. Strips HTML tags and returns plain text, truncated to max_length."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http(s) URL to fetch"
                },
                "max_length": {
                    "type": "integer",
                    "description": "Maximum characters to return"
                }
            },
            "required": ["url"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: WebFetchInput = serde_json::from_value(input)
                .map_err(|e| FlowError::ToolValidation(e.to_string()))?;

            if !params.url.starts_with("http://") && !params.url.starts_with("https://") {
                return Ok(ToolResult::error(format!(
                    "Only http(s) URLs are supported: {}",
                    params.url
                )));
            }

            let max_length = params.max_length.unwrap_or(self.default_max_length);
            debug!(url = %params.url, max_length, "Fetching URL");

            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .user_agent(concat!("flowpilot/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| exec_error(format!("Failed to create HTTP client: {}", e)))?;

            let resp = client
                .get(&params.url)
                .send()
                .await
                .map_err(|e| exec_error(format!("Request failed: {}", e)))?;

            let status = resp.status();
            if !status.is_success() {
                return Ok(ToolResult::error(format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                )));
            }

            let is_html = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.contains("html"));

            let body = resp
                .text()
                .await
                .map_err(|e| exec_error(format!("Failed to read response body: {}", e)))?;

            let text = if is_html { strip_html_tags(&body) } else { body };
            Ok(ToolResult::success(truncate_chars(&text, max_length)))
        })
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n\n[truncated at {} chars]", &text[..cut], max_chars),
        None => text.to_string(),
    }
}

struct HtmlPatterns {
    script: Regex,
    style: Regex,
    tags: Regex,
    blank_lines: Regex,
}

fn html_patterns() -> &'static HtmlPatterns {
    static PATTERNS: OnceLock<HtmlPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| HtmlPatterns {
        script: Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("static regex"),
        style: Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("static regex"),
        tags: Regex::new(r"<[^>]+>").expect("static regex"),
        blank_lines: Regex::new(r"\n\s*\n(\s*\n)+").expect("static regex"),
    })
}

/// Reduce an HTML document to readable text.
fn strip_html_tags(html: &str) -> String {
    let p = html_patterns();
    let cleaned = p.script.replace_all(html, "");
    let cleaned = p.style.replace_all(&cleaned, "");
    let text = p.tags.replace_all(&cleaned, "");

    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    p.blank_lines.replace_all(&text, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html() {
        let html = r#"<html><head><style>p { color: red }</style><script>alert(1)</script></head>
<body><h1>Title</h1>


<p>Fish &amp; chips &lt;3</p></body></html>"#;
        let text = strip_html_tags(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Fish & chips <3"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color"));
        assert!(!text.contains("\n\n\n"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        let cut = truncate_chars("héllo", 2);
        assert!(cut.starts_with("hé\n\n[truncated at 2 chars]"));
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let tool = WebFetchTool::new(100);
        let result = tool
            .execute(serde_json::json!({"url": "file:///etc/passwd"}), ToolContext::default())
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_missing_url_is_validation_error() {
        let tool = WebFetchTool::new(100);
        let err = tool
            .execute(serde_json::json!({}), ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::ToolValidation(_)));
    }
}
