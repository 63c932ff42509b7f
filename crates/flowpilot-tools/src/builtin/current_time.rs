use chrono::{FixedOffset, Utc};
use futures::future::BoxFuture;
use serde::Deserialize;

use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::traits::Tool;
use flowpilot_core::types::{ToolContext, ToolResult};

pub struct CurrentTimeTool;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TimeFormat {
    #[default]
    Rfc3339,
    Date,
    Unix,
}

#[derive(Deserialize)]
struct CurrentTimeInput {
    #[serde(default)]
    format: TimeFormat,
    #[serde(default)]
    utc_offset_hours: Option<f64>,
}

impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time, optionally shifted to a UTC offset."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "enum": ["rfc3339", "date", "unix"],
                    "description": "Output format (default rfc3339)"
                },
                "utc_offset_hours": {
                    "type": "number",
                    "description": "Offset from UTC in hours, e.g. -5 or 5.5"
                }
            }
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: CurrentTimeInput = if input.is_null() {
                CurrentTimeInput {
                    format: TimeFormat::default(),
                    utc_offset_hours: None,
                }
            } else {
                serde_json::from_value(input)
                    .map_err(|e| FlowError::ToolValidation(e.to_string()))?
            };

            let offset_secs = (params.utc_offset_hours.unwrap_or(0.0) * 3600.0).round();
            let offset = FixedOffset::east_opt(offset_secs as i32)
                .filter(|_| offset_secs.abs() < 86_400.0)
                .ok_or_else(|| {
                    FlowError::ToolValidation(format!(
                        "utc_offset_hours out of range: {}",
                        params.utc_offset_hours.unwrap_or_default()
                    ))
                })?;

            let now = Utc::now().with_timezone(&offset);
            let text = match params.format {
                TimeFormat::Rfc3339 => now.to_rfc3339(),
                TimeFormat::Date => now.format("%Y-%m-%d").to_string(),
                TimeFormat::Unix => now.timestamp().to_string(),
            };
            Ok(ToolResult::success(text))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_default_format_is_rfc3339() {
        let r = CurrentTimeTool
            .execute(json!({}), ToolContext::default())
            .await
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&r.content).is_ok());
    }

    #[tokio::test]
    async fn test_offset_applied() {
        let r = CurrentTimeTool
            .execute(json!({"utc_offset_hours": 5.5}), ToolContext::default())
            .await
            .unwrap();
        assert!(r.content.ends_with("+05:30"));
    }

    #[tokio::test]
    async fn test_unix_and_date() {
        let r = CurrentTimeTool
            .execute(json!({"format": "unix"}), ToolContext::default())
            .await
            .unwrap();
        assert!(r.content.parse::<i64>().unwrap() > 1_600_000_000);

        let r = CurrentTimeTool
            .execute(json!({"format": "date"}), ToolContext::default())
            .await
            .unwrap();
        assert_eq!(r.content.len(), 10);
    }

    #[tokio::test]
    async fn test_offset_out_of_range() {
        let err = CurrentTimeTool
            .execute(json!({"utc_offset_hours": 30}), ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::ToolValidation(_)));
    }
}
