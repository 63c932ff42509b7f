use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::{info, warn};

use flowpilot_core::config::{ModelConfig, RetryConfig};
use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::traits::LlmClient;
use flowpilot_core::types::*;

/// An LLM client that retries failed requests and falls back to alternative providers.
///
/// Only the request phase is retried; once a stream has been handed out, a
/// mid-stream failure belongs to the caller.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &FlowError) -> bool {
    match e {
        FlowError::LlmRequest(msg) => {
            let msg = msg.to_lowercase();
            ["429", "500", "502", "503", "504", "timeout", "timed out", "connection"]
                .iter()
                .any(|needle| msg.contains(needle))
        }
        FlowError::LlmStream(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // 0.8x to 1.2x jitter
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let tools = tools.to_vec();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self
                    .primary
                    .chat_stream(&config, messages.clone(), &tools)
                    .await
                {
                    Ok(stream) => return Ok(stream),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying LLM request"
                        );
                        tokio::time::sleep(backoff).await;
                        last_err = Some(e);
                    }
                    Err(e) => {
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!("Primary LLM exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                match fb_client
                    .chat_stream(fb_config, messages.clone(), &tools)
                    .await
                {
                    Ok(stream) => {
                        info!(
                            model = %fb_config.model_id,
                            provider = %fb_config.provider,
                            "Fell back to alternative model"
                        );
                        return Ok(stream);
                    }
                    Err(e) => {
                        warn!(model = %fb_config.model_id, error = %e, "Fallback model also failed");
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| FlowError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_test_utils::{test_model_config, ScriptedLlm, ScriptedTurn};

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&FlowError::LlmRequest("HTTP 503 Service Unavailable".into())));
        assert!(is_retryable(&FlowError::LlmRequest("operation timed out".into())));
        assert!(is_retryable(&FlowError::LlmStream("reset".into())));
        assert!(!is_retryable(&FlowError::LlmRequest("HTTP 401: bad key".into())));
        assert!(!is_retryable(&FlowError::LlmParse("bad args".into())));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };
        let d = calculate_backoff(8, &config);
        assert!(d <= Duration::from_millis(6000));
        assert!(d >= Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let llm = ScriptedLlm::new(vec![
            ScriptedTurn::fail("HTTP 503 overloaded"),
            ScriptedTurn::text("ok"),
        ]);
        let client = RetryingClient::new(Box::new(llm.clone()), vec![], fast_retry(2));
        let result = client
            .chat_stream(&test_model_config(), vec![ChatMessage::user("hi")], &[])
            .await;
        assert!(result.is_ok());
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_goes_to_fallback() {
        let primary = ScriptedLlm::new(vec![ScriptedTurn::fail("HTTP 401 unauthorized")]);
        let fallback = ScriptedLlm::new(vec![ScriptedTurn::text("from fallback")]);
        let client = RetryingClient::new(
            Box::new(primary.clone()),
            vec![(test_model_config(), Box::new(fallback.clone()))],
            fast_retry(3),
        );
        let result = client
            .chat_stream(&test_model_config(), vec![ChatMessage::user("hi")], &[])
            .await;
        assert!(result.is_ok());
        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let llm = ScriptedLlm::new(vec![
            ScriptedTurn::fail("HTTP 500 a"),
            ScriptedTurn::fail("HTTP 500 b"),
        ]);
        let client = RetryingClient::new(Box::new(llm.clone()), vec![], fast_retry(1));
        let err = client
            .chat_stream(&test_model_config(), vec![], &[])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::LlmRequest(ref m) if m.contains("HTTP 500 b")));
        assert_eq!(llm.call_count(), 2);
    }
}
