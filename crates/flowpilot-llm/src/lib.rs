pub mod gateway;
pub mod providers;
pub mod retry;
pub mod streaming;

use tracing::info;

use flowpilot_core::config::{AppConfig, ModelConfig};
use flowpilot_core::traits::LlmClient;

pub use gateway::{Completion, ModelGateway, ModelReply, ToolRequest};
pub use providers::{AnthropicClient, GeminiClient, OpenAiClient};
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    match config.provider.as_str() {
        "anthropic" | "claude" => Box::new(AnthropicClient::new()),
        "gemini" | "google" => Box::new(GeminiClient::new()),
        // Everything else uses the OpenAI-compatible client
        _ => Box::new(OpenAiClient::new()),
    }
}

/// Build the gateway for an application config, wrapping the primary client
/// in a [`RetryingClient`] only when `[model.retry]` is configured.
pub fn gateway_from_config(config: &AppConfig) -> ModelGateway {
    let primary = create_client(&config.model);

    let client: Box<dyn LlmClient> = match &config.model.retry {
        Some(retry) => {
            let fallbacks = config
                .fallback_models
                .iter()
                .map(|fb| (fb.clone(), create_client(fb)))
                .collect();
            info!(
                max_retries = retry.max_retries,
                fallbacks = config.fallback_models.len(),
                "LLM retry enabled"
            );
            Box::new(RetryingClient::new(primary, fallbacks, retry.clone()))
        }
        None => primary,
    };

    ModelGateway::new(client, config.model.clone())
}
