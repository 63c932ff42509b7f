use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, FlowError};

/// Top-level Flowpilot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Bounded retry for transport failures. Absent means a failed model
    /// call fails the step immediately.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "gemini".to_string() }
fn default_max_tokens() -> u32 { 8192 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Workflow engine limits and prompt settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model round-trips allowed within one step before it fails.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
    /// How often a single node may be entered during one run.
    #[serde(default = "default_max_node_visits")]
    pub max_node_visits: usize,
    /// Replaces the built-in system instruction for every step.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Output recorded when the model answers with neither text nor tool calls.
    #[serde(default = "default_missing_answer_text")]
    pub missing_answer_text: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            max_node_visits: default_max_node_visits(),
            system_prompt: None,
            missing_answer_text: default_missing_answer_text(),
        }
    }
}

impl EngineConfig {
    /// Both limits must allow at least one model turn and one node visit.
    pub fn validate(&self) -> Result<()> {
        if self.max_tool_iterations == 0 {
            return Err(FlowError::Config(
                "engine.max_tool_iterations must be at least 1".to_string(),
            ));
        }
        if self.max_node_visits == 0 {
            return Err(FlowError::Config(
                "engine.max_node_visits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_tool_iterations() -> usize { 10 }
fn default_max_node_visits() -> usize { 5 }
fn default_missing_answer_text() -> String {
    "No response was generated for this step.".to_string()
}

/// Builtin tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Tavily API key; `web_search` is only registered when set.
    #[serde(default)]
    pub web_search_api_key: Option<String>,
    #[serde(default = "default_fetch_max_length")]
    pub fetch_max_length: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            web_search_api_key: None,
            fetch_max_length: default_fetch_max_length(),
        }
    }
}

fn default_fetch_max_length() -> usize { 30_000 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FlowError::ConfigNotFound(path.display().to_string()))?;

        Self::from_toml(&content)
    }

    /// Parse config from TOML text, expanding `${ENV_VAR}` references first.
    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| FlowError::Config(e.to_string()))?;
        config.engine.validate()?;
        Ok(config)
    }

    /// A copy safe to print: API keys are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.model.api_key = copy.model.api_key.as_deref().map(mask);
        for fb in &mut copy.fallback_models {
            fb.api_key = fb.api_key.as_deref().map(mask);
        }
        copy.tools.web_search_api_key = copy.tools.web_search_api_key.as_deref().map(mask);
        copy
    }
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep the reference if the variable is unset
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_FLOWPILOT_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_FLOWPILOT_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_FLOWPILOT_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_FLOWPILOT_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_FLOWPILOT_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let toml_str = r#"
[model]
model_id = "gemini-2.0-flash"
"#;
        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.model.provider, "gemini");
        assert!(config.model.retry.is_none());
        assert!(config.fallback_models.is_empty());
        assert_eq!(config.engine.max_tool_iterations, 10);
        assert_eq!(config.engine.max_node_visits, 5);
        assert!(config.engine.system_prompt.is_none());
        assert_eq!(
            config.engine.missing_answer_text,
            "No response was generated for this step."
        );
        assert!(config.tools.web_search_api_key.is_none());
        assert_eq!(config.tools.fetch_max_length, 30_000);
    }

    #[test]
    fn test_retry_section_fills_defaults() {
        let toml_str = r#"
[model]
provider = "anthropic"
model_id = "claude-sonnet-4-20250514"

[model.retry]
max_retries = 5
"#;
        let config = AppConfig::from_toml(toml_str).unwrap();
        let retry = config.model.retry.unwrap();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_backoff_ms, 1000);
        assert_eq!(retry.max_backoff_ms, 30000);
    }

    #[test]
    fn test_missing_model_is_config_error() {
        let err = AppConfig::from_toml("[engine]\nmax_tool_iterations = 3\n").unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn test_zero_engine_limits_rejected() {
        let err = AppConfig::from_toml(
            "[model]\nmodel_id = \"m\"\n[engine]\nmax_tool_iterations = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::Config(ref m) if m.contains("max_tool_iterations")));

        let err = AppConfig::from_toml("[model]\nmodel_id = \"m\"\n[engine]\nmax_node_visits = 0\n")
            .unwrap_err();
        assert!(matches!(err, FlowError::Config(ref m) if m.contains("max_node_visits")));

        let config =
            AppConfig::from_toml("[model]\nmodel_id = \"m\"\n[engine]\nmax_tool_iterations = 1\n")
                .unwrap();
        assert_eq!(config.engine.max_tool_iterations, 1);
    }

    #[test]
    fn test_redacted_masks_keys() {
        let toml_str = r#"
[model]
model_id = "gpt-4o"
api_key = "sk-abcdef123456"

[tools]
web_search_api_key = "tvly-secret"
"#;
        let config = AppConfig::from_toml(toml_str).unwrap().redacted();
        assert_eq!(config.model.api_key.as_deref(), Some("sk-a****"));
        assert_eq!(config.tools.web_search_api_key.as_deref(), Some("tvly****"));
    }
}
