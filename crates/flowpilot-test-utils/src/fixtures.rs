use flowpilot_core::config::{AppConfig, EngineConfig, ModelConfig, ToolsConfig};

/// A model config that never leaves the process when paired with `ScriptedLlm`.
pub fn test_model_config() -> ModelConfig {
    ModelConfig {
        provider: "scripted".to_string(),
        model_id: "scripted-model".to_string(),
        api_key: None,
        base_url: None,
        max_tokens: 1024,
        temperature: 0.0,
        retry: None,
    }
}

pub fn test_app_config() -> AppConfig {
    AppConfig {
        model: test_model_config(),
        fallback_models: vec![],
        engine: EngineConfig::default(),
        tools: ToolsConfig::default(),
    }
}
