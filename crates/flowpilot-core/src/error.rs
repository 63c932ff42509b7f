use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    // Model gateway errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Step / run errors
    #[error("Step exceeded max tool iterations ({0})")]
    ToolLoopExceeded(usize),

    #[error("Workflow has no entry node (every node has an incoming edge)")]
    NoEntryNode,

    #[error("Node not found in workflow: {0}")]
    NodeNotFound(String),

    #[error("Node {node_id} visited more than {limit} times")]
    VisitLimitExceeded { node_id: String, limit: usize },

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    /// True for failures talking to the model provider.
    pub fn is_model_failure(&self) -> bool {
        matches!(
            self,
            Self::LlmRequest(_) | Self::LlmStream(_) | Self::LlmParse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_failure_family() {
        assert!(FlowError::LlmRequest("HTTP 500".into()).is_model_failure());
        assert!(FlowError::LlmParse("bad json".into()).is_model_failure());
        assert!(!FlowError::ToolNotFound("x".into()).is_model_failure());
        assert!(!FlowError::NoEntryNode.is_model_failure());
    }

    #[test]
    fn test_display_messages() {
        let e = FlowError::ToolExecution {
            tool: "web_fetch".into(),
            message: "connection refused".into(),
        };
        assert_eq!(e.to_string(), "Tool execution failed: web_fetch: connection refused");
        assert_eq!(
            FlowError::ToolLoopExceeded(10).to_string(),
            "Step exceeded max tool iterations (10)"
        );
    }
}
