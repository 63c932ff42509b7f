use serde::{Deserialize, Serialize};

/// One stage of a workflow.
///
/// Nodes are read-only while a run is in progress; the engine never
/// rewrites node content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier within the workflow.
    pub id: String,
    /// Human-readable name, copied into each step record.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// What the model should do at this stage.
    #[serde(default, rename = "instructionContent", alias = "instruction")]
    pub instruction: String,
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: String::new(),
            instruction: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }
}
