//! Execution state for one run.
//!
//! Mutators only ever touch the step that is currently running, and all of
//! them are no-ops once the run has reached `completed` or `error`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use flowpilot_core::types::ToolResult;

use crate::graph::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Initializing,
    Running,
    Completed,
    Error,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Error,
}

/// One tool invocation made during a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: serde_json::Value,
    pub result: ToolResult,
}

/// Runtime record of one node's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub node_id: String,
    pub node_label: String,
    pub status: StepStatus,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate state of one run.
///
/// At most one step is `running` at a time. Between a step completing and
/// the next one starting, the run stays `running` with no step in flight,
/// and `current_node_id` keeps naming the node that just finished until
/// [`begin_step`](Self::begin_step) moves it on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub current_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            status: ExecutionStatus::Initializing,
            steps: Vec::new(),
            current_node_id: None,
            final_output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The step that is in flight, if any.
    pub fn running_step(&self) -> Option<&Step> {
        self.steps.last().filter(|s| s.status == StepStatus::Running)
    }

    fn running_step_mut(&mut self) -> Option<&mut Step> {
        self.steps
            .last_mut()
            .filter(|s| s.status == StepStatus::Running)
    }

    /// Append a running step for `node` and move the run to `running`.
    ///
    /// Returns the new step's index, or `None` if the run is terminal or a
    /// step is already in flight.
    pub fn begin_step(&mut self, node: &Node, input: &str) -> Option<usize> {
        if self.is_terminal() || self.running_step().is_some() {
            return None;
        }
        self.steps.push(Step {
            id: Uuid::new_v4().to_string(),
            node_id: node.id.clone(),
            node_label: node.label.clone(),
            status: StepStatus::Running,
            input: input.to_string(),
            output: None,
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
            error: None,
        });
        self.status = ExecutionStatus::Running;
        self.current_node_id = Some(node.id.clone());
        Some(self.steps.len() - 1)
    }

    pub fn record_tool_call(&mut self, record: ToolCallRecord) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self.running_step_mut() {
            Some(step) => {
                step.tool_calls.push(record);
                true
            }
            None => false,
        }
    }

    pub fn complete_step(&mut self, output: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self.running_step_mut() {
            Some(step) => {
                step.output = Some(output.into());
                step.status = StepStatus::Completed;
                true
            }
            None => false,
        }
    }

    pub fn fail_step(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self.running_step_mut() {
            Some(step) => {
                step.error = Some(message.into());
                step.status = StepStatus::Error;
                true
            }
            None => false,
        }
    }

    /// Finish the run successfully. Refused while a step is still running.
    pub fn complete(&mut self, final_output: impl Into<String>) -> bool {
        if self.is_terminal() || self.running_step().is_some() {
            return false;
        }
        self.status = ExecutionStatus::Completed;
        self.final_output = Some(final_output.into());
        self.finished_at = Some(Utc::now());
        true
    }

    /// Fail the run, failing the in-flight step with the same message.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        let message = message.into();
        self.fail_step(message.clone());
        self.status = ExecutionStatus::Error;
        self.error = Some(message);
        self.finished_at = Some(Utc::now());
        true
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of the state as delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(flatten)]
    pub state: ExecutionState,
    /// Set only on the last snapshot of a run.
    pub done: bool,
}

impl StateSnapshot {
    pub fn new(state: &ExecutionState, done: bool) -> Self {
        Self {
            state: state.clone(),
            done,
        }
    }
}
