//! Workflow execution engine.
//!
//! [`Orchestrator`] walks a [`Workflow`] from its entry node, running each
//! node through a [`StepRunner`] and handing the step's output to the next
//! node. Every state transition is delivered to a [`StatePublisher`].

pub mod graph;
pub mod orchestrator;
pub mod prompt;
pub mod publisher;
pub mod routing;
pub mod state;
pub mod step_loop;

pub use graph::{Edge, EdgeKind, Node, Workflow};
pub use orchestrator::{Orchestrator, RunFailure};
pub use publisher::{ChannelPublisher, JsonLinesPublisher, StatePublisher};
pub use routing::{planned_path, EdgeRouter, FirstEdgeRouter};
pub use state::{
    ExecutionState, ExecutionStatus, StateSnapshot, Step, StepStatus, ToolCallRecord,
};
pub use step_loop::{StepOutcome, StepRunner};
