//! Graph walker: runs a workflow node by node and publishes every transition.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use flowpilot_core::config::EngineConfig;
use flowpilot_core::error::{FlowError, Result};
use flowpilot_llm::ModelGateway;
use flowpilot_tools::ToolRegistry;

use crate::graph::Workflow;
use crate::publisher::StatePublisher;
use crate::routing::{EdgeRouter, FirstEdgeRouter};
use crate::state::{ExecutionState, StateSnapshot, ToolCallRecord};
use crate::step_loop::StepRunner;

/// A run that ended in `error`, with the state it ended in.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct RunFailure {
    pub source: FlowError,
    pub state: Box<ExecutionState>,
}

/// Walks a workflow from its entry node, one step at a time.
///
/// The model gateway and tool registry are injected, so orchestrators with
/// different credentials can run side by side. Each run owns its own
/// [`ExecutionState`].
pub struct Orchestrator {
    runner: StepRunner,
    max_node_visits: usize,
    publisher: Arc<dyn StatePublisher>,
    router: Box<dyn EdgeRouter>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<ModelGateway>,
        tools: Arc<ToolRegistry>,
        config: EngineConfig,
        publisher: Arc<dyn StatePublisher>,
    ) -> Self {
        Self {
            max_node_visits: config.max_node_visits,
            runner: StepRunner::new(gateway, tools, config),
            publisher,
            router: Box::new(FirstEdgeRouter),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the default first-edge routing.
    pub fn with_router(mut self, router: impl EdgeRouter + 'static) -> Self {
        self.router = Box::new(router);
        self
    }

    /// Token that aborts the run in progress at its next model or tool call.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `workflow` with `input` to a terminal state.
    ///
    /// The final published snapshot has `done = true` and is published
    /// exactly once, whether the run completed or failed.
    pub async fn run(
        &self,
        workflow: &Workflow,
        input: &str,
    ) -> std::result::Result<ExecutionState, RunFailure> {
        let mut state = ExecutionState::new();
        info!(
            execution_id = %state.execution_id,
            nodes = workflow.nodes().len(),
            edges = workflow.edges().len(),
            "Starting workflow run"
        );
        self.publish(&state, false);

        match self.walk(workflow, input, &mut state).await {
            Ok(()) => {
                info!(
                    execution_id = %state.execution_id,
                    steps = state.steps.len(),
                    "Workflow run completed"
                );
                self.publish(&state, true);
                Ok(state)
            }
            Err(e) => {
                error!(
                    execution_id = %state.execution_id,
                    node_id = state.current_node_id.as_deref().unwrap_or("-"),
                    error = %e,
                    "Workflow run failed"
                );
                state.fail(e.to_string());
                self.publish(&state, true);
                Err(RunFailure {
                    source: e,
                    state: Box::new(state),
                })
            }
        }
    }

    async fn walk(&self, workflow: &Workflow, input: &str, state: &mut ExecutionState) -> Result<()> {
        self.runner.config().validate()?;
        let entry = workflow.entry_node()?;
        let mut current = workflow
            .position(&entry.id)
            .ok_or_else(|| FlowError::NodeNotFound(entry.id.clone()))?;
        let mut visits = vec![0usize; workflow.nodes().len()];
        let mut step_input = input.to_string();
        let execution_id = state.execution_id.clone();

        loop {
            let node = &workflow.nodes()[current];

            visits[current] += 1;
            if visits[current] > self.max_node_visits {
                return Err(FlowError::VisitLimitExceeded {
                    node_id: node.id.clone(),
                    limit: self.max_node_visits,
                });
            }
            if self.cancel.is_cancelled() {
                return Err(FlowError::Cancelled);
            }

            state.begin_step(node, &step_input);
            info!(node_id = %node.id, label = %node.label, step = state.steps.len(), "Step started");
            self.publish(state, false);

            let outcome = {
                let publisher = &self.publisher;
                let mut on_tool_call = |record: &ToolCallRecord| {
                    if state.record_tool_call(record.clone()) {
                        publisher.publish(StateSnapshot::new(state, false));
                    }
                };
                self.runner
                    .run(&execution_id, node, &step_input, &self.cancel, &mut on_tool_call)
                    .await?
            };

            state.complete_step(outcome.output.clone());
            info!(
                node_id = %node.id,
                tool_calls = outcome.tool_calls.len(),
                turns = outcome.turns,
                "Step completed"
            );
            self.publish(state, false);

            let outgoing = workflow.outgoing(&node.id);
            let next = if outgoing.is_empty() {
                None
            } else {
                self.router.choose_next_edge(node, &outgoing)
            };

            match next {
                Some(edge) => {
                    current = workflow
                        .position(&edge.target)
                        .ok_or_else(|| FlowError::NodeNotFound(edge.target.clone()))?;
                    step_input = outcome.output;
                }
                None => {
                    state.complete(outcome.output);
                    return Ok(());
                }
            }
        }
    }

    fn publish(&self, state: &ExecutionState, done: bool) {
        self.publisher.publish(StateSnapshot::new(state, done));
    }
}
