use flowpilot_core::types::ChatMessage;

use crate::graph::Node;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are one step in a multi-step AI workflow. \
Complete the task described for this step using the provided input. \
Call the available tools when they help. \
Reply with the final result only; it is passed on as the input of the next step.";

/// Initial conversation for a step: the system instruction followed by one
/// user message describing the node and its input.
///
/// The same node and input always produce the same messages.
pub fn step_conversation(node: &Node, input: &str, system_prompt: Option<&str>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT)),
        ChatMessage::user(render_step_prompt(node, input)),
    ]
}

fn render_step_prompt(node: &Node, input: &str) -> String {
    let mut prompt = String::new();

    let title = if node.label.is_empty() { &node.id } else { &node.label };
    prompt.push_str(&format!("## Step: {}\n\n", title));

    if !node.description.trim().is_empty() {
        prompt.push_str(node.description.trim());
        prompt.push_str("\n\n");
    }

    if !node.instruction.trim().is_empty() {
        prompt.push_str("## Instructions\n\n");
        prompt.push_str(node.instruction.trim());
        prompt.push_str("\n\n");
    }

    prompt.push_str("## Input\n\n");
    prompt.push_str(input);
    prompt
}
