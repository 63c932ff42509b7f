use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use flowpilot_core::error::{FlowError, Result};

use super::edge::Edge;
use super::node::Node;

#[derive(Serialize, Deserialize)]
struct WorkflowFile {
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// Nodes plus directed edges, with a position index for lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "WorkflowFile", into = "WorkflowFile")]
pub struct Workflow {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
}

impl From<WorkflowFile> for Workflow {
    fn from(file: WorkflowFile) -> Self {
        Self::new(file.nodes, file.edges)
    }
}

impl From<Workflow> for WorkflowFile {
    fn from(workflow: Workflow) -> Self {
        Self {
            nodes: workflow.nodes,
            edges: workflow.edges,
        }
    }
}

impl Workflow {
    /// Build a workflow. When ids repeat, lookups resolve to the first node;
    /// [`Workflow::validate`] reports the duplicate.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            index.entry(node.id.clone()).or_insert(i);
        }
        Self {
            nodes,
            edges,
            index,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| FlowError::InvalidWorkflow(format!("failed to parse workflow: {}", e)))
    }

    /// Load a workflow from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.position(id).map(|i| &self.nodes[i])
    }

    /// Position of a node in declaration order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Edges leaving `node_id`, in declaration order.
    pub fn outgoing(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }

    /// The node where a run starts: the first node, in declaration order,
    /// that no edge points at.
    ///
    /// Fails with `NoEntryNode` when every node has an incoming edge. When
    /// several nodes qualify the first one wins and a warning is logged.
    pub fn entry_node(&self) -> Result<&Node> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.target.as_str()).collect();
        let mut candidates = self.nodes.iter().filter(|n| !targets.contains(n.id.as_str()));

        let entry = candidates.next().ok_or(FlowError::NoEntryNode)?;
        let others: Vec<&str> = candidates.map(|n| n.id.as_str()).collect();
        if !others.is_empty() {
            warn!(
                entry = %entry.id,
                ignored = ?others,
                "Multiple nodes without incoming edges, using the first"
            );
        }
        Ok(entry)
    }

    /// Structural checks: at least one node, non-empty unique node ids, and
    /// edges that only reference known nodes.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(FlowError::InvalidWorkflow("workflow has no nodes".into()));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(FlowError::InvalidWorkflow("node with empty id".into()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(FlowError::InvalidWorkflow(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !self.index.contains_key(endpoint) {
                    return Err(FlowError::InvalidWorkflow(format!(
                        "edge '{}' references unknown node '{}'",
                        edge.id, endpoint
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Workflow {
        Workflow::new(
            vec![Node::new("a", "A"), Node::new("b", "B"), Node::new("c", "C")],
            vec![Edge::new("a", "b"), Edge::new("b", "c")],
        )
    }

    #[test]
    fn test_entry_node_of_chain() {
        let wf = chain();
        assert_eq!(wf.entry_node().unwrap().id, "a");
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn test_entry_node_ignores_declaration_position() {
        let wf = Workflow::new(
            vec![Node::new("b", "B"), Node::new("a", "A")],
            vec![Edge::new("a", "b")],
        );
        assert_eq!(wf.entry_node().unwrap().id, "a");
    }

    #[test]
    fn test_cycle_has_no_entry() {
        let wf = Workflow::new(
            vec![Node::new("a", "A"), Node::new("b", "B")],
            vec![Edge::new("a", "b"), Edge::new("b", "a")],
        );
        assert!(matches!(wf.entry_node(), Err(FlowError::NoEntryNode)));
    }

    #[test]
    fn test_self_loop_is_incoming_edge() {
        let wf = Workflow::new(vec![Node::new("a", "A")], vec![Edge::new("a", "a")]);
        assert!(matches!(wf.entry_node(), Err(FlowError::NoEntryNode)));
    }

    #[test]
    fn test_multiple_entries_first_wins() {
        let wf = Workflow::new(
            vec![Node::new("x", "X"), Node::new("y", "Y"), Node::new("z", "Z")],
            vec![Edge::new("y", "z")],
        );
        assert_eq!(wf.entry_node().unwrap().id, "x");
    }

    #[test]
    fn test_outgoing_keeps_declaration_order() {
        let wf = Workflow::new(
            vec![Node::new("a", "A"), Node::new("b", "B"), Node::new("c", "C")],
            vec![Edge::new("a", "c"), Edge::new("b", "c"), Edge::new("a", "b")],
        );
        let targets: Vec<&str> = wf.outgoing("a").iter().map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["c", "b"]);
        assert!(wf.outgoing("c").is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_graphs() {
        let empty = Workflow::new(vec![], vec![]);
        assert!(matches!(empty.validate(), Err(FlowError::InvalidWorkflow(_))));

        let dup = Workflow::new(vec![Node::new("a", "A"), Node::new("a", "A2")], vec![]);
        let err = dup.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate node id 'a'"));

        let dangling = Workflow::new(vec![Node::new("a", "A")], vec![Edge::new("a", "ghost")]);
        let err = dangling.validate().unwrap_err().to_string();
        assert!(err.contains("unknown node 'ghost'"));
    }

    #[test]
    fn test_from_json() {
        let wf = Workflow::from_json(
            r#"{
                "nodes": [
                    {"id": "n1", "label": "Draft", "instructionContent": "Write a draft"},
                    {"id": "n2", "label": "Review"}
                ],
                "edges": [{"id": "e1", "source": "n1", "target": "n2"}]
            }"#,
        )
        .unwrap();
        assert_eq!(wf.nodes().len(), 2);
        assert_eq!(wf.position("n2"), Some(1));
        assert_eq!(wf.node("n1").unwrap().instruction, "Write a draft");

        let round: Workflow =
            serde_json::from_value(serde_json::to_value(&wf).unwrap()).unwrap();
        assert_eq!(round.edges(), wf.edges());
    }

    #[test]
    fn test_from_json_error() {
        let err = Workflow::from_json("{\"edges\": []}").unwrap_err();
        assert!(matches!(err, FlowError::InvalidWorkflow(_)));
    }
}
