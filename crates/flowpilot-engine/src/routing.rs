//! Next-edge selection.

use tracing::warn;

use flowpilot_core::error::{FlowError, Result};

use crate::graph::{Edge, Node, Workflow};

/// Picks the edge to follow after a node's step completes.
///
/// `outgoing` is never empty and is in declaration order. Returning `None`
/// ends the run at `node` as if it had no outgoing edges.
pub trait EdgeRouter: Send + Sync {
    fn choose_next_edge<'a>(&self, node: &Node, outgoing: &[&'a Edge]) -> Option<&'a Edge>;
}

/// Follows the first outgoing edge. Branches are not run in parallel; the
/// remaining edges are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstEdgeRouter;

impl EdgeRouter for FirstEdgeRouter {
    fn choose_next_edge<'a>(&self, node: &Node, outgoing: &[&'a Edge]) -> Option<&'a Edge> {
        let first = outgoing.first().copied()?;
        if outgoing.len() > 1 {
            warn!(
                node_id = %node.id,
                taken = %first.target,
                skipped = outgoing.len() - 1,
                "Node has several outgoing edges, following the first"
            );
        }
        Some(first)
    }
}

/// The node sequence a run would visit under `router`, without calling the
/// model. Used for dry-run validation.
pub fn planned_path<'w>(
    workflow: &'w Workflow,
    router: &dyn EdgeRouter,
    max_node_visits: usize,
) -> Result<Vec<&'w Node>> {
    let mut visits = vec![0usize; workflow.nodes().len()];
    let mut path = Vec::new();
    let mut current = workflow.entry_node()?;

    loop {
        let pos = workflow
            .position(&current.id)
            .ok_or_else(|| FlowError::NodeNotFound(current.id.clone()))?;
        visits[pos] += 1;
        if visits[pos] > max_node_visits {
            return Err(FlowError::VisitLimitExceeded {
                node_id: current.id.clone(),
                limit: max_node_visits,
            });
        }
        path.push(current);

        let outgoing = workflow.outgoing(&current.id);
        if outgoing.is_empty() {
            return Ok(path);
        }
        let Some(edge) = router.choose_next_edge(current, &outgoing) else {
            return Ok(path);
        };
        current = workflow
            .node(&edge.target)
            .ok_or_else(|| FlowError::NodeNotFound(edge.target.clone()))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(path: &[&Node]) -> Vec<String> {
        path.iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn test_first_edge_router() {
        let node = Node::new("a", "A");
        let e1 = Edge::new("a", "b");
        let e2 = Edge::new("a", "c");
        let chosen = FirstEdgeRouter.choose_next_edge(&node, &[&e1, &e2]).unwrap();
        assert_eq!(chosen.target, "b");
        assert!(FirstEdgeRouter.choose_next_edge(&node, &[]).is_none());
    }

    #[test]
    fn test_planned_path_diamond_degrades_to_chain() {
        let wf = Workflow::new(
            vec![
                Node::new("a", "A"),
                Node::new("b", "B"),
                Node::new("c", "C"),
                Node::new("d", "D"),
            ],
            vec![
                Edge::new("a", "b"),
                Edge::new("a", "c"),
                Edge::new("b", "d"),
                Edge::new("c", "d"),
            ],
        );
        let path = planned_path(&wf, &FirstEdgeRouter, 5).unwrap();
        assert_eq!(ids(&path), vec!["a", "b", "d"]);
    }

    #[test]
    fn test_planned_path_reachable_cycle() {
        let wf = Workflow::new(
            vec![Node::new("start", "S"), Node::new("x", "X"), Node::new("y", "Y")],
            vec![Edge::new("start", "x"), Edge::new("x", "y"), Edge::new("y", "x")],
        );
        let err = planned_path(&wf, &FirstEdgeRouter, 2).unwrap_err();
        assert!(matches!(
            err,
            FlowError::VisitLimitExceeded { ref node_id, limit: 2 } if node_id == "x"
        ));
    }

    #[test]
    fn test_planned_path_dangling_edge() {
        let wf = Workflow::new(vec![Node::new("a", "A")], vec![Edge::new("a", "ghost")]);
        let err = planned_path(&wf, &FirstEdgeRouter, 5).unwrap_err();
        assert!(matches!(err, FlowError::NodeNotFound(ref id) if id == "ghost"));
    }

    struct NeverRouter;

    impl EdgeRouter for NeverRouter {
        fn choose_next_edge<'a>(&self, _node: &Node, _outgoing: &[&'a Edge]) -> Option<&'a Edge> {
            None
        }
    }

    #[test]
    fn test_router_can_stop_early() {
        let wf = Workflow::new(
            vec![Node::new("a", "A"), Node::new("b", "B")],
            vec![Edge::new("a", "b")],
        );
        let path = planned_path(&wf, &NeverRouter, 5).unwrap();
        assert_eq!(ids(&path), vec!["a"]);
    }
}
