use serde::{Deserialize, Serialize};

/// Descriptive edge category. Routing only looks at whether an edge exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    #[default]
    Primary,
    Conditional,
    #[serde(other)]
    Other,
}

/// A directed transition from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, alias = "type")]
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
            kind: EdgeKind::Primary,
        }
    }

    pub fn with_kind(mut self, kind: EdgeKind) -> Self {
        self.kind = kind;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_new_generates_id() {
        let edge = Edge::new("a", "b");
        assert_eq!(edge.id, "a->b");
        assert_eq!(edge.kind, EdgeKind::Primary);
    }

    #[test]
    fn test_edge_kind_parsing() {
        let edge: Edge =
            serde_json::from_str(r#"{"id": "e1", "source": "a", "target": "b"}"#).unwrap();
        assert_eq!(edge.kind, EdgeKind::Primary);

        let edge: Edge = serde_json::from_str(
            r#"{"id": "e2", "source": "a", "target": "b", "type": "conditional"}"#,
        )
        .unwrap();
        assert_eq!(edge.kind, EdgeKind::Conditional);

        let edge: Edge = serde_json::from_str(
            r#"{"source": "a", "target": "b", "kind": "smoothstep"}"#,
        )
        .unwrap();
        assert_eq!(edge.kind, EdgeKind::Other);
        assert!(edge.id.is_empty());
    }
}
