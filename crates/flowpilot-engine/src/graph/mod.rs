//! Workflow graph model.
//!
//! A workflow is a list of nodes and directed edges loaded from JSON. The
//! walker indexes nodes by position so traversal never needs recursion.

pub mod edge;
pub mod node;
pub mod workflow;

pub use edge::{Edge, EdgeKind};
pub use node::Node;
pub use workflow::Workflow;
