//! Graph node wrapper.

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::ops::Op;

/// A node of the graph: its stable id and the op it performs.
///
/// Operands are not stored on the node; they are the node's incoming
/// [`OperandEdge`](crate::edge::OperandEdge)s, ordered by port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub op: Op,
}

impl Node {
    pub fn new(id: NodeId, op: Op) -> Self {
        Node { id, op }
    }
}
