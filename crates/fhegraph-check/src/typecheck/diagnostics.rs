//! Structural diagnostics reported by [`validate_graph`](super::validate_graph).

use fhegraph_core::id::NodeId;
use fhegraph_core::types::DataType;
use serde::{Deserialize, Serialize};

/// A problem that prevents a graph from being compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum TypeError {
    /// A node has the wrong number of operands for its op.
    #[error("node {node} ({op}) expects {expected} operand(s), got {actual}")]
    WrongOperandCount {
        node: NodeId,
        op: String,
        expected: usize,
        actual: usize,
    },

    /// `Encode` applied to a value that is already encoded or encrypted.
    #[error("encode at node {node} needs a raw operand, node {operand} is {actual}")]
    EncodeOfNonRaw {
        node: NodeId,
        operand: NodeId,
        actual: DataType,
    },

    /// A constant whose length does not divide the graph's vector width.
    #[error("constant at node {node} has length {len}, which does not divide width {width}")]
    ConstantWidthMismatch { node: NodeId, len: usize, width: u32 },

    /// The graph declares no outputs, so nothing would be computed.
    #[error("graph '{graph}' declares no outputs")]
    NoOutputs { graph: String },

    /// The graph's operand edges are cyclic.
    #[error("graph '{graph}' is not acyclic: {reason}")]
    NotAcyclic { graph: String, reason: String },
}
