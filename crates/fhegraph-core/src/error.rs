//! Core error types for fhegraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of graph and group construction.

use crate::id::NodeId;
use thiserror::Error;

/// Errors produced while building or querying graphs and groups.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node id was not found in the graph.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// An input with this name is already declared.
    #[error("duplicate input name: '{name}'")]
    DuplicateInput { name: String },

    /// An output with this name is already declared.
    #[error("duplicate output name: '{name}'")]
    DuplicateOutput { name: String },

    /// An op was given the wrong number of operands.
    #[error("{op} expects {expected} operand(s), got {actual}")]
    ArityMismatch {
        op: String,
        expected: usize,
        actual: usize,
    },

    /// The graph's vector width is unusable.
    #[error("invalid vector width {width}")]
    InvalidVectorWidth { width: u32 },

    /// A constant's length does not divide the vector width.
    #[error("value of length {len} does not divide vector width {width}")]
    VectorWidthMismatch { width: u32, len: usize },

    /// A graph with this name already belongs to the group.
    #[error("duplicate graph name in group: '{name}'")]
    DuplicateGraph { name: String },

    /// No graph with this name belongs to the group.
    #[error("graph not found in group: '{name}'")]
    GraphNotFound { name: String },

    /// Two graphs of one group declare the same input name.
    #[error("input '{name}' of graph '{graph}' is already declared by another graph of the group")]
    InputNameOverlap { name: String, graph: String },

    /// A graph adopted into a group reuses a node id of another member.
    #[error("node id {id} of graph '{graph}' collides with an id already used in the group")]
    IndexCollision { id: NodeId, graph: String },

    /// An internal graph invariant was violated.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },
}
