//! Error type for compilation (validation, inference, lowering).

use fhegraph_core::error::CoreError;
use fhegraph_core::id::NodeId;
use fhegraph_core::scheme::SchemeKind;
use thiserror::Error;

use crate::typecheck::TypeError;

#[derive(Debug, Error)]
pub enum CompileError {
    /// Structural validation failed; every problem found is listed.
    #[error("graph failed validation with {} error(s)", .0.len())]
    TypeErrors(Vec<TypeError>),

    /// The op has neither a native mapping nor a lowering for the backend.
    #[error("{op} at node {node} has no lowering for the {scheme} backend")]
    UnsupportedOperation {
        node: NodeId,
        op: String,
        scheme: SchemeKind,
    },

    /// The graph's numbers point at schemes that cannot be reconciled.
    #[error("no scheme fits the graph: {reason}")]
    SchemeUndecidable { reason: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}
