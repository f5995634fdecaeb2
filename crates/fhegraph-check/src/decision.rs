//! Scheme choice from how a graph uses numbers.
//!
//! Evidence is read off constants and division nodes:
//! - Byte constants or division select the bitwise scheme.
//! - Real constants select the approximate scheme, which also divides, so
//!   reals with division stay approximate. Reals with bytes are rejected.
//! - Integer constants alone select the exact integer scheme.
//!
//! A graph with no evidence at all runs on the approximate scheme. A group
//! pools the evidence of all its members, so one scheme serves the group.

use fhegraph_core::graph::Graph;
use fhegraph_core::group::GraphGroup;
use fhegraph_core::ops::{BinaryOp, Op};
use fhegraph_core::scheme::SchemeKind;
use fhegraph_core::types::ConstValue;
use tracing::debug;

use crate::error::CompileError;

/// Numeric evidence gathered from one or more graphs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NumericUsage {
    pub bytes: bool,
    pub ints: bool,
    pub floats: bool,
    pub division: bool,
}

impl NumericUsage {
    pub fn of(graph: &Graph) -> Self {
        let mut usage = NumericUsage::default();
        for node in graph.nodes() {
            match &node.op {
                Op::Constant { value } => match value {
                    ConstValue::Byte(_) => usage.bytes = true,
                    ConstValue::Int(_) => usage.ints = true,
                    ConstValue::Float(_) => usage.floats = true,
                },
                Op::Binary { op: BinaryOp::Div } => usage.division = true,
                _ => {}
            }
        }
        usage
    }

    pub fn merge(&mut self, other: &NumericUsage) {
        self.bytes |= other.bytes;
        self.ints |= other.ints;
        self.floats |= other.floats;
        self.division |= other.division;
    }

    pub fn scheme(&self) -> Result<SchemeKind, CompileError> {
        if self.bytes && self.floats {
            return Err(CompileError::SchemeUndecidable {
                reason: "byte and real constants are mixed".into(),
            });
        }
        if self.floats {
            return Ok(SchemeKind::Ckks);
        }
        if self.bytes || self.division {
            return Ok(SchemeKind::Bitwise);
        }
        if self.ints {
            return Ok(SchemeKind::Bfv);
        }
        Ok(SchemeKind::Ckks)
    }
}

/// The scheme `graph` should be compiled for.
pub fn infer_scheme(graph: &Graph) -> Result<SchemeKind, CompileError> {
    let scheme = NumericUsage::of(graph).scheme()?;
    debug!(graph = graph.name(), %scheme, "inferred scheme");
    Ok(scheme)
}

/// The one scheme every member of `group` can be compiled for.
pub fn infer_group_scheme(group: &GraphGroup) -> Result<SchemeKind, CompileError> {
    let mut usage = NumericUsage::default();
    for graph in group.graphs() {
        usage.merge(&NumericUsage::of(graph));
    }
    let scheme = usage.scheme()?;
    debug!(group = group.name(), %scheme, members = group.len(), "inferred scheme");
    Ok(scheme)
}
