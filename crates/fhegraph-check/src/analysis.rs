//! Key-requirement analysis of a lowered graph.
//!
//! Key generation needs to know which rotation keys to produce, whether
//! relinearization keys are needed and how deep the modulus chain must be.
//! All three are read off the lowered graph and its types.

use std::collections::{BTreeSet, HashMap};

use fhegraph_core::error::CoreError;
use fhegraph_core::graph::Graph;
use fhegraph_core::ops::{BinaryOp, Op};
use serde::{Deserialize, Serialize};

use crate::traversal::forward_order;
use crate::typecheck::TypeMap;

/// What key material a graph (or group of graphs) needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRequirements {
    /// Signed rotation steps on encrypted values; right rotations are
    /// negative.
    pub rotation_steps: BTreeSet<i32>,
    /// Longest chain of encrypted multiplications or divisions.
    pub mult_depth: u32,
    /// Some multiplication takes two ciphertexts.
    pub needs_relin: bool,
    /// Largest vector width among the analyzed graphs.
    pub max_vec_width: u32,
}

impl KeyRequirements {
    /// Widens `self` to also cover `other`.
    pub fn merge(&mut self, other: &KeyRequirements) {
        self.rotation_steps.extend(other.rotation_steps.iter().copied());
        self.mult_depth = self.mult_depth.max(other.mult_depth);
        self.needs_relin |= other.needs_relin;
        self.max_vec_width = self.max_vec_width.max(other.max_vec_width);
    }
}

/// Normalized rotation step for a rotation by `steps` slots on a vector of
/// `vec_width` slots. Rotating replicated vectors by a multiple of the width
/// is the identity, so only the remainder matters.
pub fn rotation_step(steps: u32, vec_width: u32, left: bool) -> i32 {
    let step = (steps % vec_width.max(1)) as i32;
    if left {
        step
    } else {
        -step
    }
}

pub fn analyze(graph: &Graph, types: &TypeMap) -> Result<KeyRequirements, CoreError> {
    let mut requirements = KeyRequirements {
        max_vec_width: graph.vec_width(),
        ..KeyRequirements::default()
    };
    let mut depth: HashMap<_, u32> = HashMap::new();

    for id in forward_order(graph)? {
        let operands = graph.operands(id);
        let mut node_depth = operands
            .iter()
            .map(|operand| depth.get(operand).copied().unwrap_or(0))
            .max()
            .unwrap_or(0);
        let encrypted = types.of(id)?.is_cipher();

        match graph.op(id)? {
            Op::Binary {
                op: BinaryOp::Mul | BinaryOp::Div,
            } if encrypted => {
                node_depth += 1;
                let both_cipher = operands
                    .iter()
                    .map(|operand| types.of(*operand))
                    .collect::<Result<Vec<_>, _>>()?
                    .iter()
                    .all(|ty| ty.is_cipher());
                if both_cipher && matches!(graph.op(id)?, Op::Binary { op: BinaryOp::Mul }) {
                    requirements.needs_relin = true;
                }
            }
            Op::RotateLeft { steps } if encrypted => {
                let step = rotation_step(*steps, graph.vec_width(), true);
                if step != 0 {
                    requirements.rotation_steps.insert(step);
                }
            }
            Op::RotateRight { steps } if encrypted => {
                let step = rotation_step(*steps, graph.vec_width(), false);
                if step != 0 {
                    requirements.rotation_steps.insert(step);
                }
            }
            _ => {}
        }

        requirements.mult_depth = requirements.mult_depth.max(node_depth);
        depth.insert(id, node_depth);
    }
    Ok(requirements)
}
