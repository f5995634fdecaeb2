//! Type-lattice inference and structural validation.
//!
//! - [`infer_types`]: one forward pass assigning every node its
//!   [`DataType`] (`Raw < Plain < Cipher`).
//! - [`validate_graph`]: scans the whole graph and reports ALL structural
//!   errors at once.
//!
//! Both functions are pure -- they read the graph but do not modify it.

pub mod diagnostics;

pub use diagnostics::TypeError;

use std::collections::HashMap;

use fhegraph_core::error::CoreError;
use fhegraph_core::graph::Graph;
use fhegraph_core::id::NodeId;
use fhegraph_core::ops::Op;
use fhegraph_core::types::DataType;

use crate::traversal::forward_order;

/// Resolved classification of every node of one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeMap {
    types: HashMap<NodeId, DataType>,
}

impl TypeMap {
    pub fn get(&self, id: NodeId) -> Option<DataType> {
        self.types.get(&id).copied()
    }

    /// Like [`get`](Self::get) but treats a missing entry as a broken
    /// invariant of the caller's traversal.
    pub fn of(&self, id: NodeId) -> Result<DataType, CoreError> {
        self.get(id).ok_or_else(|| CoreError::GraphInconsistency {
            reason: format!("node {} has no inferred type", id),
        })
    }

    pub fn insert(&mut self, id: NodeId, ty: DataType) {
        self.types.insert(id, ty);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, DataType)> + '_ {
        self.types.iter().map(|(id, ty)| (*id, *ty))
    }
}

/// Infers the classification of every node in dependency order.
///
/// A node with operands takes the join of its operands' types, except
/// `Encode`, which is always `Plain`. Constants are `Raw`; inputs take their
/// declared type.
pub fn infer_types(graph: &Graph) -> Result<TypeMap, CoreError> {
    let mut types = TypeMap::default();
    for id in forward_order(graph)? {
        let ty = resolve(graph, id, &types)?;
        types.insert(id, ty);
    }
    Ok(types)
}

/// Type of one node given the types of its operands.
pub fn resolve(graph: &Graph, id: NodeId, types: &TypeMap) -> Result<DataType, CoreError> {
    match graph.op(id)? {
        Op::Encode { .. } => Ok(DataType::Plain),
        Op::Constant { .. } => Ok(DataType::Raw),
        Op::Input { ty, .. } => Ok(*ty),
        Op::Output { .. }
        | Op::Binary { .. }
        | Op::Negate
        | Op::RotateLeft { .. }
        | Op::RotateRight { .. }
        | Op::Macro { .. } => graph
            .operands(id)
            .into_iter()
            .try_fold(DataType::Raw, |acc, operand| Ok(acc.join(types.of(operand)?))),
    }
}

/// Validates the entire graph and returns every error found.
pub fn validate_graph(graph: &Graph) -> Vec<TypeError> {
    let mut errors = Vec::new();

    if graph.outputs().is_empty() {
        errors.push(TypeError::NoOutputs {
            graph: graph.name().to_string(),
        });
    }

    for node in graph.nodes() {
        let actual = graph.operands(node.id).len();
        if actual != node.op.arity() {
            errors.push(TypeError::WrongOperandCount {
                node: node.id,
                op: node.op.name(),
                expected: node.op.arity(),
                actual,
            });
        }
        if let Op::Constant { value } = &node.op {
            let len = value.len();
            if len == 0 || graph.vec_width() as usize % len != 0 {
                errors.push(TypeError::ConstantWidthMismatch {
                    node: node.id,
                    len,
                    width: graph.vec_width(),
                });
            }
        }
    }

    // Checks below depend on a complete, acyclic type assignment.
    let types = match infer_types(graph) {
        Ok(types) => types,
        Err(err) => {
            errors.push(TypeError::NotAcyclic {
                graph: graph.name().to_string(),
                reason: err.to_string(),
            });
            return errors;
        }
    };

    for node in graph.nodes() {
        if let Op::Encode { .. } = node.op {
            for operand in graph.operands(node.id) {
                if let Some(actual) = types.get(operand).filter(|ty| *ty != DataType::Raw) {
                    errors.push(TypeError::EncodeOfNonRaw {
                        node: node.id,
                        operand,
                        actual,
                    });
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhegraph_core::ops::MacroOp;
    use fhegraph_core::types::ConstValue;
    use proptest::prelude::*;

    #[test]
    fn cipher_dominates_and_encode_forces_plain() {
        let mut graph = Graph::new("g", 4).unwrap();
        let x = graph.declare_input("x", DataType::Cipher).unwrap();
        let p = graph.declare_input("p", DataType::Plain).unwrap();
        let c = graph.constant(ConstValue::Float(vec![1.0])).unwrap();
        let enc = graph.encode(c, 40, 0).unwrap();
        let plain_sum = graph.add(p, enc).unwrap();
        let mixed = graph.mul(plain_sum, x).unwrap();
        let raw_neg = graph.negate(c).unwrap();
        let out = graph.declare_output("out", mixed).unwrap();

        let types = infer_types(&graph).unwrap();

        assert_eq!(types.get(c), Some(DataType::Raw));
        assert_eq!(types.get(enc), Some(DataType::Plain));
        assert_eq!(types.get(plain_sum), Some(DataType::Plain));
        assert_eq!(types.get(mixed), Some(DataType::Cipher));
        assert_eq!(types.get(raw_neg), Some(DataType::Raw));
        assert_eq!(types.get(out), Some(DataType::Cipher));
        assert_eq!(types.len(), graph.node_count());
    }

    #[test]
    fn valid_graph_has_no_errors() {
        let mut graph = Graph::new("g", 4).unwrap();
        let x = graph.declare_input("x", DataType::Cipher).unwrap();
        let sq = graph.mul(x, x).unwrap();
        graph.declare_output("out", sq).unwrap();
        assert!(validate_graph(&graph).is_empty());
    }

    #[test]
    fn validate_reports_every_error() {
        let mut graph = Graph::new("g", 4).unwrap();
        let x = graph.declare_input("x", DataType::Cipher).unwrap();
        let enc = graph.encode(x, 40, 0).unwrap();
        graph.macro_op(MacroOp::CountIf, &[enc]).unwrap();

        let errors = validate_graph(&graph);

        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&TypeError::NoOutputs { graph: "g".into() }));
        assert!(errors.contains(&TypeError::EncodeOfNonRaw {
            node: enc,
            operand: x,
            actual: DataType::Cipher,
        }));
    }

    // -----------------------------------------------------------------------
    // Lattice monotonicity over random graphs
    // -----------------------------------------------------------------------

    /// One construction step: (op selector, first operand pick, second pick).
    fn arb_steps() -> impl Strategy<Value = Vec<(u8, usize, usize)>> {
        prop::collection::vec((0u8..7, any::<usize>(), any::<usize>()), 1..40)
    }

    fn build(input_types: &[DataType], steps: &[(u8, usize, usize)]) -> Graph {
        let mut graph = Graph::new("random", 8).unwrap();
        let mut nodes: Vec<NodeId> = input_types
            .iter()
            .enumerate()
            .map(|(i, ty)| graph.declare_input(format!("in{}", i), *ty).unwrap())
            .collect();
        nodes.push(graph.constant(ConstValue::Int(vec![3])).unwrap());

        for (selector, a, b) in steps {
            let lhs = nodes[a % nodes.len()];
            let rhs = nodes[b % nodes.len()];
            let id = match selector {
                0 => graph.add(lhs, rhs),
                1 => graph.sub(lhs, rhs),
                2 => graph.mul(lhs, rhs),
                3 => graph.negate(lhs),
                4 => graph.rotate_left(lhs, 1),
                5 => graph.constant(ConstValue::Float(vec![0.5, 1.5])),
                _ => graph.encode(lhs, 40, 0),
            }
            .unwrap();
            nodes.push(id);
        }
        let last = *nodes.last().unwrap();
        graph.declare_output("out", last).unwrap();
        graph
    }

    fn arb_type() -> impl Strategy<Value = DataType> {
        prop_oneof![
            Just(DataType::Raw),
            Just(DataType::Plain),
            Just(DataType::Cipher),
        ]
    }

    proptest! {
        #[test]
        fn type_is_join_of_operands_except_encode(
            input_types in prop::collection::vec(arb_type(), 1..4),
            steps in arb_steps(),
        ) {
            let graph = build(&input_types, &steps);
            let types = infer_types(&graph).unwrap();

            for node in graph.nodes() {
                let ty = types.get(node.id).unwrap();
                let operands = graph.operands(node.id);
                let joined = operands
                    .iter()
                    .map(|o| types.get(*o).unwrap())
                    .fold(DataType::Raw, DataType::join);
                match node.op {
                    Op::Encode { .. } => prop_assert_eq!(ty, DataType::Plain),
                    _ if operands.is_empty() => {}
                    _ => {
                        prop_assert!(ty >= joined);
                        prop_assert_eq!(ty, joined);
                    }
                }
            }
        }
    }
}
