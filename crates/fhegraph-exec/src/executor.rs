//! Graph execution over scheme values.
//!
//! [`SchemeExecutor`] evaluates one node at a time. Every binary node is
//! dispatched on the classification of both operands; the match covers all
//! nine pairs explicitly. [`run`] drives an executor in forward order and
//! drops each value right after its last consumer has been visited.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use fhegraph_check::traversal::{forward_order, use_counts};
use fhegraph_core::graph::Graph;
use fhegraph_core::id::NodeId;
use fhegraph_core::ops::{BinaryOp, Op};
use fhegraph_core::types::ConstValue;

use crate::error::ExecError;
use crate::keys::Public;
use crate::scalar::RawScalar;
use crate::scheme::{Evaluator, Scheme};
use crate::value::{SchemeValuation, SchemeValue};

pub trait Executor<S: Scheme> {
    /// Binds named values to the graph's input nodes.
    fn set_inputs(&mut self, inputs: &SchemeValuation<S>) -> Result<(), ExecError>;

    /// Evaluates `node`; its operands must already be evaluated.
    fn visit(&mut self, node: NodeId) -> Result<(), ExecError>;

    fn get_outputs(&self, outputs: &mut SchemeValuation<S>) -> Result<(), ExecError>;

    /// Drops the value of `node` early.
    fn free(&mut self, node: NodeId);
}

pub struct SchemeExecutor<'a, S: Scheme> {
    graph: &'a Graph,
    public: &'a Public<S>,
    values: HashMap<NodeId, SchemeValue<S>>,
}

impl<'a, S: Scheme> SchemeExecutor<'a, S> {
    pub fn new(graph: &'a Graph, public: &'a Public<S>) -> Result<Self, ExecError> {
        let slots = public.context().slot_count();
        let width = graph.vec_width() as usize;
        if width > slots || slots % width != 0 {
            return Err(ExecError::config(format!(
                "vector width {width} of graph '{}' does not divide the {slots} slots",
                graph.name()
            )));
        }
        Ok(SchemeExecutor {
            graph,
            public,
            values: HashMap::new(),
        })
    }

    /// Number of values currently held.
    pub fn live_values(&self) -> usize {
        self.values.len()
    }

    fn value(&self, node: NodeId) -> Result<&SchemeValue<S>, ExecError> {
        self.values
            .get(&node)
            .ok_or_else(|| ExecError::null_context(format!("node {node} has no value")))
    }

    fn evaluator(&self) -> Evaluator<'a> {
        self.public.evaluator()
    }

    fn constant(&self, node: NodeId, value: &ConstValue) -> Result<SchemeValue<S>, ExecError> {
        let slots = S::Scalar::from_const(value).map_err(|reason| ExecError::arithmetic(node, reason))?;
        let slots = S::reduce_raw(self.public.context(), &slots);
        Ok(SchemeValue::Raw(replicate(&slots, self.graph.vec_width() as usize)?))
    }

    fn encode(
        &self,
        node: NodeId,
        operand: NodeId,
        scale_bits: u32,
        level: u32,
    ) -> Result<SchemeValue<S>, ExecError> {
        match self.value(operand)? {
            SchemeValue::Raw(values) => {
                let context = self.public.context();
                let slots = replicate(values, context.slot_count())?;
                let plain = S::encode(context, &slots, scale_bits, level).map_err(|e| e.at(node))?;
                Ok(SchemeValue::Plain(plain))
            }
            other => Err(ExecError::arithmetic(
                node,
                format!("encode expects a raw operand, got {}", other.data_type()),
            )),
        }
    }

    fn binary(
        &self,
        node: NodeId,
        op: BinaryOp,
        lhs: &SchemeValue<S>,
        rhs: &SchemeValue<S>,
    ) -> Result<SchemeValue<S>, ExecError> {
        let ev = self.evaluator();
        let cipher = match (lhs, rhs) {
            (SchemeValue::Raw(a), SchemeValue::Raw(b)) => {
                let context = self.public.context();
                let (a, b) = (S::reduce_raw(context, a), S::reduce_raw(context, b));
                return raw_binary::<S>(node, op, &a, &b)
                    .map(|values| SchemeValue::Raw(S::reduce_raw(context, &values)));
            }
            (SchemeValue::Cipher(a), SchemeValue::Cipher(b)) => match op {
                BinaryOp::Add => S::add(&ev, a, b),
                BinaryOp::Sub => S::sub(&ev, a, b),
                BinaryOp::Mul => S::mul(&ev, a, b),
                BinaryOp::Div => {
                    ev.keys().map_err(|e| e.at(node))?;
                    S::div(&ev, a, b)
                }
            },
            (SchemeValue::Cipher(a), SchemeValue::Plain(b)) => match op {
                BinaryOp::Add => S::add_plain(&ev, a, b),
                BinaryOp::Sub => S::sub_plain(&ev, a, b),
                BinaryOp::Mul => S::mul_plain(&ev, a, b),
                BinaryOp::Div => {
                    if S::plain_has_zero(b) {
                        return Err(ExecError::DivisionByZero { node });
                    }
                    ev.keys().map_err(|e| e.at(node))?;
                    S::div_plain(&ev, a, b)
                }
            },
            (SchemeValue::Plain(a), SchemeValue::Cipher(b)) => match op {
                BinaryOp::Add | BinaryOp::Mul => return self.binary(node, op, rhs, lhs),
                BinaryOp::Sub => S::plain_sub(&ev, a, b),
                BinaryOp::Div => {
                    ev.keys().map_err(|e| e.at(node))?;
                    S::plain_div(&ev, a, b)
                }
            },
            (SchemeValue::Plain(_), SchemeValue::Plain(_)) => {
                return Err(ExecError::arithmetic(
                    node,
                    format!("{op} of two plaintexts; plaintext arithmetic belongs before encoding"),
                ));
            }
            (SchemeValue::Raw(_), SchemeValue::Plain(_) | SchemeValue::Cipher(_))
            | (SchemeValue::Plain(_) | SchemeValue::Cipher(_), SchemeValue::Raw(_)) => {
                return Err(ExecError::arithmetic(
                    node,
                    format!(
                        "{op} of {} and {}; raw operands must be encoded first",
                        lhs.data_type(),
                        rhs.data_type()
                    ),
                ));
            }
        };
        cipher.map(SchemeValue::Cipher).map_err(|e| e.at(node))
    }

    fn negate(&self, node: NodeId, value: &SchemeValue<S>) -> Result<SchemeValue<S>, ExecError> {
        match value {
            SchemeValue::Cipher(cipher) => S::negate(&self.evaluator(), cipher)
                .map(SchemeValue::Cipher)
                .map_err(|e| e.at(node)),
            SchemeValue::Plain(_) => Err(ExecError::arithmetic(node, "negation of a plaintext")),
            SchemeValue::Raw(values) => {
                let negated: Vec<S::Scalar> = values.iter().map(|v| v.raw_neg()).collect();
                Ok(SchemeValue::Raw(S::reduce_raw(self.public.context(), &negated)))
            }
        }
    }

    fn rotate(
        &self,
        node: NodeId,
        value: &SchemeValue<S>,
        steps: u32,
        left: bool,
    ) -> Result<SchemeValue<S>, ExecError> {
        let step = S::rotation_step(steps, self.graph.vec_width(), left);
        let context = self.public.context();
        match value {
            SchemeValue::Cipher(cipher) => {
                if S::KIND.capabilities().rotation_keys
                    && self.graph.vec_width() as usize > context.row_size()
                {
                    return Err(ExecError::config(format!(
                        "rotation at node {node} spans more than one row of {} slots",
                        context.row_size()
                    )));
                }
                S::rotate(&self.evaluator(), cipher, step)
                    .map(SchemeValue::Cipher)
                    .map_err(|e| e.at(node))
            }
            SchemeValue::Plain(_) => Err(ExecError::arithmetic(node, "rotation of a plaintext")),
            SchemeValue::Raw(values) => Ok(SchemeValue::Raw(S::rotate_raw(context, values, step))),
        }
    }
}

impl<'a, S: Scheme> Executor<S> for SchemeExecutor<'a, S> {
    fn set_inputs(&mut self, inputs: &SchemeValuation<S>) -> Result<(), ExecError> {
        for (name, value) in inputs.iter() {
            let node = self.graph.input_node(name).ok_or_else(|| {
                ExecError::config(format!(
                    "graph '{}' has no input named '{name}'",
                    self.graph.name()
                ))
            })?;
            if let SchemeValue::Cipher(cipher) = value {
                let found = S::key_id(cipher);
                if found != self.public.key_id() {
                    return Err(ExecError::config(format!(
                        "input '{name}' was encrypted under key {found:016x}, not {:016x}",
                        self.public.key_id()
                    )));
                }
            }
            self.values.insert(node, value.clone());
        }
        Ok(())
    }

    fn visit(&mut self, node: NodeId) -> Result<(), ExecError> {
        let graph = self.graph;
        let op = graph.op(node)?;
        let operands = graph.operands(node);
        trace!(node = %node, op = %op, "visit");

        let value = match op {
            Op::Input { name, .. } => {
                if self.values.contains_key(&node) {
                    return Ok(());
                }
                return Err(ExecError::config(format!("input '{name}' has no value")));
            }
            Op::Output { .. } => self.value(operands[0])?.clone(),
            Op::Constant { value } => self.constant(node, value)?,
            Op::Encode { scale_bits, level } => {
                self.encode(node, operands[0], *scale_bits, *level)?
            }
            Op::Binary { op } => {
                let lhs = self.value(operands[0])?;
                let rhs = self.value(operands[1])?;
                self.binary(node, *op, lhs, rhs)?
            }
            Op::Negate => self.negate(node, self.value(operands[0])?)?,
            Op::RotateLeft { steps } => self.rotate(node, self.value(operands[0])?, *steps, true)?,
            Op::RotateRight { steps } => {
                self.rotate(node, self.value(operands[0])?, *steps, false)?
            }
            Op::Macro { .. } => {
                return Err(ExecError::UnsupportedOperation {
                    node,
                    op: op.name(),
                    scheme: S::KIND,
                });
            }
        };
        self.values.insert(node, value);
        Ok(())
    }

    fn get_outputs(&self, outputs: &mut SchemeValuation<S>) -> Result<(), ExecError> {
        for (name, node) in self.graph.outputs() {
            let value = self.values.get(node).ok_or_else(|| {
                ExecError::null_context(format!("output '{name}' was never produced"))
            })?;
            if let SchemeValue::Cipher(cipher) = value {
                if !S::is_live(cipher) {
                    return Err(ExecError::null_context(format!(
                        "output '{name}' refers to a released native value"
                    )));
                }
            }
            outputs.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn free(&mut self, node: NodeId) {
        self.values.remove(&node);
    }
}

/// Visits every node of `graph` in forward order, freeing each value after
/// its last use, and collects the outputs.
pub fn run<S: Scheme, E: Executor<S>>(
    executor: &mut E,
    graph: &Graph,
) -> Result<SchemeValuation<S>, ExecError> {
    let order = forward_order(graph)?;
    let mut remaining = use_counts(graph);
    let outputs: HashSet<NodeId> = graph.outputs().values().copied().collect();

    for node in &order {
        executor.visit(*node)?;
        for operand in graph.operands(*node) {
            if let Some(count) = remaining.get_mut(&operand) {
                *count = count.saturating_sub(1);
                if *count == 0 && !outputs.contains(&operand) {
                    executor.free(operand);
                }
            }
        }
    }

    let mut result = SchemeValuation::new();
    executor.get_outputs(&mut result)?;
    debug!(graph = graph.name(), nodes = order.len(), outputs = result.len(), "executed graph");
    Ok(result)
}

/// Repeats `values` to fill `len` slots; the length must divide `len`.
pub(crate) fn replicate<T: Copy>(values: &[T], len: usize) -> Result<Vec<T>, ExecError> {
    if values.is_empty() || len % values.len() != 0 {
        return Err(ExecError::config(format!(
            "a vector of length {} does not divide {len} slots",
            values.len()
        )));
    }
    Ok(values.iter().copied().cycle().take(len).collect())
}

fn raw_binary<S: Scheme>(
    node: NodeId,
    op: BinaryOp,
    lhs: &[S::Scalar],
    rhs: &[S::Scalar],
) -> Result<Vec<S::Scalar>, ExecError> {
    if lhs.len() != rhs.len() {
        return Err(ExecError::arithmetic(
            node,
            format!("raw operands have {} and {} slots", lhs.len(), rhs.len()),
        ));
    }
    if op == BinaryOp::Div && rhs.iter().any(|v| v.is_zero()) {
        return Err(ExecError::DivisionByZero { node });
    }
    Ok(lhs
        .iter()
        .zip(rhs)
        .map(|(a, b)| match op {
            BinaryOp::Add => a.raw_add(*b),
            BinaryOp::Sub => a.raw_sub(*b),
            BinaryOp::Mul => a.raw_mul(*b),
            BinaryOp::Div => a.raw_div(*b),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SchemeContext;
    use crate::keys::generate;
    use crate::params::EncryptionParameters;
    use crate::scheme::{Bfv, Bitwise, Ckks};
    use fhegraph_check::KeyRequirements;
    use fhegraph_core::ops::MacroOp;
    use fhegraph_core::types::DataType;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::sync::Arc;

    fn bfv_public() -> Public<Bfv> {
        let context = Arc::new(SchemeContext::derive(&EncryptionParameters::bfv(4096, 786_433)).unwrap());
        let requirements = KeyRequirements {
            needs_relin: true,
            ..KeyRequirements::default()
        };
        generate::<Bfv>(context, &requirements, &mut ChaCha20Rng::seed_from_u64(8))
            .unwrap()
            .0
    }

    #[test]
    fn raw_graphs_run_in_the_clear() {
        let public = bfv_public();
        let mut graph = Graph::new("raw", 4).unwrap();
        let a = graph.constant(ConstValue::Int(vec![1, 2])).unwrap();
        let b = graph.constant(ConstValue::Int(vec![3])).unwrap();
        let sum = graph.add(a, b).unwrap();
        let rot = graph.rotate_left(sum, 1).unwrap();
        graph.declare_output("out", rot).unwrap();

        let mut executor = SchemeExecutor::new(&graph, &public).unwrap();
        let outputs = run(&mut executor, &graph).unwrap();
        match outputs.get("out") {
            Some(SchemeValue::Raw(values)) => assert_eq!(values, &vec![5, 4, 5, 4]),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn values_are_freed_after_their_last_use() {
        let public = bfv_public();
        let mut graph = Graph::new("chain", 4).unwrap();
        let a = graph.constant(ConstValue::Int(vec![1])).unwrap();
        let b = graph.negate(a).unwrap();
        let c = graph.negate(b).unwrap();
        graph.declare_output("out", c).unwrap();

        let mut executor = SchemeExecutor::new(&graph, &public).unwrap();
        run(&mut executor, &graph).unwrap();
        // Only the output node's value survives.
        assert_eq!(executor.live_values(), 1);
    }

    #[test]
    fn raw_division_by_zero_is_caught() {
        let public = bfv_public();
        let mut graph = Graph::new("div", 2).unwrap();
        let a = graph.constant(ConstValue::Int(vec![4])).unwrap();
        let z = graph.constant(ConstValue::Int(vec![1, 0])).unwrap();
        let q = graph.div(a, z).unwrap();
        graph.declare_output("q", q).unwrap();

        let mut executor = SchemeExecutor::new(&graph, &public).unwrap();
        assert!(matches!(
            run(&mut executor, &graph),
            Err(ExecError::DivisionByZero { node }) if node == q
        ));
    }

    #[test]
    fn narrow_bytes_are_reduced_before_raw_division() {
        let context = Arc::new(SchemeContext::derive(&EncryptionParameters::bitwise(4)).unwrap());
        let (public, _) = generate::<Bitwise>(
            context,
            &KeyRequirements::default(),
            &mut ChaCha20Rng::seed_from_u64(9),
        )
        .unwrap();

        let quotient = |lhs: u8, rhs: u8| {
            let mut graph = Graph::new("narrow", 1).unwrap();
            let a = graph.constant(ConstValue::Byte(lhs)).unwrap();
            let b = graph.constant(ConstValue::Byte(rhs)).unwrap();
            let q = graph.div(a, b).unwrap();
            graph.declare_output("q", q).unwrap();
            let mut executor = SchemeExecutor::new(&graph, &public).unwrap();
            run(&mut executor, &graph).map(|outputs| match outputs.get("q") {
                Some(SchemeValue::Raw(values)) => values.clone(),
                other => panic!("unexpected output {other:?}"),
            })
        };

        // 200 is 8 in four bits.
        assert_eq!(quotient(200, 7).unwrap(), vec![1]);
        assert_eq!(quotient(200, 3).unwrap(), vec![2]);
        // 16 is 0 in four bits.
        assert!(matches!(quotient(9, 16), Err(ExecError::DivisionByZero { .. })));
    }

    #[test]
    fn macro_ops_are_unsupported_at_runtime() {
        let public = bfv_public();
        let mut graph = Graph::new("m", 4).unwrap();
        let x = graph.declare_input("x", DataType::Raw).unwrap();
        let c = graph.macro_op(MacroOp::CountIf, &[x]).unwrap();
        graph.declare_output("c", c).unwrap();

        let mut inputs = SchemeValuation::new();
        inputs.insert("x", SchemeValue::Raw(vec![1, 2, 3, 4]));
        let mut executor = SchemeExecutor::new(&graph, &public).unwrap();
        executor.set_inputs(&inputs).unwrap();
        assert!(matches!(
            run(&mut executor, &graph),
            Err(ExecError::UnsupportedOperation { op, .. }) if op == "countif"
        ));
    }

    #[test]
    fn unknown_and_unbound_inputs_are_configuration_errors() {
        let public = bfv_public();
        let mut graph = Graph::new("g", 4).unwrap();
        let x = graph.declare_input("x", DataType::Raw).unwrap();
        graph.declare_output("y", x).unwrap();

        let mut executor = SchemeExecutor::new(&graph, &public).unwrap();
        let mut stray = SchemeValuation::new();
        stray.insert("nope", SchemeValue::Raw(vec![0; 4]));
        assert!(matches!(
            executor.set_inputs(&stray),
            Err(ExecError::Configuration { .. })
        ));
        assert!(matches!(
            run(&mut executor, &graph),
            Err(ExecError::Configuration { .. })
        ));
    }

    #[test]
    fn widths_must_divide_the_slot_count() {
        let context = Arc::new(
            SchemeContext::derive(&EncryptionParameters::ckks(2048, vec![27, 27])).unwrap(),
        );
        let (public, _) = generate::<Ckks>(
            context,
            &KeyRequirements::default(),
            &mut ChaCha20Rng::seed_from_u64(1),
        )
        .unwrap();
        let graph = Graph::new("wide", 3).unwrap();
        assert!(matches!(
            SchemeExecutor::new(&graph, &public),
            Err(ExecError::Configuration { .. })
        ));
    }

    #[test]
    fn replication_requires_a_divisor() {
        assert_eq!(replicate(&[1, 2], 6).unwrap(), vec![1, 2, 1, 2, 1, 2]);
        assert!(replicate(&[1, 2, 3], 8).is_err());
        assert!(replicate::<u8>(&[], 8).is_err());
    }
}
