//! Backend lowering: rewrites a typed graph into the primitive set a scheme
//! family evaluates natively.
//!
//! Lowering runs once, after type inference and before key generation. It
//! visits nodes in dependency order and asks each rule for an optional
//! replacement node; a replacement is installed with
//! [`Graph::replace_all_uses_with`], so existing operand lists are never
//! edited and declared inputs/outputs are preserved.
//!
//! # Canonical operand order
//!
//! Executors expect the ciphertext operand of a mixed binary op on the left.
//! A binary op with a non-cipher left operand and a cipher right operand is
//! fixed up here:
//! - `Add`, `Mul`: commuted.
//! - `Sub`: kept where the scheme has a native `plain - cipher`, otherwise
//!   rewritten as `Add(Negate(c), p)`.
//! - `Div`: kept where the scheme divides a plaintext by a ciphertext,
//!   otherwise rejected.
//!
//! Raw operands of cipher ops are wrapped in an `Encode` node first.
//! Constants the scheme's slots cannot hold, such as reals under the
//! bitwise scheme, are rejected here rather than at evaluation.

use fhegraph_core::graph::Graph;
use fhegraph_core::id::NodeId;
use fhegraph_core::ops::{BinaryOp, Op};
use fhegraph_core::scheme::{Capabilities, SchemeKind};
use fhegraph_core::types::{ConstValue, DataType};
use tracing::debug;

use crate::error::CompileError;
use crate::traversal::forward_order;
use crate::typecheck::TypeMap;

/// Parameters of inserted `Encode` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoweringOptions {
    pub scheme: SchemeKind,
    pub scale_bits: u32,
}

/// What a lowering run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoweringReport {
    pub encodes_inserted: usize,
    pub commuted: usize,
    pub subs_rewritten: usize,
}

impl LoweringReport {
    pub fn is_unchanged(&self) -> bool {
        *self == LoweringReport::default()
    }
}

/// Lowers `graph` in place for `options.scheme`.
///
/// `types` must hold the inferred type of every node; types of inserted
/// nodes are added as they are created.
pub fn lower(
    graph: &mut Graph,
    types: &mut TypeMap,
    options: &LoweringOptions,
) -> Result<LoweringReport, CompileError> {
    let mut pass = Lowering {
        graph,
        types,
        options: *options,
        caps: options.scheme.capabilities(),
        report: LoweringReport::default(),
    };

    for id in forward_order(pass.graph)? {
        if let Some(replacement) = pass.rewrite(id)? {
            pass.graph.replace_all_uses_with(id, replacement)?;
        }
    }

    debug!(
        graph = pass.graph.name(),
        scheme = %options.scheme,
        encodes = pass.report.encodes_inserted,
        commuted = pass.report.commuted,
        subs = pass.report.subs_rewritten,
        "lowered graph"
    );
    Ok(pass.report)
}

struct Lowering<'a> {
    graph: &'a mut Graph,
    types: &'a mut TypeMap,
    options: LoweringOptions,
    caps: Capabilities,
    report: LoweringReport,
}

impl Lowering<'_> {
    fn rewrite(&mut self, id: NodeId) -> Result<Option<NodeId>, CompileError> {
        let op = self.graph.op(id)?.clone();
        match &op {
            Op::Macro { .. } => Err(self.unsupported(id, &op)),
            Op::Binary { op: binary } => self.rewrite_binary(id, *binary),
            Op::RotateLeft { .. } | Op::RotateRight { .. } => {
                let operand_is_raw = self.types.of(id)? == DataType::Raw;
                if !self.caps.rotation && !operand_is_raw {
                    return Err(self.unsupported(id, &op));
                }
                Ok(None)
            }
            Op::Constant { value } => {
                if !representable(self.options.scheme, value) {
                    return Err(self.unsupported(id, &op));
                }
                Ok(None)
            }
            Op::Input { .. } | Op::Output { .. } | Op::Negate | Op::Encode { .. } => Ok(None),
        }
    }

    fn rewrite_binary(&mut self, id: NodeId, op: BinaryOp) -> Result<Option<NodeId>, CompileError> {
        let operands = self.graph.operands(id);
        let (mut lhs, mut rhs) = (operands[0], operands[1]);
        let lhs_ty = self.types.of(lhs)?;
        let rhs_ty = self.types.of(rhs)?;

        if op == BinaryOp::Div && !self.caps.division && (lhs_ty.is_cipher() || rhs_ty.is_cipher()) {
            return Err(self.unsupported(id, &Op::Binary { op }));
        }
        // Raw and plain arithmetic is evaluated by the caller's side.
        if !lhs_ty.is_cipher() && !rhs_ty.is_cipher() {
            return Ok(None);
        }

        let mut changed = false;
        if lhs_ty == DataType::Raw {
            lhs = self.encode(lhs)?;
            changed = true;
        }
        if rhs_ty == DataType::Raw {
            rhs = self.encode(rhs)?;
            changed = true;
        }

        if lhs_ty.is_cipher() {
            return match changed {
                true => self.emit_binary(op, lhs, rhs).map(Some),
                false => Ok(None),
            };
        }

        // Non-cipher left operand, cipher right operand.
        match op {
            BinaryOp::Add | BinaryOp::Mul => {
                self.report.commuted += 1;
                self.emit_binary(op, rhs, lhs).map(Some)
            }
            BinaryOp::Sub if self.caps.plain_sub => match changed {
                true => self.emit_binary(op, lhs, rhs).map(Some),
                false => Ok(None),
            },
            BinaryOp::Sub => {
                let negated = self.emit(Op::Negate, &[rhs], DataType::Cipher)?;
                self.report.subs_rewritten += 1;
                self.emit_binary(BinaryOp::Add, negated, lhs).map(Some)
            }
            BinaryOp::Div if self.caps.plain_cipher_division => match changed {
                true => self.emit_binary(op, lhs, rhs).map(Some),
                false => Ok(None),
            },
            BinaryOp::Div => Err(self.unsupported(id, &Op::Binary { op })),
        }
    }

    fn encode(&mut self, raw: NodeId) -> Result<NodeId, CompileError> {
        self.report.encodes_inserted += 1;
        let op = Op::Encode {
            scale_bits: self.options.scale_bits,
            level: 0,
        };
        self.emit(op, &[raw], DataType::Plain)
    }

    fn emit_binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> Result<NodeId, CompileError> {
        self.emit(Op::Binary { op }, &[lhs, rhs], DataType::Cipher)
    }

    fn emit(&mut self, op: Op, operands: &[NodeId], ty: DataType) -> Result<NodeId, CompileError> {
        let id = self.graph.make_node(op, operands)?;
        self.types.insert(id, ty);
        Ok(id)
    }

    fn unsupported(&self, node: NodeId, op: &Op) -> CompileError {
        CompileError::UnsupportedOperation {
            node,
            op: op.name(),
            scheme: self.options.scheme,
        }
    }
}

/// Whether every value of `value` fits the slots of `scheme`.
fn representable(scheme: SchemeKind, value: &ConstValue) -> bool {
    match (scheme, value) {
        (SchemeKind::Ckks, _) | (_, ConstValue::Byte(_)) => true,
        (SchemeKind::Bfv, ConstValue::Int(_)) => true,
        (SchemeKind::Bfv, ConstValue::Float(values)) => values
            .iter()
            .all(|v| v.is_finite() && v.fract() == 0.0),
        (SchemeKind::Bitwise, ConstValue::Int(values)) => {
            values.iter().all(|v| u8::try_from(*v).is_ok())
        }
        (SchemeKind::Bitwise, ConstValue::Float(_)) => false,
    }
}
