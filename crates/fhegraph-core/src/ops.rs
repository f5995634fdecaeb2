//! Op vocabulary of the graph IR.
//!
//! [`Op`] is a closed enum: adding a variant is a compile-time break in every
//! exhaustive match across type inference, lowering, analysis and the
//! executors.
//!
//! # Primitive vs. macro ops
//!
//! Backends execute only primitives. The comparison and aggregate operations
//! in [`MacroOp`] are produced by the embedding layer and must be expanded into
//! primitives before a graph is compiled; lowering rejects them otherwise.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ConstValue, DataType};

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Native only where the scheme provides it (approximate for packed real
    /// numbers, exact for the bitwise scheme).
    Div,
}

impl BinaryOp {
    pub fn is_commutative(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Mul)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        };
        f.write_str(name)
    }
}

/// Comparison and aggregate operations expanded by the embedding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MacroOp {
    Equality,
    Greater,
    Less,
    /// Sum of `values` where `mask` is set: `(values, mask)`.
    SumIf,
    /// Number of set slots in `mask`.
    CountIf,
    /// Row select: `(condition, then, else)`.
    Select,
}

impl MacroOp {
    pub fn arity(self) -> usize {
        match self {
            MacroOp::Equality | MacroOp::Greater | MacroOp::Less | MacroOp::SumIf => 2,
            MacroOp::CountIf => 1,
            MacroOp::Select => 3,
        }
    }
}

/// A graph operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Named graph input with its declared classification.
    Input { name: String, ty: DataType },
    /// Named graph output; its single operand is the produced value.
    Output { name: String },
    Constant { value: ConstValue },
    Binary { op: BinaryOp },
    Negate,
    /// Cyclic slot rotation towards lower indices: slot `i` receives slot
    /// `i + steps`.
    RotateLeft { steps: u32 },
    /// Cyclic slot rotation towards higher indices.
    RotateRight { steps: u32 },
    /// Encodes a raw operand into the scheme's plaintext representation.
    Encode { scale_bits: u32, level: u32 },
    Macro { op: MacroOp },
}

impl Op {
    /// Number of operands this op takes.
    pub fn arity(&self) -> usize {
        match self {
            Op::Input { .. } | Op::Constant { .. } => 0,
            Op::Output { .. }
            | Op::Negate
            | Op::RotateLeft { .. }
            | Op::RotateRight { .. }
            | Op::Encode { .. } => 1,
            Op::Binary { .. } => 2,
            Op::Macro { op } => op.arity(),
        }
    }

    /// Short lowercase name used in diagnostics.
    pub fn name(&self) -> String {
        match self {
            Op::Input { .. } => "input".into(),
            Op::Output { .. } => "output".into(),
            Op::Constant { .. } => "constant".into(),
            Op::Binary { op } => op.to_string(),
            Op::Negate => "negate".into(),
            Op::RotateLeft { .. } => "rotate_left".into(),
            Op::RotateRight { .. } => "rotate_right".into(),
            Op::Encode { .. } => "encode".into(),
            Op::Macro { op } => format!("{:?}", op).to_lowercase(),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
