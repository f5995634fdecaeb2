//! Value classification lattice and constant payloads.
//!
//! Every graph value is classified as [`DataType::Raw`] (caller-facing,
//! unencoded), [`DataType::Plain`] (scheme-native plaintext encoding) or
//! [`DataType::Cipher`] (encrypted). The classifications form the chain
//! `Raw < Plain < Cipher`; the type of a derived value is the join (maximum)
//! of its operands' types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a graph value.
///
/// The derived `Ord` follows declaration order, which is the lattice order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataType {
    Raw,
    Plain,
    Cipher,
}

impl DataType {
    /// Least upper bound of two classifications.
    pub fn join(self, other: DataType) -> DataType {
        self.max(other)
    }

    pub fn is_cipher(self) -> bool {
        self == DataType::Cipher
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Raw => "raw",
            DataType::Plain => "plain",
            DataType::Cipher => "cipher",
        };
        f.write_str(name)
    }
}

/// Literal payload of a `Constant` node.
///
/// Vectors shorter than the graph's vector width are replicated to fill it,
/// so their length must divide the width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Float(Vec<f64>),
    Int(Vec<i64>),
    /// A single raw byte, used by the bitwise scheme.
    Byte(u8),
}

impl ConstValue {
    pub fn len(&self) -> usize {
        match self {
            ConstValue::Float(values) => values.len(),
            ConstValue::Int(values) => values.len(),
            ConstValue::Byte(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if any element is zero.
    pub fn contains_zero(&self) -> bool {
        match self {
            ConstValue::Float(values) => values.iter().any(|v| *v == 0.0),
            ConstValue::Int(values) => values.iter().any(|v| *v == 0),
            ConstValue::Byte(value) => *value == 0,
        }
    }
}
