//! Encoding signature of a compiled graph.
//!
//! A [`Signature`] tells the encrypting party how to turn each named input
//! into the scheme's native representation, and tells the decrypting party
//! what classification each output carries.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::DataType;

/// How one input is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingInfo {
    pub ty: DataType,
    /// log2 of the fixed-point scale; zero for integer schemes.
    pub scale_bits: u32,
    /// Number of modulus levels already consumed at encryption time.
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub vec_width: u32,
    pub inputs: IndexMap<String, EncodingInfo>,
    pub outputs: IndexMap<String, DataType>,
}

impl Signature {
    pub fn new(vec_width: u32) -> Self {
        Signature {
            vec_width,
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn input(&self, name: &str) -> Option<&EncodingInfo> {
        self.inputs.get(name)
    }

    pub fn output(&self, name: &str) -> Option<DataType> {
        self.outputs.get(name).copied()
    }
}
