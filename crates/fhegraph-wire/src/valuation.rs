//! Valuation blobs: named ciphertexts, plaintexts and raw values.
//!
//! Every entry carries a [`ValueTag`] naming its classification. Tags are
//! kept as text on the wire so that an unrecognised tag is reported as
//! [`WireError::UnknownTag`] rather than a generic parse failure.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fhegraph_core::signature::Signature;
use fhegraph_core::types::DataType;
use fhegraph_core::valuation::PlainValue;
use fhegraph_exec::{ExecError, RawScalar, Scheme, SchemeContext, SchemeValuation, SchemeValue};

use crate::envelope::{self, BlobKind};
use crate::error::WireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTag {
    Ciphertext,
    Plaintext,
    Raw,
}

impl ValueTag {
    pub fn of(ty: DataType) -> Self {
        match ty {
            DataType::Cipher => ValueTag::Ciphertext,
            DataType::Plain => ValueTag::Plaintext,
            DataType::Raw => ValueTag::Raw,
        }
    }

    pub fn data_type(self) -> DataType {
        match self {
            ValueTag::Ciphertext => DataType::Cipher,
            ValueTag::Plaintext => DataType::Plain,
            ValueTag::Raw => DataType::Raw,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueTag::Ciphertext => "ciphertext",
            ValueTag::Plaintext => "plaintext",
            ValueTag::Raw => "raw",
        }
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ciphertext" => Ok(ValueTag::Ciphertext),
            "plaintext" => Ok(ValueTag::Plaintext),
            "raw" => Ok(ValueTag::Raw),
            other => Err(other.to_string()),
        }
    }
}

/// The classifications a decoded valuation must match.
#[derive(Debug, Clone, Copy)]
pub enum Expected<'a> {
    /// Accept any tag.
    Any,
    /// Check against the signature's inputs.
    Inputs(&'a Signature),
    /// Check against the signature's outputs.
    Outputs(&'a Signature),
}

impl Expected<'_> {
    fn data_type(&self, name: &str) -> Option<DataType> {
        match self {
            Expected::Any => None,
            Expected::Inputs(signature) => signature.input(name).map(|info| info.ty),
            Expected::Outputs(signature) => signature.output(name),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEntry {
    tag: String,
    data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ValuationPayload {
    entries: IndexMap<String, WireEntry>,
}

/// Serializes every entry of `values` into a valuation blob.
pub fn encode_valuation<S: Scheme>(values: &SchemeValuation<S>) -> Result<Vec<u8>, WireError> {
    let mut entries = IndexMap::new();
    for (name, value) in values.iter() {
        let data = match value {
            SchemeValue::Cipher(cipher) => {
                S::ciphertext_to_bytes(cipher).map_err(ExecError::from)?
            }
            SchemeValue::Plain(plain) => {
                S::plaintext_to_bytes(plain).map_err(ExecError::from)?
            }
            SchemeValue::Raw(slots) => {
                let scalars: Vec<PlainValue> = slots
                    .iter()
                    .map(|slot| S::Scalar::into_plain(vec![*slot]))
                    .collect();
                serde_json::to_vec(&scalars)?
            }
        };
        entries.insert(
            name.clone(),
            WireEntry {
                tag: ValueTag::of(value.data_type()).as_str().to_string(),
                data,
            },
        );
    }
    envelope::seal(BlobKind::Valuation, S::KIND, &ValuationPayload { entries })
}

/// Reads a valuation blob against `context`, checking tags against
/// `expected`.
///
/// Names `expected` does not mention are accepted as they are, so partial
/// valuations from several parties can be decoded separately and merged.
pub fn decode_valuation<S: Scheme>(
    bytes: &[u8],
    context: &SchemeContext,
    expected: Expected<'_>,
) -> Result<SchemeValuation<S>, WireError> {
    let payload: ValuationPayload = envelope::open(bytes, BlobKind::Valuation, S::KIND)?;
    let mut values = SchemeValuation::new();
    for (name, entry) in payload.entries {
        let tag = ValueTag::from_str(&entry.tag).map_err(|tag| WireError::UnknownTag {
            name: name.clone(),
            tag,
        })?;
        if let Some(ty) = expected.data_type(&name) {
            if ty != tag.data_type() {
                return Err(WireError::TagMismatch {
                    name,
                    expected: ty,
                    found: tag.data_type(),
                });
            }
        }
        let value = match tag {
            ValueTag::Ciphertext => SchemeValue::Cipher(
                S::ciphertext_from_bytes(context, &entry.data).map_err(ExecError::from)?,
            ),
            ValueTag::Plaintext => SchemeValue::Plain(
                S::plaintext_from_bytes(context, &entry.data).map_err(ExecError::from)?,
            ),
            ValueTag::Raw => {
                let scalars: Vec<PlainValue> = serde_json::from_slice(&entry.data)?;
                let mut slots = Vec::with_capacity(scalars.len());
                for scalar in &scalars {
                    let decoded = S::Scalar::from_plain(scalar).map_err(|reason| {
                        ExecError::Serialization {
                            reason: format!("raw value '{name}': {reason}"),
                        }
                    })?;
                    slots.extend(decoded);
                }
                SchemeValue::Raw(slots)
            }
        };
        values.insert(name, value);
    }
    debug!(scheme = %S::KIND, values = values.len(), "decoded valuation");
    Ok(values)
}
