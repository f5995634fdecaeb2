//! The outer frame shared by every blob.
//!
//! A blob is a JSON [`Envelope`] whose `payload` is itself JSON text. The
//! envelope records the format version, what the payload is, which scheme
//! wrote it, and a blake3 digest of the payload bytes. Readers check all
//! four before touching the payload.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fhegraph_core::scheme::SchemeKind;

use crate::error::WireError;

/// Format tag written into every envelope.
pub const FORMAT: &str = "fhegraph-wire/1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobKind {
    KeyBundle,
    Valuation,
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobKind::KeyBundle => write!(f, "key bundle"),
            BlobKind::Valuation => write!(f, "valuation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub format: String,
    pub kind: BlobKind,
    pub scheme: SchemeKind,
    /// Hex blake3 digest of `payload`.
    pub digest: String,
    pub payload: String,
}

/// Hex blake3 digest of a payload.
pub fn digest(payload: &str) -> String {
    blake3::hash(payload.as_bytes()).to_hex().to_string()
}

/// Serializes `payload` and frames it.
pub fn seal<T: Serialize>(kind: BlobKind, scheme: SchemeKind, payload: &T) -> Result<Vec<u8>, WireError> {
    let payload = serde_json::to_string(payload)?;
    let envelope = Envelope {
        format: FORMAT.to_string(),
        kind,
        scheme,
        digest: digest(&payload),
        payload,
    };
    let bytes = serde_json::to_vec(&envelope)?;
    debug!(%kind, %scheme, bytes = bytes.len(), "sealed blob");
    Ok(bytes)
}

/// Reads only the envelope, verifying format and digest.
pub fn peek(bytes: &[u8]) -> Result<Envelope, WireError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.format != FORMAT {
        return Err(WireError::FormatMismatch {
            expected: FORMAT,
            found: envelope.format,
        });
    }
    let found = digest(&envelope.payload);
    if found != envelope.digest {
        return Err(WireError::DigestMismatch {
            expected: envelope.digest,
            found,
        });
    }
    Ok(envelope)
}

/// Unframes a blob of `kind` written for `scheme` and parses its payload.
pub fn open<T: DeserializeOwned>(bytes: &[u8], kind: BlobKind, scheme: SchemeKind) -> Result<T, WireError> {
    let envelope = peek(bytes)?;
    if envelope.kind != kind {
        return Err(WireError::KindMismatch {
            expected: kind,
            found: envelope.kind,
        });
    }
    if envelope.scheme != scheme {
        return Err(WireError::SchemeMismatch {
            expected: scheme,
            found: envelope.scheme,
        });
    }
    Ok(serde_json::from_str(&envelope.payload)?)
}
