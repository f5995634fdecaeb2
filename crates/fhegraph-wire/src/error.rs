//! Error types for fhegraph-wire.
//!
//! [`WireError`] covers malformed or tampered blobs, blobs of the wrong kind
//! or scheme, and bundles missing the section an operation needs. Failures
//! raised while rebuilding graphs or key material pass through from the
//! lower layers.

use fhegraph_core::error::CoreError;
use fhegraph_core::scheme::SchemeKind;
use fhegraph_core::types::DataType;
use fhegraph_exec::ExecError;
use thiserror::Error;

use crate::envelope::BlobKind;

/// Errors produced while writing or reading blobs.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The payload does not hash to the digest recorded beside it.
    #[error("digest mismatch: envelope records {expected}, payload hashes to {found}")]
    DigestMismatch { expected: String, found: String },

    #[error("unsupported blob format '{found}', expected '{expected}'")]
    FormatMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("expected a {expected} blob, found a {found} blob")]
    KindMismatch { expected: BlobKind, found: BlobKind },

    #[error("blob was written for the {found} scheme, not {expected}")]
    SchemeMismatch {
        expected: SchemeKind,
        found: SchemeKind,
    },

    /// A valuation entry carries a tag no [`ValueTag`](crate::ValueTag) names.
    #[error("value '{name}' has unknown tag '{tag}'")]
    UnknownTag { name: String, tag: String },

    #[error("value '{name}' is tagged {found}, expected {expected}")]
    TagMismatch {
        name: String,
        expected: DataType,
        found: DataType,
    },

    /// A capability flag selected material the caller did not supply.
    #[error("bundle section '{section}' was requested but not supplied")]
    MissingSection { section: &'static str },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl WireError {
    /// Whether the blob itself was unreadable, tampered with or mislabelled.
    pub fn is_serialization(&self) -> bool {
        matches!(
            self,
            WireError::Serialization(_)
                | WireError::DigestMismatch { .. }
                | WireError::FormatMismatch { .. }
                | WireError::KindMismatch { .. }
                | WireError::SchemeMismatch { .. }
                | WireError::UnknownTag { .. }
                | WireError::TagMismatch { .. }
                | WireError::Exec(ExecError::Serialization { .. })
        )
    }

    /// Whether a bundle lacked the key material an operation needs.
    pub fn is_null_context(&self) -> bool {
        matches!(self, WireError::Exec(ExecError::NullContext { .. }))
    }

    pub(crate) fn absent(what: impl Into<String>) -> Self {
        WireError::Exec(ExecError::NullContext { what: what.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let tampered = WireError::DigestMismatch {
            expected: "aa".into(),
            found: "bb".into(),
        };
        assert!(tampered.is_serialization());
        assert!(!tampered.is_null_context());

        let absent = WireError::absent("secret key");
        assert!(absent.is_null_context());
        assert!(!absent.is_serialization());
        assert_eq!(absent.to_string(), "missing context: secret key");
    }
}
