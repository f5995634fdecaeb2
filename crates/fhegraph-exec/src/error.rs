//! Error types for key generation, encryption and execution.
//!
//! Primitives report [`EvalError`] without knowing which node they were
//! called for; the executor attaches the node with [`EvalError::at`].

use fhegraph_check::CompileError;
use fhegraph_core::error::CoreError;
use fhegraph_core::id::NodeId;
use fhegraph_core::scheme::SchemeKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    /// Parameters, widths, names or key pairs do not fit together.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// Key material or a native value the operation needs is absent.
    #[error("missing context: {what}")]
    NullContext { what: String },

    #[error("arithmetic error at node {node}: {reason}")]
    Arithmetic { node: NodeId, reason: String },

    #[error("division by zero at node {node}")]
    DivisionByZero { node: NodeId },

    /// Ciphertext or plaintext bytes could not be read or written.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    #[error("{op} at node {node} is not supported by the {scheme} backend")]
    UnsupportedOperation {
        node: NodeId,
        op: String,
        scheme: SchemeKind,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ExecError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        ExecError::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn null_context(what: impl Into<String>) -> Self {
        ExecError::NullContext { what: what.into() }
    }

    pub(crate) fn arithmetic(node: NodeId, reason: impl Into<String>) -> Self {
        ExecError::Arithmetic {
            node,
            reason: reason.into(),
        }
    }

    /// Both arithmetic variants: a failed or undefined computation.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            ExecError::Arithmetic { .. } | ExecError::DivisionByZero { .. }
        )
    }
}

/// Failure inside a scheme primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("the modulus chain is exhausted")]
    LevelExhausted,

    #[error("division by zero")]
    DivisionByZero,

    #[error("no evaluation keys")]
    MissingEvaluationKeys,

    #[error("no relinearization key")]
    MissingRelinKey,

    #[error("no rotation key for step {step}")]
    MissingRotationKey { step: i32 },

    #[error("native value {handle} has been released")]
    Released { handle: u64 },

    #[error("value belongs to key {found:016x}, expected {expected:016x}")]
    KeyMismatch { expected: u64, found: u64 },

    #[error("{reason}")]
    Invalid { reason: String },

    #[error("malformed value: {reason}")]
    Malformed { reason: String },

    #[error("{what} is not supported by this scheme")]
    Unsupported { what: &'static str },
}

impl EvalError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        EvalError::Invalid {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(reason: impl ToString) -> Self {
        EvalError::Malformed {
            reason: reason.to_string(),
        }
    }

    /// Attaches the node the primitive was evaluating.
    pub fn at(self, node: NodeId) -> ExecError {
        match self {
            EvalError::DivisionByZero => ExecError::DivisionByZero { node },
            EvalError::LevelExhausted | EvalError::Invalid { .. } | EvalError::Unsupported { .. } => {
                ExecError::arithmetic(node, self.to_string())
            }
            EvalError::MissingEvaluationKeys
            | EvalError::MissingRelinKey
            | EvalError::MissingRotationKey { .. }
            | EvalError::Released { .. } => {
                ExecError::null_context(format!("{self} (node {node})"))
            }
            EvalError::KeyMismatch { .. } => ExecError::config(format!("{self} (node {node})")),
            EvalError::Malformed { reason } => ExecError::Serialization { reason },
        }
    }
}

impl From<EvalError> for ExecError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::MissingEvaluationKeys
            | EvalError::MissingRelinKey
            | EvalError::MissingRotationKey { .. }
            | EvalError::Released { .. } => ExecError::null_context(err.to_string()),
            EvalError::Malformed { reason } => ExecError::Serialization { reason },
            EvalError::LevelExhausted
            | EvalError::DivisionByZero
            | EvalError::KeyMismatch { .. }
            | EvalError::Invalid { .. }
            | EvalError::Unsupported { .. } => ExecError::config(err.to_string()),
        }
    }
}
