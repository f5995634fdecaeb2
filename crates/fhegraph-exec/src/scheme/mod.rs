//! The [`Scheme`] trait and its three reference implementations.
//!
//! A scheme supplies native plaintext and ciphertext types plus the
//! primitives the executor dispatches to. Primitives a scheme lacks keep the
//! default body, which reports [`EvalError::Unsupported`]; lowering already
//! rejects graphs that would reach them.
//!
//! The implementations simulate the arithmetic of their families (levels,
//! modular reduction, bit widths, key requirements) over cleartext slots.
//! They provide no confidentiality.

pub mod bfv;
pub mod bitwise;
pub mod ckks;
mod packed;

use std::fmt::Debug;

use rand::RngCore;

use fhegraph_check::analysis;
use fhegraph_core::scheme::SchemeKind;

use crate::context::SchemeContext;
use crate::error::EvalError;
use crate::keys::{EvaluationKeys, SecretKey};
use crate::scalar::RawScalar;

pub use bfv::Bfv;
pub use bitwise::Bitwise;
pub use ckks::Ckks;
pub use packed::{PackedCiphertext, PackedPlaintext};

/// Context and evaluation keys handed to every primitive.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    context: &'a SchemeContext,
    keys: Option<&'a EvaluationKeys>,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a SchemeContext, keys: Option<&'a EvaluationKeys>) -> Self {
        Evaluator { context, keys }
    }

    pub fn context(&self) -> &'a SchemeContext {
        self.context
    }

    pub fn keys(&self) -> Result<&'a EvaluationKeys, EvalError> {
        self.keys.ok_or(EvalError::MissingEvaluationKeys)
    }

    pub fn require_relin(&self) -> Result<(), EvalError> {
        if self.keys()?.relin {
            Ok(())
        } else {
            Err(EvalError::MissingRelinKey)
        }
    }

    /// Rotation by a whole row is the identity and needs no key.
    pub fn require_rotation(&self, step: i32) -> Result<(), EvalError> {
        let row = self.context.row_size() as i64;
        if i64::from(step).rem_euclid(row.max(1)) == 0 {
            return Ok(());
        }
        let element = self
            .context
            .galois_element(step)
            .ok_or(EvalError::MissingRotationKey { step })?;
        if self.keys()?.galois_elements.contains(&element) {
            Ok(())
        } else {
            Err(EvalError::MissingRotationKey { step })
        }
    }
}

pub trait Scheme: Sized + Send + Sync + 'static {
    const KIND: SchemeKind;

    type Scalar: RawScalar;
    type Plaintext: Clone + Debug + Send + Sync;
    type Ciphertext: Clone + Debug + Send + Sync;

    /// Encodes exactly `slot_count` slots at `level` consumed levels.
    fn encode(
        context: &SchemeContext,
        slots: &[Self::Scalar],
        scale_bits: u32,
        level: u32,
    ) -> Result<Self::Plaintext, EvalError>;

    fn decode(
        context: &SchemeContext,
        plain: &Self::Plaintext,
    ) -> Result<Vec<Self::Scalar>, EvalError>;

    fn encrypt(
        context: &SchemeContext,
        key_id: u64,
        plain: &Self::Plaintext,
        rng: &mut dyn RngCore,
    ) -> Result<Self::Ciphertext, EvalError>;

    fn decrypt(
        context: &SchemeContext,
        secret: &SecretKey,
        cipher: &Self::Ciphertext,
    ) -> Result<Self::Plaintext, EvalError>;

    /// Key pair the ciphertext was encrypted under.
    fn key_id(cipher: &Self::Ciphertext) -> u64;

    /// Whether the native value behind `cipher` still exists.
    fn is_live(_cipher: &Self::Ciphertext) -> bool {
        true
    }

    fn plain_has_zero(plain: &Self::Plaintext) -> bool;

    fn add(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError>;

    fn add_plain(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError>;

    fn sub(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError>;

    fn sub_plain(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError>;

    fn plain_sub(
        _ev: &Evaluator<'_>,
        _lhs: &Self::Plaintext,
        _rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        Err(EvalError::Unsupported {
            what: "plain - cipher",
        })
    }

    fn mul(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError>;

    fn mul_plain(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError>;

    fn div(
        _ev: &Evaluator<'_>,
        _lhs: &Self::Ciphertext,
        _rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        Err(EvalError::Unsupported {
            what: "cipher / cipher",
        })
    }

    fn div_plain(
        _ev: &Evaluator<'_>,
        _lhs: &Self::Ciphertext,
        _rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        Err(EvalError::Unsupported {
            what: "cipher / plain",
        })
    }

    fn plain_div(
        _ev: &Evaluator<'_>,
        _lhs: &Self::Plaintext,
        _rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        Err(EvalError::Unsupported {
            what: "plain / cipher",
        })
    }

    fn negate(
        ev: &Evaluator<'_>,
        value: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError>;

    /// Rotates left by `step`; negative steps rotate right.
    fn rotate(
        ev: &Evaluator<'_>,
        value: &Self::Ciphertext,
        step: i32,
    ) -> Result<Self::Ciphertext, EvalError>;

    /// Signed step a `RotateLeft`/`RotateRight` node rotates by.
    fn rotation_step(steps: u32, vec_width: u32, left: bool) -> i32 {
        analysis::rotation_step(steps, vec_width, left)
    }

    /// Rotation of a raw vector of `vec_width` slots.
    fn rotate_raw(
        _context: &SchemeContext,
        values: &[Self::Scalar],
        step: i32,
    ) -> Vec<Self::Scalar> {
        let mut rotated = values.to_vec();
        if !rotated.is_empty() {
            let shift = i64::from(step).rem_euclid(rotated.len() as i64) as usize;
            rotated.rotate_left(shift);
        }
        rotated
    }

    /// Brings raw slots into the plaintext range; raw arithmetic runs on
    /// reduced operands and yields reduced results.
    fn reduce_raw(_context: &SchemeContext, values: &[Self::Scalar]) -> Vec<Self::Scalar> {
        values.to_vec()
    }

    fn ciphertext_to_bytes(cipher: &Self::Ciphertext) -> Result<Vec<u8>, EvalError>;

    fn ciphertext_from_bytes(
        context: &SchemeContext,
        bytes: &[u8],
    ) -> Result<Self::Ciphertext, EvalError>;

    fn plaintext_to_bytes(plain: &Self::Plaintext) -> Result<Vec<u8>, EvalError>;

    fn plaintext_from_bytes(
        context: &SchemeContext,
        bytes: &[u8],
    ) -> Result<Self::Plaintext, EvalError>;
}
