//! Approximate arithmetic over real slots.
//!
//! Every multiplication or division rescales and drops one level; a
//! ciphertext at level zero cannot be multiplied again. Encryption adds
//! Gaussian noise scaled down by the encoding scale, so results are exact
//! only up to roughly `2^-scale_bits`.

use rand::RngCore;
use rand_distr::{Distribution, Normal};

use fhegraph_core::scheme::SchemeKind;

use super::packed::{check_slot_count, from_bytes, to_bytes};
use super::{Evaluator, PackedCiphertext, PackedPlaintext, Scheme};
use crate::context::SchemeContext;
use crate::error::EvalError;
use crate::keys::SecretKey;

/// Standard deviation of fresh encryption noise before scaling.
const NOISE_STDDEV: f64 = 3.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ckks;

fn rescale(level: u32) -> Result<u32, EvalError> {
    level.checked_sub(1).ok_or(EvalError::LevelExhausted)
}

impl Scheme for Ckks {
    const KIND: SchemeKind = SchemeKind::Ckks;

    type Scalar = f64;
    type Plaintext = PackedPlaintext<f64>;
    type Ciphertext = PackedCiphertext<f64>;

    fn encode(
        context: &SchemeContext,
        slots: &[f64],
        scale_bits: u32,
        level: u32,
    ) -> Result<Self::Plaintext, EvalError> {
        check_slot_count(context, slots.len())?;
        if scale_bits == 0 {
            return Err(EvalError::invalid("approximate encoding needs a positive scale"));
        }
        let level = context
            .max_level()
            .checked_sub(level)
            .ok_or(EvalError::LevelExhausted)?;
        Ok(PackedPlaintext {
            level,
            scale_bits,
            slots: slots.to_vec(),
        })
    }

    fn decode(_context: &SchemeContext, plain: &Self::Plaintext) -> Result<Vec<f64>, EvalError> {
        Ok(plain.slots.clone())
    }

    fn encrypt(
        context: &SchemeContext,
        key_id: u64,
        plain: &Self::Plaintext,
        rng: &mut dyn RngCore,
    ) -> Result<Self::Ciphertext, EvalError> {
        let mut slots = plain.slots.clone();
        if context.params().noise {
            let sigma = NOISE_STDDEV / 2f64.powi(plain.scale_bits as i32);
            let normal = Normal::new(0.0, sigma).map_err(|err| EvalError::invalid(err.to_string()))?;
            for slot in &mut slots {
                *slot += normal.sample(rng);
            }
        }
        Ok(PackedCiphertext {
            key_id,
            level: plain.level,
            scale_bits: plain.scale_bits,
            slots,
        })
    }

    fn decrypt(
        _context: &SchemeContext,
        secret: &SecretKey,
        cipher: &Self::Ciphertext,
    ) -> Result<Self::Plaintext, EvalError> {
        super::packed::same_key(secret.key_id(), cipher.key_id)?;
        Ok(PackedPlaintext {
            level: cipher.level,
            scale_bits: cipher.scale_bits,
            slots: cipher.slots.clone(),
        })
    }

    fn key_id(cipher: &Self::Ciphertext) -> u64 {
        cipher.key_id
    }

    fn plain_has_zero(plain: &Self::Plaintext) -> bool {
        plain.slots.iter().any(|v| *v == 0.0)
    }

    fn add(
        _ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        lhs.zip(rhs, lhs.level.min(rhs.level), |a, b| a + b)
    }

    fn add_plain(
        _ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        lhs.zip_plain(rhs, lhs.level.min(rhs.level), |a, b| a + b)
    }

    fn sub(
        _ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        lhs.zip(rhs, lhs.level.min(rhs.level), |a, b| a - b)
    }

    fn sub_plain(
        _ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        lhs.zip_plain(rhs, lhs.level.min(rhs.level), |a, b| a - b)
    }

    fn mul(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        ev.require_relin()?;
        lhs.zip(rhs, rescale(lhs.level.min(rhs.level))?, |a, b| a * b)
    }

    fn mul_plain(
        _ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        lhs.zip_plain(rhs, rescale(lhs.level.min(rhs.level))?, |a, b| a * b)
    }

    fn div(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        ev.require_relin()?;
        lhs.zip(rhs, rescale(lhs.level.min(rhs.level))?, |a, b| a * inverse(b))
    }

    /// Multiplication by the slot-wise reciprocal.
    fn div_plain(
        _ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        if Self::plain_has_zero(rhs) {
            return Err(EvalError::DivisionByZero);
        }
        lhs.zip_plain(rhs, rescale(lhs.level.min(rhs.level))?, |a, b| a * b.recip())
    }

    fn plain_div(
        _ev: &Evaluator<'_>,
        lhs: &Self::Plaintext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        rhs.zip_plain(lhs, rescale(lhs.level.min(rhs.level))?, |c, p| p * inverse(c))
    }

    fn negate(_ev: &Evaluator<'_>, value: &Self::Ciphertext) -> Result<Self::Ciphertext, EvalError> {
        Ok(value.map(|v| -v))
    }

    fn rotate(
        ev: &Evaluator<'_>,
        value: &Self::Ciphertext,
        step: i32,
    ) -> Result<Self::Ciphertext, EvalError> {
        ev.require_rotation(step)?;
        Ok(value.rotate_rows(ev.context().row_size(), step))
    }

    fn ciphertext_to_bytes(cipher: &Self::Ciphertext) -> Result<Vec<u8>, EvalError> {
        to_bytes(cipher)
    }

    fn ciphertext_from_bytes(
        context: &SchemeContext,
        bytes: &[u8],
    ) -> Result<Self::Ciphertext, EvalError> {
        let cipher: Self::Ciphertext = from_bytes(bytes)?;
        check_slot_count(context, cipher.slots.len()).map_err(EvalError::malformed)?;
        Ok(cipher)
    }

    fn plaintext_to_bytes(plain: &Self::Plaintext) -> Result<Vec<u8>, EvalError> {
        to_bytes(plain)
    }

    fn plaintext_from_bytes(
        context: &SchemeContext,
        bytes: &[u8],
    ) -> Result<Self::Plaintext, EvalError> {
        let plain: Self::Plaintext = from_bytes(bytes)?;
        check_slot_count(context, plain.slots.len()).map_err(EvalError::malformed)?;
        Ok(plain)
    }
}

/// Encrypted inverse, evaluated by Newton iteration from a rough seed.
/// An encrypted zero gives a huge but finite value, as the real
/// approximation does.
fn inverse(x: f64) -> f64 {
    if x == 0.0 {
        return f64::MAX;
    }
    let mut y = x.signum() * 2f64.powi(-x.abs().log2().ceil() as i32);
    for _ in 0..6 {
        y = y * (2.0 - x * y);
    }
    y
}
