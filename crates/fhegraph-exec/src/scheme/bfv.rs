//! Exact integer arithmetic modulo the plain modulus `t`.
//!
//! Slots hold residues in `[0, t)` and decode to the centered range
//! `(-t/2, t/2]`. The `N` slots form two rows of `N/2` that rotate
//! independently.

use rand::RngCore;

use fhegraph_core::scheme::SchemeKind;

use super::packed::{check_slot_count, from_bytes, same_key, to_bytes};
use super::{Evaluator, PackedCiphertext, PackedPlaintext, Scheme};
use crate::context::SchemeContext;
use crate::error::EvalError;
use crate::keys::SecretKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bfv;

fn modulus(ev: &Evaluator<'_>) -> u64 {
    ev.context().params().plain_modulus
}

fn add_mod(a: u64, b: u64, t: u64) -> u64 {
    ((u128::from(a) + u128::from(b)) % u128::from(t)) as u64
}

fn sub_mod(a: u64, b: u64, t: u64) -> u64 {
    ((u128::from(a) + u128::from(t) - u128::from(b % t)) % u128::from(t)) as u64
}

fn mul_mod(a: u64, b: u64, t: u64) -> u64 {
    ((u128::from(a) * u128::from(b)) % u128::from(t)) as u64
}

impl Scheme for Bfv {
    const KIND: SchemeKind = SchemeKind::Bfv;

    type Scalar = i64;
    type Plaintext = PackedPlaintext<u64>;
    type Ciphertext = PackedCiphertext<u64>;

    fn encode(
        context: &SchemeContext,
        slots: &[i64],
        _scale_bits: u32,
        _level: u32,
    ) -> Result<Self::Plaintext, EvalError> {
        check_slot_count(context, slots.len())?;
        let t = i128::from(context.params().plain_modulus);
        Ok(PackedPlaintext {
            level: 0,
            scale_bits: 0,
            slots: slots
                .iter()
                .map(|v| i128::from(*v).rem_euclid(t) as u64)
                .collect(),
        })
    }

    fn decode(context: &SchemeContext, plain: &Self::Plaintext) -> Result<Vec<i64>, EvalError> {
        let t = context.params().plain_modulus;
        Ok(plain
            .slots
            .iter()
            .map(|v| {
                if *v > t / 2 {
                    (i128::from(*v) - i128::from(t)) as i64
                } else {
                    *v as i64
                }
            })
            .collect())
    }

    fn encrypt(
        _context: &SchemeContext,
        key_id: u64,
        plain: &Self::Plaintext,
        _rng: &mut dyn RngCore,
    ) -> Result<Self::Ciphertext, EvalError> {
        Ok(PackedCiphertext {
            key_id,
            level: 0,
            scale_bits: 0,
            slots: plain.slots.clone(),
        })
    }

    fn decrypt(
        _context: &SchemeContext,
        secret: &SecretKey,
        cipher: &Self::Ciphertext,
    ) -> Result<Self::Plaintext, EvalError> {
        same_key(secret.key_id(), cipher.key_id)?;
        Ok(PackedPlaintext {
            level: 0,
            scale_bits: 0,
            slots: cipher.slots.clone(),
        })
    }

    fn key_id(cipher: &Self::Ciphertext) -> u64 {
        cipher.key_id
    }

    fn plain_has_zero(plain: &Self::Plaintext) -> bool {
        plain.slots.contains(&0)
    }

    fn add(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        let t = modulus(ev);
        lhs.zip(rhs, 0, |a, b| add_mod(a, b, t))
    }

    fn add_plain(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        let t = modulus(ev);
        lhs.zip_plain(rhs, 0, |a, b| add_mod(a, b, t))
    }

    fn sub(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        let t = modulus(ev);
        lhs.zip(rhs, 0, |a, b| sub_mod(a, b, t))
    }

    fn sub_plain(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        let t = modulus(ev);
        lhs.zip_plain(rhs, 0, |a, b| sub_mod(a, b, t))
    }

    fn mul(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        ev.require_relin()?;
        let t = modulus(ev);
        lhs.zip(rhs, 0, |a, b| mul_mod(a, b, t))
    }

    fn mul_plain(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        let t = modulus(ev);
        lhs.zip_plain(rhs, 0, |a, b| mul_mod(a, b, t))
    }

    fn negate(ev: &Evaluator<'_>, value: &Self::Ciphertext) -> Result<Self::Ciphertext, EvalError> {
        let t = modulus(ev);
        Ok(value.map(|v| sub_mod(0, v, t)))
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
        check_residues(context, &cipher.slots)?;
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
        check_residues(context, &plain.slots)?;
        Ok(plain)
    }
}

fn check_residues(context: &SchemeContext, slots: &[u64]) -> Result<(), EvalError> {
    let t = context.params().plain_modulus;
    match slots.iter().find(|v| **v >= t) {
        Some(v) => Err(EvalError::malformed(format!("slot value {v} is not below {t}"))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::EvaluationKeys;
    use crate::params::EncryptionParameters;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn context() -> SchemeContext {
        SchemeContext::derive(&EncryptionParameters::bfv(4096, 786_433)).unwrap()
    }

    fn encrypt(context: &SchemeContext, slots: &[i64]) -> PackedCiphertext<u64> {
        let plain = Bfv::encode(context, slots, 0, 0).unwrap();
        Bfv::encrypt(context, 9, &plain, &mut ChaCha20Rng::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn negative_values_decode_centered() {
        let context = context();
        let ev = Evaluator::new(&context, None);
        let x = encrypt(&context, &vec![5; 4096]);
        let neg = Bfv::negate(&ev, &x).unwrap();
        let plain = PackedPlaintext {
            level: 0,
            scale_bits: 0,
            slots: neg.slots,
        };
        assert_eq!(Bfv::decode(&context, &plain).unwrap()[0], -5);
    }

    #[test]
    fn products_wrap_modulo_t() {
        let context = context();
        let keys = EvaluationKeys {
            key_id: 9,
            relin: true,
            galois_elements: Default::default(),
        };
        let ev = Evaluator::new(&context, Some(&keys));
        let x = encrypt(&context, &vec![1000; 4096]);
        let sq = Bfv::mul(&ev, &x, &x).unwrap();
        assert_eq!(sq.slots[0], 1_000_000 % 786_433);
    }

    #[test]
    fn division_is_not_available() {
        let context = context();
        let ev = Evaluator::new(&context, None);
        let x = encrypt(&context, &vec![1; 4096]);
        assert!(matches!(
            Bfv::div(&ev, &x, &x),
            Err(EvalError::Unsupported { .. })
        ));
    }

    #[test]
    fn out_of_range_residues_are_rejected() {
        let context = context();
        let mut cipher = encrypt(&context, &vec![1; 4096]);
        cipher.slots[3] = 786_433;
        let bytes = Bfv::ciphertext_to_bytes(&cipher).unwrap();
        assert!(matches!(
            Bfv::ciphertext_from_bytes(&context, &bytes),
            Err(EvalError::Malformed { .. })
        ));
    }
}
