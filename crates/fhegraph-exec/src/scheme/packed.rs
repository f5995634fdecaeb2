//! Slot-vector representation shared by the two packed schemes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::SchemeContext;
use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedPlaintext<T> {
    /// Levels still available; only the approximate scheme spends them.
    pub level: u32,
    pub scale_bits: u32,
    pub slots: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedCiphertext<T> {
    pub key_id: u64,
    pub level: u32,
    pub scale_bits: u32,
    pub slots: Vec<T>,
}

impl<T: Copy> PackedCiphertext<T> {
    pub(crate) fn zip(
        &self,
        other: &PackedCiphertext<T>,
        level: u32,
        f: impl Fn(T, T) -> T,
    ) -> Result<Self, EvalError> {
        same_key(self.key_id, other.key_id)?;
        Ok(PackedCiphertext {
            key_id: self.key_id,
            level,
            scale_bits: self.scale_bits,
            slots: zip_slots(&self.slots, &other.slots, f)?,
        })
    }

    /// Combines with a plaintext; `f` receives the ciphertext slot first.
    pub(crate) fn zip_plain(
        &self,
        plain: &PackedPlaintext<T>,
        level: u32,
        f: impl Fn(T, T) -> T,
    ) -> Result<Self, EvalError> {
        Ok(PackedCiphertext {
            key_id: self.key_id,
            level,
            scale_bits: self.scale_bits,
            slots: zip_slots(&self.slots, &plain.slots, f)?,
        })
    }

    pub(crate) fn map(&self, f: impl Fn(T) -> T) -> Self {
        PackedCiphertext {
            key_id: self.key_id,
            level: self.level,
            scale_bits: self.scale_bits,
            slots: self.slots.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Rotates every row of `row` slots left by `step`.
    pub(crate) fn rotate_rows(&self, row: usize, step: i32) -> Self {
        let mut slots = self.slots.clone();
        if row > 0 {
            let shift = i64::from(step).rem_euclid(row as i64) as usize;
            for chunk in slots.chunks_mut(row) {
                chunk.rotate_left(shift % chunk.len());
            }
        }
        PackedCiphertext {
            key_id: self.key_id,
            level: self.level,
            scale_bits: self.scale_bits,
            slots,
        }
    }
}

pub(crate) fn same_key(expected: u64, found: u64) -> Result<(), EvalError> {
    if expected == found {
        Ok(())
    } else {
        Err(EvalError::KeyMismatch { expected, found })
    }
}

pub(crate) fn check_slot_count(context: &SchemeContext, len: usize) -> Result<(), EvalError> {
    if len == context.slot_count() {
        Ok(())
    } else {
        Err(EvalError::invalid(format!(
            "encoding needs {} slots, got {len}",
            context.slot_count()
        )))
    }
}

fn zip_slots<T: Copy>(lhs: &[T], rhs: &[T], f: impl Fn(T, T) -> T) -> Result<Vec<T>, EvalError> {
    if lhs.len() != rhs.len() {
        return Err(EvalError::invalid(format!(
            "operands have {} and {} slots",
            lhs.len(),
            rhs.len()
        )));
    }
    Ok(lhs.iter().zip(rhs).map(|(a, b)| f(*a, *b)).collect())
}

pub(crate) fn to_bytes<V: Serialize>(value: &V) -> Result<Vec<u8>, EvalError> {
    serde_json::to_vec(value).map_err(EvalError::malformed)
}

pub(crate) fn from_bytes<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, EvalError> {
    serde_json::from_slice(bytes).map_err(EvalError::malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(slots: Vec<i64>) -> PackedCiphertext<i64> {
        PackedCiphertext {
            key_id: 1,
            level: 0,
            scale_bits: 0,
            slots,
        }
    }

    #[test]
    fn rows_rotate_independently() {
        let rotated = cipher(vec![1, 2, 3, 4, 5, 6, 7, 8]).rotate_rows(4, 1);
        assert_eq!(rotated.slots, vec![2, 3, 4, 1, 6, 7, 8, 5]);
        let back = rotated.rotate_rows(4, -1);
        assert_eq!(back.slots, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn mixing_keys_fails() {
        let mut other = cipher(vec![1]);
        other.key_id = 2;
        assert_eq!(
            cipher(vec![1]).zip(&other, 0, |a, b| a + b),
            Err(EvalError::KeyMismatch {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn slot_counts_must_agree() {
        assert!(cipher(vec![1, 2])
            .zip(&cipher(vec![1]), 0, |a, b| a + b)
            .is_err());
    }
}
