//! Gate-level encryption of small unsigned integers.
//!
//! Ciphertexts live in a [`NativeHeap`] owned by the scheme context, the way
//! a foreign runtime owns its objects, and are referenced by handle. A
//! [`NativeCiphertext`] releases its handle when the last clone is dropped,
//! and nowhere else.
//!
//! Arithmetic is modulo `2^bit_width`. Every gate needs the server key (the
//! evaluation keys); there is one slot and rotation rotates bits.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use fhegraph_core::scheme::SchemeKind;

use super::packed::{from_bytes, same_key, to_bytes};
use super::{Evaluator, Scheme};
use crate::context::SchemeContext;
use crate::error::EvalError;
use crate::keys::SecretKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct NativeCell {
    key_id: u64,
    value: u8,
}

/// Handle-addressed store of native ciphertexts.
#[derive(Debug, Default)]
pub struct NativeHeap {
    next: AtomicU64,
    cells: Mutex<HashMap<u64, NativeCell>>,
    releases: AtomicU64,
    double_releases: AtomicU64,
}

impl NativeHeap {
    pub fn new() -> Self {
        Self::default()
    }

    fn cells(&self) -> MutexGuard<'_, HashMap<u64, NativeCell>> {
        match self.cells.lock() {
            Ok(cells) => cells,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn alloc(&self, cell: NativeCell) -> u64 {
        let handle = self.next.fetch_add(1, Ordering::Relaxed);
        self.cells().insert(handle, cell);
        handle
    }

    fn read(&self, handle: u64) -> Option<NativeCell> {
        self.cells().get(&handle).copied()
    }

    fn release(&self, handle: u64) {
        if self.cells().remove(&handle).is_some() {
            self.releases.fetch_add(1, Ordering::Relaxed);
        } else {
            self.double_releases.fetch_add(1, Ordering::Relaxed);
            warn!(handle, "native ciphertext released twice");
        }
    }

    /// Handles allocated and not yet released.
    pub fn live(&self) -> usize {
        self.cells().len()
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    /// Releases of handles that were already gone; always zero unless
    /// ownership is broken.
    pub fn double_releases(&self) -> u64 {
        self.double_releases.load(Ordering::Relaxed)
    }
}

struct NativeHandle {
    heap: Arc<NativeHeap>,
    handle: u64,
    key_id: u64,
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        self.heap.release(self.handle);
    }
}

/// Owning reference to a heap cell; clones share the cell.
#[derive(Clone)]
pub struct NativeCiphertext {
    inner: Arc<NativeHandle>,
}

impl NativeCiphertext {
    fn alloc(heap: &Arc<NativeHeap>, key_id: u64, value: u8) -> Self {
        let handle = heap.alloc(NativeCell { key_id, value });
        NativeCiphertext {
            inner: Arc::new(NativeHandle {
                heap: Arc::clone(heap),
                handle,
                key_id,
            }),
        }
    }

    pub fn handle(&self) -> u64 {
        self.inner.handle
    }

    fn value(&self) -> Result<u8, EvalError> {
        self.inner
            .heap
            .read(self.inner.handle)
            .map(|cell| cell.value)
            .ok_or(EvalError::Released {
                handle: self.inner.handle,
            })
    }
}

impl fmt::Debug for NativeCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCiphertext")
            .field("handle", &self.inner.handle)
            .field("key_id", &format_args!("{:016x}", self.inner.key_id))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytePlaintext {
    pub value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitwise;

fn mask(context: &SchemeContext) -> u8 {
    ((1u16 << context.params().bit_width.min(8)) - 1) as u8
}

fn heap(context: &SchemeContext) -> Result<&Arc<NativeHeap>, EvalError> {
    context
        .native_heap()
        .ok_or_else(|| EvalError::invalid("context has no native heap"))
}

/// Evaluates a two-input gate; the server key must be present.
fn gate(
    ev: &Evaluator<'_>,
    lhs: &NativeCiphertext,
    rhs: u8,
    f: impl Fn(u8, u8, u8) -> u8,
) -> Result<NativeCiphertext, EvalError> {
    ev.keys()?;
    let context = ev.context();
    let m = mask(context);
    let value = f(lhs.value()?, rhs, m) & m;
    Ok(NativeCiphertext::alloc(heap(context)?, lhs.inner.key_id, value))
}

fn both(lhs: &NativeCiphertext, rhs: &NativeCiphertext) -> Result<u8, EvalError> {
    same_key(lhs.inner.key_id, rhs.inner.key_id)?;
    rhs.value()
}

fn rotate_bits(value: u8, step: i32, width: u8) -> u8 {
    let width = width.clamp(1, 8);
    let shift = step.rem_euclid(i32::from(width)) as u32;
    let m = ((1u16 << width) - 1) as u8;
    let value = value & m;
    if shift == 0 {
        return value;
    }
    ((value << shift) | (value >> (u32::from(width) - shift))) & m
}

#[derive(Serialize, Deserialize)]
struct WireCell {
    key_id: u64,
    value: u8,
}

impl Scheme for Bitwise {
    const KIND: SchemeKind = SchemeKind::Bitwise;

    type Scalar = u8;
    type Plaintext = BytePlaintext;
    type Ciphertext = NativeCiphertext;

    fn encode(
        context: &SchemeContext,
        slots: &[u8],
        _scale_bits: u32,
        _level: u32,
    ) -> Result<Self::Plaintext, EvalError> {
        match slots {
            [value] => Ok(BytePlaintext {
                value: value & mask(context),
            }),
            _ => Err(EvalError::invalid(format!(
                "bitwise encoding takes one slot, got {}",
                slots.len()
            ))),
        }
    }

    fn decode(_context: &SchemeContext, plain: &Self::Plaintext) -> Result<Vec<u8>, EvalError> {
        Ok(vec![plain.value])
    }

    fn encrypt(
        context: &SchemeContext,
        key_id: u64,
        plain: &Self::Plaintext,
        _rng: &mut dyn RngCore,
    ) -> Result<Self::Ciphertext, EvalError> {
        Ok(NativeCiphertext::alloc(
            heap(context)?,
            key_id,
            plain.value & mask(context),
        ))
    }

    fn decrypt(
        _context: &SchemeContext,
        secret: &SecretKey,
        cipher: &Self::Ciphertext,
    ) -> Result<Self::Plaintext, EvalError> {
        same_key(secret.key_id(), cipher.inner.key_id)?;
        Ok(BytePlaintext {
            value: cipher.value()?,
        })
    }

    fn key_id(cipher: &Self::Ciphertext) -> u64 {
        cipher.inner.key_id
    }

    fn is_live(cipher: &Self::Ciphertext) -> bool {
        cipher.value().is_ok()
    }

    fn plain_has_zero(plain: &Self::Plaintext) -> bool {
        plain.value == 0
    }

    fn add(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        gate(ev, lhs, both(lhs, rhs)?, |a, b, _| a.wrapping_add(b))
    }

    fn add_plain(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        gate(ev, lhs, rhs.value, |a, b, _| a.wrapping_add(b))
    }

    fn sub(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        gate(ev, lhs, both(lhs, rhs)?, |a, b, _| a.wrapping_sub(b))
    }

    fn sub_plain(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        gate(ev, lhs, rhs.value, |a, b, _| a.wrapping_sub(b))
    }

    fn plain_sub(
        ev: &Evaluator<'_>,
        lhs: &Self::Plaintext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        gate(ev, rhs, lhs.value, |c, p, _| p.wrapping_sub(c))
    }

    fn mul(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        gate(ev, lhs, both(lhs, rhs)?, |a, b, _| a.wrapping_mul(b))
    }

    fn mul_plain(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        gate(ev, lhs, rhs.value, |a, b, _| a.wrapping_mul(b))
    }

    /// Exact division; an encrypted zero divisor gives all ones.
    fn div(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        gate(ev, lhs, both(lhs, rhs)?, |a, b, m| a.checked_div(b).unwrap_or(m))
    }

    fn div_plain(
        ev: &Evaluator<'_>,
        lhs: &Self::Ciphertext,
        rhs: &Self::Plaintext,
    ) -> Result<Self::Ciphertext, EvalError> {
        if rhs.value == 0 {
            return Err(EvalError::DivisionByZero);
        }
        gate(ev, lhs, rhs.value, |a, b, _| a / b)
    }

    fn plain_div(
        ev: &Evaluator<'_>,
        lhs: &Self::Plaintext,
        rhs: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext, EvalError> {
        gate(ev, rhs, lhs.value, |c, p, m| p.checked_div(c).unwrap_or(m))
    }

    fn negate(ev: &Evaluator<'_>, value: &Self::Ciphertext) -> Result<Self::Ciphertext, EvalError> {
        gate(ev, value, 0, |a, _, _| a.wrapping_neg())
    }

    fn rotate(
        ev: &Evaluator<'_>,
        value: &Self::Ciphertext,
        step: i32,
    ) -> Result<Self::Ciphertext, EvalError> {
        let width = ev.context().params().bit_width;
        gate(ev, value, 0, |a, _, _| rotate_bits(a, step, width))
    }

    /// Rotations count bits, so the vector width plays no part.
    fn rotation_step(steps: u32, _vec_width: u32, left: bool) -> i32 {
        let step = (steps % 8) as i32;
        if left {
            step
        } else {
            -step
        }
    }

    fn rotate_raw(context: &SchemeContext, values: &[u8], step: i32) -> Vec<u8> {
        let width = context.params().bit_width;
        values.iter().map(|v| rotate_bits(*v, step, width)).collect()
    }

    fn reduce_raw(context: &SchemeContext, values: &[u8]) -> Vec<u8> {
        let m = mask(context);
        values.iter().map(|v| v & m).collect()
    }

    fn ciphertext_to_bytes(cipher: &Self::Ciphertext) -> Result<Vec<u8>, EvalError> {
        to_bytes(&WireCell {
            key_id: cipher.inner.key_id,
            value: cipher.value()?,
        })
    }

    fn ciphertext_from_bytes(
        context: &SchemeContext,
        bytes: &[u8],
    ) -> Result<Self::Ciphertext, EvalError> {
        let cell: WireCell = from_bytes(bytes)?;
        if cell.value & !mask(context) != 0 {
            return Err(EvalError::malformed(format!(
                "value {} exceeds {} bits",
                cell.value,
                context.params().bit_width
            )));
        }
        Ok(NativeCiphertext::alloc(heap(context)?, cell.key_id, cell.value))
    }

    fn plaintext_to_bytes(plain: &Self::Plaintext) -> Result<Vec<u8>, EvalError> {
        to_bytes(plain)
    }

    fn plaintext_from_bytes(
        context: &SchemeContext,
        bytes: &[u8],
    ) -> Result<Self::Plaintext, EvalError> {
        let plain: BytePlaintext = from_bytes(bytes)?;
        Ok(BytePlaintext {
            value: plain.value & mask(context),
        })
    }
}
