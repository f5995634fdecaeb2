//! Scheme families and their algebraic capabilities.
//!
//! Lowering consults [`Capabilities`] to decide which graph operations a
//! family executes natively and which must be rewritten or rejected. The
//! executors in `fhegraph-exec` implement exactly these capabilities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemeKind {
    /// Packed approximate arithmetic over real numbers.
    Ckks,
    /// Packed exact arithmetic over integers modulo a plain modulus.
    Bfv,
    /// Encrypted small integers evaluated gate by gate.
    Bitwise,
}

/// What a scheme family can evaluate natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Any homomorphic division.
    pub division: bool,
    /// Division with a plaintext numerator and an encrypted divisor.
    pub plain_cipher_division: bool,
    /// Native `plain - cipher` without a negate-and-add rewrite.
    pub plain_sub: bool,
    /// Rotation of encrypted values.
    pub rotation: bool,
    /// Rotations need per-step evaluation keys.
    pub rotation_keys: bool,
    /// Multiplications consume modulus levels.
    pub levelled: bool,
}

impl SchemeKind {
    pub const ALL: [SchemeKind; 3] = [SchemeKind::Ckks, SchemeKind::Bfv, SchemeKind::Bitwise];

    pub const fn capabilities(self) -> Capabilities {
        match self {
            SchemeKind::Ckks => Capabilities {
                division: true,
                plain_cipher_division: true,
                plain_sub: false,
                rotation: true,
                rotation_keys: true,
                levelled: true,
            },
            SchemeKind::Bfv => Capabilities {
                division: false,
                plain_cipher_division: false,
                plain_sub: false,
                rotation: true,
                rotation_keys: true,
                levelled: false,
            },
            SchemeKind::Bitwise => Capabilities {
                division: true,
                plain_cipher_division: true,
                plain_sub: true,
                rotation: true,
                rotation_keys: false,
                levelled: false,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SchemeKind::Ckks => "ckks",
            SchemeKind::Bfv => "bfv",
            SchemeKind::Bitwise => "bitwise",
        }
    }
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchemeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchemeKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown scheme '{}', expected ckks/bfv/bitwise", s))
    }
}
