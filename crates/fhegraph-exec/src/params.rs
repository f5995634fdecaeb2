//! Encryption parameters and their selection from key requirements.

use serde::{Deserialize, Serialize};
use tracing::debug;

use fhegraph_check::KeyRequirements;
use fhegraph_core::scheme::SchemeKind;

use crate::config::SchemeConfig;
use crate::error::ExecError;

/// Supported ring degrees with the largest total coefficient modulus (in
/// bits) that keeps 128-bit security.
const DEGREES: [(u64, u32); 6] = [
    (1024, 27),
    (2048, 54),
    (4096, 109),
    (8192, 218),
    (16384, 438),
    (32768, 881),
];

const MAX_PRIME_BITS: u32 = 60;

/// Everything a [`SchemeContext`](crate::context::SchemeContext) is derived
/// from; also the context cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptionParameters {
    pub scheme: SchemeKind,
    /// Ring degree; zero for the bitwise scheme.
    pub poly_modulus_degree: u64,
    /// Bit sizes of the coefficient modulus primes, first to last.
    pub coeff_modulus_bits: Vec<u32>,
    /// Plaintext modulus; `2^bit_width` for the bitwise scheme.
    pub plain_modulus: u64,
    pub bit_width: u8,
    pub noise: bool,
}

impl EncryptionParameters {
    pub fn ckks(poly_modulus_degree: u64, coeff_modulus_bits: Vec<u32>) -> Self {
        EncryptionParameters {
            scheme: SchemeKind::Ckks,
            poly_modulus_degree,
            coeff_modulus_bits,
            plain_modulus: 0,
            bit_width: 0,
            noise: true,
        }
    }

    pub fn bfv(poly_modulus_degree: u64, plain_modulus: u64) -> Self {
        EncryptionParameters {
            scheme: SchemeKind::Bfv,
            poly_modulus_degree,
            coeff_modulus_bits: bfv_chain(poly_modulus_degree),
            plain_modulus,
            bit_width: 0,
            noise: false,
        }
    }

    pub fn bitwise(bit_width: u8) -> Self {
        EncryptionParameters {
            scheme: SchemeKind::Bitwise,
            poly_modulus_degree: 0,
            coeff_modulus_bits: Vec::new(),
            plain_modulus: 1u64 << bit_width.min(8),
            bit_width,
            noise: false,
        }
    }

    pub fn slot_count(&self) -> usize {
        match self.scheme {
            SchemeKind::Ckks => (self.poly_modulus_degree / 2) as usize,
            SchemeKind::Bfv => self.poly_modulus_degree as usize,
            SchemeKind::Bitwise => 1,
        }
    }

    /// Levels available for rescaling: every prime except the two specials.
    pub fn max_level(&self) -> u32 {
        match self.scheme {
            SchemeKind::Ckks => self.coeff_modulus_bits.len().saturating_sub(2) as u32,
            SchemeKind::Bfv | SchemeKind::Bitwise => 0,
        }
    }

    pub fn total_modulus_bits(&self) -> u32 {
        self.coeff_modulus_bits.iter().sum()
    }

    pub fn validate(&self) -> Result<(), ExecError> {
        match self.scheme {
            SchemeKind::Ckks | SchemeKind::Bfv => {
                let max_bits = max_modulus_bits(self.poly_modulus_degree).ok_or_else(|| {
                    ExecError::config(format!(
                        "unsupported polynomial modulus degree {}",
                        self.poly_modulus_degree
                    ))
                })?;
                if self.coeff_modulus_bits.is_empty()
                    || self
                        .coeff_modulus_bits
                        .iter()
                        .any(|bits| *bits == 0 || *bits > MAX_PRIME_BITS)
                {
                    return Err(ExecError::config(format!(
                        "coefficient modulus primes must be 1..={MAX_PRIME_BITS} bits, got {:?}",
                        self.coeff_modulus_bits
                    )));
                }
                if self.total_modulus_bits() > max_bits {
                    return Err(ExecError::config(format!(
                        "coefficient modulus of {} bits exceeds {max_bits} for degree {}",
                        self.total_modulus_bits(),
                        self.poly_modulus_degree
                    )));
                }
                if self.scheme == SchemeKind::Ckks && self.coeff_modulus_bits.len() < 2 {
                    return Err(ExecError::config(
                        "the approximate scheme needs at least the two special primes",
                    ));
                }
                if self.scheme == SchemeKind::Bfv {
                    let step = 2 * self.poly_modulus_degree;
                    if self.plain_modulus < 2 || self.plain_modulus % step != 1 {
                        return Err(ExecError::config(format!(
                            "plain modulus {} does not support batching for degree {} (needs t = 1 mod {step})",
                            self.plain_modulus, self.poly_modulus_degree
                        )));
                    }
                }
                Ok(())
            }
            SchemeKind::Bitwise => {
                if !(1..=8).contains(&self.bit_width) {
                    return Err(ExecError::config(format!(
                        "bit width {} is outside 1..=8",
                        self.bit_width
                    )));
                }
                if self.plain_modulus != 1u64 << self.bit_width {
                    return Err(ExecError::config("bitwise plain modulus must be 2^bit_width"));
                }
                Ok(())
            }
        }
    }

    /// Picks the smallest parameters that satisfy `requirements`.
    pub fn select(
        scheme: SchemeKind,
        requirements: &KeyRequirements,
        config: &SchemeConfig,
    ) -> Result<Self, ExecError> {
        let width = u64::from(requirements.max_vec_width.max(1));
        let params = match scheme {
            SchemeKind::Ckks => {
                if config.scale_bits == 0 || config.scale_bits > MAX_PRIME_BITS {
                    return Err(ExecError::config(format!(
                        "scale of {} bits is outside 1..={MAX_PRIME_BITS}",
                        config.scale_bits
                    )));
                }
                let mut chain = vec![config.special_prime_bits];
                chain.extend(std::iter::repeat(config.scale_bits).take(requirements.mult_depth as usize));
                chain.push(config.special_prime_bits);
                let total: u32 = chain.iter().sum();

                let degree = match config.poly_modulus_degree {
                    Some(degree) => degree,
                    None => DEGREES
                        .iter()
                        .find(|(degree, max_bits)| degree / 2 >= width && *max_bits >= total)
                        .map(|(degree, _)| *degree)
                        .ok_or_else(|| {
                            ExecError::config(format!(
                                "no ring degree fits width {width} with a {total}-bit chain (depth {})",
                                requirements.mult_depth
                            ))
                        })?,
                };
                let mut params = EncryptionParameters::ckks(degree, chain);
                params.noise = config.noise;
                params
            }
            SchemeKind::Bfv => {
                // Rotations act on two rows of N/2 slots each.
                let needed = if requirements.rotation_steps.is_empty() {
                    width
                } else {
                    2 * width
                };
                let degree = match config.poly_modulus_degree {
                    Some(degree) => degree,
                    None => DEGREES
                        .iter()
                        .map(|(degree, _)| *degree)
                        .find(|degree| *degree >= needed.max(4096))
                        .ok_or_else(|| {
                            ExecError::config(format!("no ring degree has {needed} slots"))
                        })?,
                };
                EncryptionParameters::bfv(degree, config.plain_modulus)
            }
            SchemeKind::Bitwise => {
                if requirements.max_vec_width > 1 {
                    return Err(ExecError::config(format!(
                        "the bitwise scheme has one slot, the graph needs {}",
                        requirements.max_vec_width
                    )));
                }
                EncryptionParameters::bitwise(config.bit_width)
            }
        };
        params.validate()?;
        if (params.slot_count() as u64) < width {
            return Err(ExecError::config(format!(
                "vector width {width} exceeds the {} available slots",
                params.slot_count()
            )));
        }
        debug!(
            scheme = %scheme,
            degree = params.poly_modulus_degree,
            modulus_bits = params.total_modulus_bits(),
            slots = params.slot_count(),
            "selected encryption parameters"
        );
        Ok(params)
    }
}

fn max_modulus_bits(degree: u64) -> Option<u32> {
    DEGREES
        .iter()
        .find(|(candidate, _)| *candidate == degree)
        .map(|(_, bits)| *bits)
}

/// Default integer-scheme chain per degree.
fn bfv_chain(degree: u64) -> Vec<u32> {
    match degree {
        1024 => vec![27],
        2048 => vec![54],
        4096 => vec![36, 36, 37],
        8192 => vec![43, 43, 44, 44, 44],
        16384 => vec![48, 48, 48, 49, 49, 49, 49, 49, 49],
        32768 => vec![55; 16],
        _ => Vec::new(),
    }
}
