//! Key-generation configuration.

use std::env;
use std::str::FromStr;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use fhegraph_check::compile::DEFAULT_SCALE_BITS;

use crate::error::ExecError;

/// Knobs for parameter selection and key generation.
///
/// Every field has a default, so a partial JSON object is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemeConfig {
    /// Forces a ring degree instead of choosing the smallest that fits.
    pub poly_modulus_degree: Option<u64>,
    /// Bits of each rescaling prime in the approximate scheme's chain.
    pub scale_bits: u32,
    /// Bits of the first and last (special) primes of the chain.
    pub special_prime_bits: u32,
    /// Plaintext modulus of the integer scheme.
    pub plain_modulus: u64,
    /// Message width of the bitwise scheme.
    pub bit_width: u8,
    /// Add Gaussian noise when encrypting approximate values.
    pub noise: bool,
    /// Seed for reproducible keys; fresh entropy when absent.
    pub seed: Option<u64>,
}

impl Default for SchemeConfig {
    fn default() -> Self {
        SchemeConfig {
            poly_modulus_degree: None,
            scale_bits: DEFAULT_SCALE_BITS,
            special_prime_bits: 60,
            plain_modulus: 786_433,
            bit_width: 8,
            noise: true,
            seed: None,
        }
    }
}

impl SchemeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ExecError> {
        serde_json::from_str(json)
            .map_err(|err| ExecError::config(format!("invalid scheme config: {err}")))
    }

    /// Defaults overridden by `FHEGRAPH_*` environment variables.
    pub fn from_env() -> Result<Self, ExecError> {
        let mut config = SchemeConfig::default();
        if let Some(degree) = env_var("FHEGRAPH_POLY_DEGREE")? {
            config.poly_modulus_degree = Some(degree);
        }
        if let Some(bits) = env_var("FHEGRAPH_SCALE_BITS")? {
            config.scale_bits = bits;
        }
        if let Some(modulus) = env_var("FHEGRAPH_PLAIN_MODULUS")? {
            config.plain_modulus = modulus;
        }
        if let Some(width) = env_var("FHEGRAPH_BIT_WIDTH")? {
            config.bit_width = width;
        }
        if let Some(seed) = env_var("FHEGRAPH_SEED")? {
            config.seed = Some(seed);
        }
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn rng(&self) -> ChaCha20Rng {
        match self.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        }
    }
}

fn env_var<T: FromStr>(name: &str) -> Result<Option<T>, ExecError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ExecError::config(format!("{name}={value} is not a valid value"))),
        Err(_) => Ok(None),
    }
}
