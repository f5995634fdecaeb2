//! Key generation, encryption, execution and decryption.

use std::sync::Arc;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;

use fhegraph_check::KeySource;
use fhegraph_core::graph::Graph;
use fhegraph_core::signature::Signature;
use fhegraph_core::types::DataType;
use fhegraph_core::valuation::Valuation;

use crate::config::SchemeConfig;
use crate::context::{ContextCache, SchemeContext};
use crate::error::ExecError;
use crate::executor::{replicate, run, Executor, SchemeExecutor};
use crate::keys::{self, Public, Secret};
use crate::params::EncryptionParameters;
use crate::scalar::RawScalar;
use crate::scheme::Scheme;
use crate::value::{SchemeValuation, SchemeValue};

/// Key material that can encrypt: either half of a key pair.
pub trait Encryptor<S: Scheme> {
    fn context(&self) -> &Arc<SchemeContext>;
    fn key_id(&self) -> u64;
}

impl<S: Scheme> Encryptor<S> for Public<S> {
    fn context(&self) -> &Arc<SchemeContext> {
        Public::context(self)
    }

    fn key_id(&self) -> u64 {
        Public::key_id(self)
    }
}

impl<S: Scheme> Encryptor<S> for Secret<S> {
    fn context(&self) -> &Arc<SchemeContext> {
        Secret::context(self)
    }

    fn key_id(&self) -> u64 {
        Secret::key_id(self)
    }
}

/// Selects parameters for `source`, fetches the context from `cache` and
/// generates a key pair.
pub fn generate_keys<S: Scheme>(
    source: &impl KeySource,
    cache: &ContextCache,
    config: &SchemeConfig,
) -> Result<(Public<S>, Secret<S>), ExecError> {
    if source.scheme() != S::KIND {
        return Err(ExecError::config(format!(
            "keys for the {} scheme requested from a {} compilation",
            S::KIND,
            source.scheme()
        )));
    }
    let params = EncryptionParameters::select(S::KIND, source.requirements(), config)?;
    let context = cache.get_or_create(&params)?;
    let mut rng = config.rng();
    keys::generate(context, source.requirements(), &mut rng)
}

/// Encodes and encrypts `valuation` as `signature` describes each input.
///
/// Scalars are broadcast to the vector width; vectors are replicated to
/// fill the slots, so their length must divide the slot count. Encryption
/// randomness comes from fresh entropy; see [`encrypt_with`] for a seeded
/// source.
pub fn encrypt<S: Scheme>(
    encryptor: &impl Encryptor<S>,
    valuation: &Valuation,
    signature: &Signature,
) -> Result<SchemeValuation<S>, ExecError> {
    encrypt_with(encryptor, valuation, signature, &mut ChaCha20Rng::from_entropy())
}

/// [`encrypt`] drawing its randomness from `rng`, such as
/// [`SchemeConfig::rng`] for reproducible ciphertexts.
pub fn encrypt_with<S: Scheme>(
    encryptor: &impl Encryptor<S>,
    valuation: &Valuation,
    signature: &Signature,
    rng: &mut dyn RngCore,
) -> Result<SchemeValuation<S>, ExecError> {
    let context = encryptor.context();
    let slot_count = context.slot_count();
    let width = signature.vec_width as usize;
    if width == 0 || width > slot_count || slot_count % width != 0 {
        return Err(ExecError::config(format!(
            "vector width {width} does not divide the {slot_count} slots"
        )));
    }

    let mut encrypted = SchemeValuation::new();
    for (name, value) in valuation.iter() {
        let info = signature
            .input(name)
            .ok_or_else(|| ExecError::config(format!("signature has no input named '{name}'")))?;
        let slots = S::Scalar::from_plain(value)
            .map_err(|reason| ExecError::config(format!("input '{name}': {reason}")))?;
        let slots = match value.vector_len() {
            None => match slots.first() {
                Some(scalar) => vec![*scalar; width],
                None => return Err(ExecError::config(format!("input '{name}' is empty"))),
            },
            Some(len) if len > width || slot_count % len.max(1) != 0 => {
                return Err(ExecError::config(format!(
                    "input '{name}' has length {len}, which does not divide the {slot_count} slots of width {width}"
                )));
            }
            Some(_) => slots,
        };

        let entry = match info.ty {
            DataType::Raw => SchemeValue::Raw(replicate(&slots, width)?),
            DataType::Plain | DataType::Cipher => {
                let full = replicate(&slots, slot_count)?;
                let plain = S::encode(context, &full, info.scale_bits, info.level)?;
                if info.ty == DataType::Plain {
                    SchemeValue::Plain(plain)
                } else {
                    SchemeValue::Cipher(S::encrypt(context, encryptor.key_id(), &plain, rng)?)
                }
            }
        };
        encrypted.insert(name.clone(), entry);
    }
    debug!(scheme = %S::KIND, values = encrypted.len(), "encrypted valuation");
    Ok(encrypted)
}

/// Runs `graph` on encrypted `inputs` with the public half of a key pair.
pub fn execute<S: Scheme>(
    public: &Public<S>,
    graph: &Graph,
    inputs: &SchemeValuation<S>,
) -> Result<SchemeValuation<S>, ExecError> {
    let mut executor = SchemeExecutor::new(graph, public)?;
    executor.set_inputs(inputs)?;
    run(&mut executor, graph)
}

/// Decrypts and decodes `values`, keeping the first `vec_width` slots.
pub fn decrypt<S: Scheme>(
    secret: &Secret<S>,
    values: &SchemeValuation<S>,
    signature: &Signature,
) -> Result<Valuation, ExecError> {
    let context = secret.context();
    let width = signature.vec_width as usize;
    let mut decrypted = Valuation::new();
    for (name, value) in values.iter() {
        if let Some(expected) = signature.output(name) {
            if expected != value.data_type() {
                return Err(ExecError::config(format!(
                    "output '{name}' should be {expected}, got {}",
                    value.data_type()
                )));
            }
        }
        let slots = match value {
            SchemeValue::Cipher(cipher) => {
                let plain = S::decrypt(context, secret.secret_key(), cipher)?;
                S::decode(context, &plain)?
            }
            SchemeValue::Plain(plain) => S::decode(context, plain)?,
            SchemeValue::Raw(values) => values.clone(),
        };
        decrypted.insert(
            name.clone(),
            S::Scalar::into_plain(slots.into_iter().take(width).collect()),
        );
    }
    Ok(decrypted)
}
