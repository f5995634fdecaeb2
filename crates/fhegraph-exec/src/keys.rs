//! Key material and key generation.
//!
//! [`Public`] and [`Secret`] are independent halves of a key pair; either can
//! exist (and be serialized) without the other. Both carry the shared
//! [`SchemeContext`] they were generated for.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fhegraph_check::KeyRequirements;

use crate::context::SchemeContext;
use crate::error::ExecError;
use crate::scheme::{Evaluator, Scheme};

const PUBLIC_KEY_CONTEXT: &str = "fhegraph 2026-10 public key derivation";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey {
    seed: [u8; 32],
}

impl SecretKey {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        SecretKey { seed }
    }

    pub fn public_key(&self) -> PublicKey {
        let material = blake3::derive_key(PUBLIC_KEY_CONTEXT, &self.seed);
        PublicKey {
            key_id: key_id_of(&material),
            material,
        }
    }

    pub fn key_id(&self) -> u64 {
        self.public_key().key_id
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    /// Fingerprint shared by the pair and every ciphertext it produces.
    pub key_id: u64,
    pub material: [u8; 32],
}

impl PublicKey {
    /// Whether `key_id` really fingerprints `material`.
    pub fn is_consistent(&self) -> bool {
        key_id_of(&self.material) == self.key_id
    }
}

fn key_id_of(material: &[u8; 32]) -> u64 {
    let mut id = [0u8; 8];
    id.copy_from_slice(&material[..8]);
    u64::from_le_bytes(id)
}

/// Relinearization and Galois keys; for the bitwise scheme, the server key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationKeys {
    pub key_id: u64,
    pub relin: bool,
    pub galois_elements: BTreeSet<u64>,
}

/// What the computing party holds.
pub struct Public<S: Scheme> {
    context: Arc<SchemeContext>,
    public_key: PublicKey,
    evaluation_keys: Option<EvaluationKeys>,
    _scheme: PhantomData<fn() -> S>,
}

impl<S: Scheme> Public<S> {
    /// Assembles public material, checking that its parts belong together.
    pub fn new(
        context: Arc<SchemeContext>,
        public_key: PublicKey,
        evaluation_keys: Option<EvaluationKeys>,
    ) -> Result<Self, ExecError> {
        check_scheme::<S>(&context)?;
        if !public_key.is_consistent() {
            return Err(ExecError::config("public key fingerprint does not match its material"));
        }
        if let Some(keys) = &evaluation_keys {
            if keys.key_id != public_key.key_id {
                return Err(ExecError::config(format!(
                    "evaluation keys belong to key {:016x}, public key is {:016x}",
                    keys.key_id, public_key.key_id
                )));
            }
        }
        Ok(Public {
            context,
            public_key,
            evaluation_keys,
            _scheme: PhantomData,
        })
    }

    pub fn context(&self) -> &Arc<SchemeContext> {
        &self.context
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn key_id(&self) -> u64 {
        self.public_key.key_id
    }

    pub fn evaluation_keys(&self) -> Option<&EvaluationKeys> {
        self.evaluation_keys.as_ref()
    }

    /// The encryption-only half: same key, no evaluation keys.
    pub fn without_evaluation_keys(&self) -> Self {
        Public {
            context: Arc::clone(&self.context),
            public_key: self.public_key.clone(),
            evaluation_keys: None,
            _scheme: PhantomData,
        }
    }

    pub fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&self.context, self.evaluation_keys.as_ref())
    }
}

impl<S: Scheme> Clone for Public<S> {
    fn clone(&self) -> Self {
        Public {
            context: Arc::clone(&self.context),
            public_key: self.public_key.clone(),
            evaluation_keys: self.evaluation_keys.clone(),
            _scheme: PhantomData,
        }
    }
}

impl<S: Scheme> fmt::Debug for Public<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Public")
            .field("scheme", &S::KIND)
            .field("key_id", &format_args!("{:016x}", self.public_key.key_id))
            .field("evaluation_keys", &self.evaluation_keys)
            .finish()
    }
}

/// What the decrypting party holds.
pub struct Secret<S: Scheme> {
    context: Arc<SchemeContext>,
    secret_key: SecretKey,
    _scheme: PhantomData<fn() -> S>,
}

impl<S: Scheme> Secret<S> {
    pub fn new(context: Arc<SchemeContext>, secret_key: SecretKey) -> Result<Self, ExecError> {
        check_scheme::<S>(&context)?;
        Ok(Secret {
            context,
            secret_key,
            _scheme: PhantomData,
        })
    }

    pub fn context(&self) -> &Arc<SchemeContext> {
        &self.context
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn key_id(&self) -> u64 {
        self.secret_key.key_id()
    }
}

impl<S: Scheme> Clone for Secret<S> {
    fn clone(&self) -> Self {
        Secret {
            context: Arc::clone(&self.context),
            secret_key: self.secret_key.clone(),
            _scheme: PhantomData,
        }
    }
}

impl<S: Scheme> fmt::Debug for Secret<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("scheme", &S::KIND)
            .field("key_id", &format_args!("{:016x}", self.key_id()))
            .finish_non_exhaustive()
    }
}

fn check_scheme<S: Scheme>(context: &SchemeContext) -> Result<(), ExecError> {
    if context.scheme() == S::KIND {
        Ok(())
    } else {
        Err(ExecError::config(format!(
            "context is for the {} scheme, not {}",
            context.scheme(),
            S::KIND
        )))
    }
}

/// Generates a key pair covering `requirements` in `context`.
pub fn generate<S: Scheme>(
    context: Arc<SchemeContext>,
    requirements: &KeyRequirements,
    rng: &mut dyn RngCore,
) -> Result<(Public<S>, Secret<S>), ExecError> {
    check_scheme::<S>(&context)?;

    let mut seed = [0u8; 32];
    rng.fill_bytes(&mut seed);
    let secret_key = SecretKey::from_seed(seed);
    let public_key = secret_key.public_key();

    let mut galois_elements = BTreeSet::new();
    if S::KIND.capabilities().rotation_keys {
        for step in &requirements.rotation_steps {
            let element = context.galois_element(*step).ok_or_else(|| {
                ExecError::config(format!("no Galois element for rotation step {step}"))
            })?;
            galois_elements.insert(element);
        }
    }
    let evaluation_keys = EvaluationKeys {
        key_id: public_key.key_id,
        relin: requirements.needs_relin,
        galois_elements,
    };

    debug!(
        scheme = %S::KIND,
        key_id = %format_args!("{:016x}", public_key.key_id),
        galois = evaluation_keys.galois_elements.len(),
        relin = evaluation_keys.relin,
        "generated key pair"
    );

    let public = Public::new(Arc::clone(&context), public_key, Some(evaluation_keys))?;
    let secret = Secret::new(context, secret_key)?;
    Ok((public, secret))
}
