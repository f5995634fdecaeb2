//! Key generation, encryption and execution of compiled fhegraph graphs.
//!
//! Three reference schemes implement [`Scheme`]: [`Ckks`] (approximate
//! reals), [`Bfv`] (exact integers) and [`Bitwise`] (small integers with
//! native handles). One generic [`SchemeExecutor`] runs any of them.
//!
//! ```ignore
//! let compiled = compile(&graph, &CompileOptions::new(SchemeKind::Ckks))?;
//! let cache = ContextCache::new();
//! let (public, secret) = generate_keys::<Ckks>(&compiled, &cache, &SchemeConfig::default())?;
//! let inputs = encrypt(&public, &valuation, &compiled.signature)?;
//! let outputs = execute(&public, &compiled.graph, &inputs)?;
//! let result = decrypt(&secret, &outputs, &compiled.signature)?;
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod keys;
pub mod params;
pub mod scalar;
pub mod scheme;
pub mod value;

pub use api::{decrypt, encrypt, encrypt_with, execute, generate_keys, Encryptor};
pub use config::SchemeConfig;
pub use context::{ContextCache, SchemeContext};
pub use error::{EvalError, ExecError};
pub use executor::{run, Executor, SchemeExecutor};
pub use keys::{EvaluationKeys, Public, PublicKey, Secret, SecretKey};
pub use params::EncryptionParameters;
pub use scalar::RawScalar;
pub use scheme::{Bfv, Bitwise, Ckks, Evaluator, Scheme};
pub use value::{MergePolicy, SchemeValuation, SchemeValue};
