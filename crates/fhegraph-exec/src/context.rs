//! Scheme contexts and the injectable context cache.
//!
//! Deriving a context is the expensive step of key generation and
//! deserialization, so contexts are shared through [`ContextCache`]. Entries
//! are `Arc`s; an entry whose only owner is the cache itself is dead weight
//! and is evicted the next time a different parameter set is requested.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use fhegraph_core::scheme::SchemeKind;

use crate::error::ExecError;
use crate::params::EncryptionParameters;
use crate::scheme::bitwise::NativeHeap;

/// Parameters plus the state derived from them.
#[derive(Debug)]
pub struct SchemeContext {
    params: EncryptionParameters,
    slot_count: usize,
    max_level: u32,
    derived: Derived,
}

#[derive(Debug)]
enum Derived {
    /// Galois element of every left rotation step within one row.
    Packed { galois: Vec<u64> },
    /// Backing store of the gate-level scheme's native ciphertexts.
    Bitwise { heap: Arc<NativeHeap> },
}

impl SchemeContext {
    pub fn derive(params: &EncryptionParameters) -> Result<Self, ExecError> {
        params.validate()?;
        let derived = match params.scheme {
            SchemeKind::Ckks | SchemeKind::Bfv => {
                let two_n = 2 * params.poly_modulus_degree;
                let row = (params.poly_modulus_degree / 2) as usize;
                let mut galois = Vec::with_capacity(row);
                let mut element = 1u64;
                for _ in 0..row {
                    galois.push(element);
                    element = element * 5 % two_n;
                }
                Derived::Packed { galois }
            }
            SchemeKind::Bitwise => Derived::Bitwise {
                heap: Arc::new(NativeHeap::new()),
            },
        };
        Ok(SchemeContext {
            slot_count: params.slot_count(),
            max_level: params.max_level(),
            params: params.clone(),
            derived,
        })
    }

    pub fn params(&self) -> &EncryptionParameters {
        &self.params
    }

    pub fn scheme(&self) -> SchemeKind {
        self.params.scheme
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Slots rotated together by one Galois automorphism.
    pub fn row_size(&self) -> usize {
        match &self.derived {
            Derived::Packed { galois } => galois.len(),
            Derived::Bitwise { .. } => 1,
        }
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Galois element of a signed rotation step; `None` for schemes that
    /// rotate without keys.
    pub fn galois_element(&self, step: i32) -> Option<u64> {
        match &self.derived {
            Derived::Packed { galois } => {
                let index = i64::from(step).rem_euclid(galois.len() as i64) as usize;
                galois.get(index).copied()
            }
            Derived::Bitwise { .. } => None,
        }
    }

    pub fn native_heap(&self) -> Option<&Arc<NativeHeap>> {
        match &self.derived {
            Derived::Bitwise { heap } => Some(heap),
            Derived::Packed { .. } => None,
        }
    }
}

/// Shared [`SchemeContext`]s keyed by their parameters.
#[derive(Debug)]
pub struct ContextCache {
    capacity: usize,
    entries: Mutex<HashMap<EncryptionParameters, Arc<SchemeContext>>>,
}

impl Default for ContextCache {
    fn default() -> Self {
        ContextCache::with_capacity(ContextCache::DEFAULT_CAPACITY)
    }
}

impl ContextCache {
    pub const DEFAULT_CAPACITY: usize = 8;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ContextCache {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the context for `params`, deriving it on a miss.
    ///
    /// Eviction, lookup and insertion happen under one lock. When the cache
    /// is full of live contexts the new one is handed out uncached.
    pub fn get_or_create(
        &self,
        params: &EncryptionParameters,
    ) -> Result<Arc<SchemeContext>, ExecError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ExecError::config("context cache lock poisoned"))?;

        let before = entries.len();
        entries.retain(|key, context| key == params || Arc::strong_count(context) > 1);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted unused scheme contexts");
        }

        if let Some(context) = entries.get(params) {
            debug!(scheme = %params.scheme, "scheme context cache hit");
            return Ok(Arc::clone(context));
        }

        let context = Arc::new(SchemeContext::derive(params)?);
        if entries.len() >= self.capacity {
            warn!(
                scheme = %params.scheme,
                capacity = self.capacity,
                "scheme context cache full, returning an uncached context"
            );
            return Ok(context);
        }
        debug!(scheme = %params.scheme, degree = params.poly_modulus_degree, "scheme context cache miss");
        entries.insert(params.clone(), Arc::clone(&context));
        Ok(context)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
