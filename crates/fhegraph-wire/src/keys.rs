//! Key bundles: the capability-scoped blob each party receives.
//!
//! A bundle always records the encryption parameters, so any holder can
//! rebuild the shared [`SchemeContext`]. Every other section is present only
//! when its [`CapabilityFlags`] bit was set at serialization time.
//!
//! A bundle describes either one compiled graph or a whole compiled group.
//! A group bundle carries every member graph in one record, on one index
//! space, and one signature per member, so a server can run any member
//! from a single blob.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fhegraph_check::{CompiledGraph, CompiledGroup, KeyRequirements};
use fhegraph_core::graph::Graph;
use fhegraph_core::group::GraphGroup;
use fhegraph_core::scheme::SchemeKind;
use fhegraph_core::signature::Signature;
use fhegraph_exec::{
    ContextCache, EncryptionParameters, EvaluationKeys, ExecError, Public, PublicKey, Scheme,
    SchemeContext, Secret, SecretKey,
};

use crate::capability::CapabilityFlags;
use crate::convert::{
    decompose, decompose_compiled_group, recompose, recompose_group, GraphRecord, GroupRecord,
};
use crate::envelope::{self, BlobKind};
use crate::error::WireError;

#[derive(Debug, Serialize, Deserialize)]
struct BundlePayload {
    flags: CapabilityFlags,
    params: EncryptionParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    graph: Option<GraphRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<GroupRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requirements: Option<KeyRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<Signature>,
    /// Member signatures of a group bundle, by graph name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signatures: Option<IndexMap<String, Signature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_key: Option<PublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    evaluation_keys: Option<EvaluationKeys>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret_key: Option<SecretKey>,
}

/// A deserialized bundle holding only the sections its flags selected.
pub struct KeyBundle<S: Scheme> {
    flags: CapabilityFlags,
    context: Arc<SchemeContext>,
    public: Option<Public<S>>,
    secret: Option<Secret<S>>,
    graph: Option<Graph>,
    group: Option<GraphGroup>,
    signature: Option<Signature>,
    signatures: Option<IndexMap<String, Signature>>,
    requirements: Option<KeyRequirements>,
}

/// What a bundle describes: one compiled graph or a compiled group.
#[derive(Clone, Copy)]
enum Compilation<'a> {
    Graph(&'a CompiledGraph),
    Group(&'a CompiledGroup),
}

impl<'a> Compilation<'a> {
    fn scheme(self) -> SchemeKind {
        match self {
            Compilation::Graph(compiled) => compiled.scheme,
            Compilation::Group(compiled) => compiled.scheme,
        }
    }

    fn requirements(self) -> &'a KeyRequirements {
        match self {
            Compilation::Graph(compiled) => &compiled.requirements,
            Compilation::Group(compiled) => &compiled.requirements,
        }
    }
}

impl<S: Scheme> KeyBundle<S> {
    /// Writes exactly the sections `flags` selects.
    ///
    /// Fails with [`WireError::MissingSection`] when a selected section's
    /// material is not supplied. At least one half of the key pair is needed
    /// to know the parameters.
    pub fn serialize(
        public: Option<&Public<S>>,
        secret: Option<&Secret<S>>,
        compiled: Option<&CompiledGraph>,
        flags: CapabilityFlags,
    ) -> Result<Vec<u8>, WireError> {
        Self::seal(public, secret, compiled.map(Compilation::Graph), flags)
    }

    /// [`serialize`](Self::serialize) for a compiled group: the node info
    /// section holds every member and the signature section one signature
    /// per member.
    pub fn serialize_group(
        public: Option<&Public<S>>,
        secret: Option<&Secret<S>>,
        compiled: Option<&CompiledGroup>,
        flags: CapabilityFlags,
    ) -> Result<Vec<u8>, WireError> {
        Self::seal(public, secret, compiled.map(Compilation::Group), flags)
    }

    fn seal(
        public: Option<&Public<S>>,
        secret: Option<&Secret<S>>,
        compiled: Option<Compilation<'_>>,
        flags: CapabilityFlags,
    ) -> Result<Vec<u8>, WireError> {
        let params = match (public, secret) {
            (Some(public), Some(secret)) => {
                if public.key_id() != secret.key_id()
                    || public.context().params() != secret.context().params()
                {
                    return Err(WireError::Exec(ExecError::Configuration {
                        reason: "public and secret halves belong to different key pairs".into(),
                    }));
                }
                public.context().params().clone()
            }
            (Some(public), None) => public.context().params().clone(),
            (None, Some(secret)) => secret.context().params().clone(),
            (None, None) => return Err(WireError::MissingSection { section: "parameters" }),
        };
        if let Some(compiled) = compiled {
            if compiled.scheme() != S::KIND {
                return Err(WireError::SchemeMismatch {
                    expected: S::KIND,
                    found: compiled.scheme(),
                });
            }
        }

        let need_compiled = |section: &'static str| {
            compiled.ok_or(WireError::MissingSection { section })
        };
        let need_public = |section: &'static str| public.ok_or(WireError::MissingSection { section });

        let mut payload = BundlePayload {
            flags,
            params,
            graph: None,
            group: None,
            requirements: None,
            signature: None,
            signatures: None,
            public_key: None,
            evaluation_keys: None,
            secret_key: None,
        };
        if flags.need_node_info {
            match need_compiled("node info")? {
                Compilation::Graph(compiled) => payload.graph = Some(decompose(&compiled.graph)),
                Compilation::Group(compiled) => {
                    payload.group = Some(decompose_compiled_group(compiled))
                }
            }
        }
        if flags.need_genkey_info {
            payload.requirements = Some(need_compiled("key generation info")?.requirements().clone());
        }
        if flags.need_sig_info {
            match need_compiled("signature")? {
                Compilation::Graph(compiled) => payload.signature = Some(compiled.signature.clone()),
                Compilation::Group(compiled) => {
                    payload.signatures = Some(
                        compiled
                            .graphs
                            .iter()
                            .map(|(name, member)| (name.clone(), member.signature.clone()))
                            .collect(),
                    )
                }
            }
        }
        if flags.need_encrypt_ctx {
            payload.public_key = Some(need_public("encryption context")?.public_key().clone());
        }
        if flags.need_exe_ctx {
            let public = need_public("execution context")?;
            let keys = public
                .evaluation_keys()
                .ok_or(WireError::MissingSection { section: "evaluation keys" })?;
            payload.public_key = Some(public.public_key().clone());
            payload.evaluation_keys = Some(keys.clone());
        }
        if flags.need_decrypt_ctx {
            let secret = secret.ok_or(WireError::MissingSection {
                section: "decryption context",
            })?;
            payload.secret_key = Some(secret.secret_key().clone());
        }

        debug!(scheme = %S::KIND, ?flags, "serializing key bundle");
        envelope::seal(BlobKind::KeyBundle, S::KIND, &payload)
    }

    /// Reads a bundle, fetching its context from `cache`.
    pub fn deserialize(bytes: &[u8], cache: &ContextCache) -> Result<Self, WireError> {
        let payload: BundlePayload = envelope::open(bytes, BlobKind::KeyBundle, S::KIND)?;
        if payload.params.scheme != S::KIND {
            return Err(WireError::SchemeMismatch {
                expected: S::KIND,
                found: payload.params.scheme,
            });
        }
        check_sections(&payload)?;

        let context = cache.get_or_create(&payload.params)?;
        let public = match payload.public_key {
            Some(key) => Some(Public::new(Arc::clone(&context), key, payload.evaluation_keys)?),
            None => None,
        };
        let secret = match payload.secret_key {
            Some(key) => {
                let secret = Secret::new(Arc::clone(&context), key)?;
                if let Some(public) = &public {
                    if public.key_id() != secret.key_id() {
                        return Err(malformed("secret key does not match the public key"));
                    }
                }
                Some(secret)
            }
            None => None,
        };
        let graph = payload.graph.map(recompose).transpose()?;
        let group = payload.group.map(recompose_group).transpose()?;

        debug!(scheme = %S::KIND, flags = ?payload.flags, "deserialized key bundle");
        Ok(KeyBundle {
            flags: payload.flags,
            context,
            public,
            secret,
            graph,
            group,
            signature: payload.signature,
            signatures: payload.signatures,
            requirements: payload.requirements,
        })
    }

    pub fn flags(&self) -> CapabilityFlags {
        self.flags
    }

    pub fn context(&self) -> &Arc<SchemeContext> {
        &self.context
    }

    pub fn public(&self) -> Option<&Public<S>> {
        self.public.as_ref()
    }

    pub fn secret(&self) -> Option<&Secret<S>> {
        self.secret.as_ref()
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    pub fn group(&self) -> Option<&GraphGroup> {
        self.group.as_ref()
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// The signature of one member of a group bundle.
    pub fn member_signature(&self, name: &str) -> Option<&Signature> {
        self.signatures.as_ref()?.get(name)
    }

    pub fn requirements(&self) -> Option<&KeyRequirements> {
        self.requirements.as_ref()
    }

    pub fn require_public(&self) -> Result<&Public<S>, WireError> {
        self.public()
            .ok_or_else(|| WireError::absent("bundle carries no public key"))
    }

    pub fn require_secret(&self) -> Result<&Secret<S>, WireError> {
        self.secret()
            .ok_or_else(|| WireError::absent("bundle carries no secret key"))
    }

    pub fn require_graph(&self) -> Result<&Graph, WireError> {
        self.graph()
            .ok_or_else(|| WireError::absent("bundle carries no graph"))
    }

    pub fn require_group(&self) -> Result<&GraphGroup, WireError> {
        self.group()
            .ok_or_else(|| WireError::absent("bundle carries no graph group"))
    }

    pub fn require_signature(&self) -> Result<&Signature, WireError> {
        self.signature()
            .ok_or_else(|| WireError::absent("bundle carries no signature"))
    }

    pub fn require_member_signature(&self, name: &str) -> Result<&Signature, WireError> {
        self.member_signature(name).ok_or_else(|| {
            WireError::absent(format!("bundle carries no signature for member '{name}'"))
        })
    }

    pub fn require_requirements(&self) -> Result<&KeyRequirements, WireError> {
        self.requirements()
            .ok_or_else(|| WireError::absent("bundle carries no key requirements"))
    }
}

impl<S: Scheme> fmt::Debug for KeyBundle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBundle")
            .field("scheme", &S::KIND)
            .field("flags", &self.flags)
            .field("public", &self.public)
            .field("secret", &self.secret)
            .field("graph", &self.graph.as_ref().map(Graph::name))
            .field("group", &self.group.as_ref().map(GraphGroup::name))
            .finish_non_exhaustive()
    }
}

/// The sections present must be the ones the recorded flags promise.
fn check_sections(payload: &BundlePayload) -> Result<(), WireError> {
    let flags = &payload.flags;
    if payload.graph.is_some() && payload.group.is_some() {
        return Err(malformed("bundle carries both a graph and a graph group"));
    }
    if payload.signature.is_some() && payload.signatures.is_some() {
        return Err(malformed("bundle carries both a signature and member signatures"));
    }
    let node_info = payload.graph.is_some() || payload.group.is_some();
    let signature = payload.signature.is_some() || payload.signatures.is_some();
    let checks = [
        ("graph", flags.need_node_info, node_info),
        ("requirements", flags.need_genkey_info, payload.requirements.is_some()),
        ("signature", flags.need_sig_info, signature),
        ("public key", flags.carries_public_key(), payload.public_key.is_some()),
        ("evaluation keys", flags.need_exe_ctx, payload.evaluation_keys.is_some()),
        ("secret key", flags.need_decrypt_ctx, payload.secret_key.is_some()),
    ];
    for (section, promised, present) in checks {
        if promised != present {
            return Err(malformed(format!(
                "section '{section}' is {} but the flags say otherwise",
                if present { "present" } else { "absent" }
            )));
        }
    }
    Ok(())
}

fn malformed(reason: impl Into<String>) -> WireError {
    WireError::Exec(ExecError::Serialization {
        reason: reason.into(),
    })
}
