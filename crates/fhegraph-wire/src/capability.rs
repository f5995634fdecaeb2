//! Capability flags selecting which sections a key bundle carries.
//!
//! Each party of a computation gets a bundle holding only what its role
//! needs. The presets name the usual roles; flags can also be combined
//! freely with [`CapabilityFlags::union`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    /// The compiled graph.
    pub need_node_info: bool,
    /// Key requirements, enough to generate fresh keys for the parameters.
    pub need_genkey_info: bool,
    /// The encoding signature.
    pub need_sig_info: bool,
    /// Public key plus evaluation keys: enough to encrypt and execute.
    pub need_exe_ctx: bool,
    /// Public key alone: enough to encrypt.
    pub need_encrypt_ctx: bool,
    /// Secret key.
    pub need_decrypt_ctx: bool,
}

impl CapabilityFlags {
    pub fn none() -> Self {
        Self::default()
    }

    /// Everything: the party that generated the keys.
    pub fn key_owner() -> Self {
        CapabilityFlags {
            need_node_info: true,
            need_genkey_info: true,
            need_sig_info: true,
            need_exe_ctx: true,
            need_encrypt_ctx: true,
            need_decrypt_ctx: true,
        }
    }

    /// The party that runs the graph on encrypted inputs.
    pub fn compute_server() -> Self {
        CapabilityFlags {
            need_node_info: true,
            need_genkey_info: true,
            need_sig_info: true,
            need_exe_ctx: true,
            ..Self::default()
        }
    }

    /// The party that reads results.
    pub fn decrypting_client() -> Self {
        CapabilityFlags {
            need_sig_info: true,
            need_decrypt_ctx: true,
            ..Self::default()
        }
    }

    /// A party that only contributes encrypted inputs.
    pub fn encrypting_client() -> Self {
        CapabilityFlags {
            need_sig_info: true,
            need_encrypt_ctx: true,
            ..Self::default()
        }
    }

    pub fn union(self, other: Self) -> Self {
        CapabilityFlags {
            need_node_info: self.need_node_info || other.need_node_info,
            need_genkey_info: self.need_genkey_info || other.need_genkey_info,
            need_sig_info: self.need_sig_info || other.need_sig_info,
            need_exe_ctx: self.need_exe_ctx || other.need_exe_ctx,
            need_encrypt_ctx: self.need_encrypt_ctx || other.need_encrypt_ctx,
            need_decrypt_ctx: self.need_decrypt_ctx || other.need_decrypt_ctx,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::none()
    }

    /// Whether the bundle carries the public key, with or without
    /// evaluation keys.
    pub fn carries_public_key(&self) -> bool {
        self.need_exe_ctx || self.need_encrypt_ctx
    }
}
