//! Capability-scoped serialization for fhegraph.
//!
//! Key material, compiled graphs and valuations cross party boundaries as
//! blobs. Each blob is a digest-checked [`envelope`]; what a key bundle
//! contains is chosen per party with [`CapabilityFlags`].
//!
//! # Modules
//!
//! - [`error`]: WireError enum with all failure modes
//! - [`capability`]: CapabilityFlags and role presets
//! - [`envelope`]: framing, format/kind/scheme checks and blake3 digests
//! - [`convert`]: Graph and group decompose/recompose functions
//! - [`keys`]: KeyBundle serialization and `require_*` accessors
//! - [`valuation`]: tagged valuation blobs

pub mod capability;
pub mod convert;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod valuation;

pub use capability::CapabilityFlags;
pub use convert::{
    decompose, decompose_compiled_group, decompose_group, recompose, recompose_group,
    recompose_in, GraphRecord, GroupRecord,
};
pub use envelope::{BlobKind, Envelope, FORMAT};
pub use error::WireError;
pub use keys::KeyBundle;
pub use valuation::{decode_valuation, encode_valuation, Expected, ValueTag};
