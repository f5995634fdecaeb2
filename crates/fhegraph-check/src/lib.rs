//! Static passes over fhegraph graphs: validation, type-lattice inference,
//! backend lowering and key-requirement analysis, tied together by
//! [`compile`].

pub mod analysis;
pub mod compile;
pub mod decision;
pub mod error;
pub mod lowering;
pub mod traversal;
pub mod typecheck;

pub use analysis::KeyRequirements;
pub use compile::{compile, compile_group, CompileOptions, CompiledGraph, CompiledGroup, KeySource};
pub use decision::{infer_group_scheme, infer_scheme, NumericUsage};
pub use error::CompileError;
pub use typecheck::{infer_types, validate_graph, TypeError, TypeMap};
