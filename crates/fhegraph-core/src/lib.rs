pub mod edge;
pub mod error;
pub mod graph;
pub mod group;
pub mod id;
pub mod node;
pub mod ops;
pub mod scheme;
pub mod signature;
pub mod types;
pub mod valuation;

// Re-export commonly used types
pub use error::CoreError;
pub use graph::Graph;
pub use group::GraphGroup;
pub use id::{IndexSpace, NodeId};
pub use node::Node;
pub use ops::{BinaryOp, MacroOp, Op};
pub use scheme::{Capabilities, SchemeKind};
pub use signature::{EncodingInfo, Signature};
pub use types::{ConstValue, DataType};
pub use valuation::{PlainValue, Valuation};
