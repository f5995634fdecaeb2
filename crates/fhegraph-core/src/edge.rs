//! Operand edges of the graph.

use serde::{Deserialize, Serialize};

/// Data dependency from an operand (edge source) to its consumer (edge
/// target). `port` is the operand position in the consumer's operand list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperandEdge {
    pub port: u16,
}
