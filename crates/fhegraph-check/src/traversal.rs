//! Dependency-ordered traversal of a graph.
//!
//! Every pass and every executor walks nodes in the order produced here: a
//! node is emitted only after all of its operands, and among ready nodes the
//! smallest id goes first so the order is deterministic.

use std::collections::{BTreeSet, HashMap};

use fhegraph_core::error::CoreError;
use fhegraph_core::graph::Graph;
use fhegraph_core::id::NodeId;

/// Returns every node of `graph` in dependency order.
///
/// Fails with [`CoreError::GraphInconsistency`] if the operand edges contain
/// a cycle.
pub fn forward_order(graph: &Graph) -> Result<Vec<NodeId>, CoreError> {
    let mut pending: HashMap<NodeId, usize> = HashMap::new();
    let mut ready: BTreeSet<NodeId> = BTreeSet::new();

    for id in graph.node_ids() {
        match graph.operands(id).len() {
            0 => {
                ready.insert(id);
            }
            count => {
                pending.insert(id, count);
            }
        }
    }

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(id) = ready.pop_first() {
        order.push(id);
        for (consumer, _) in graph.uses(id) {
            if let Some(count) = pending.get_mut(&consumer) {
                *count -= 1;
                if *count == 0 {
                    pending.remove(&consumer);
                    ready.insert(consumer);
                }
            }
        }
    }

    if let Some(stuck) = pending.keys().min() {
        return Err(CoreError::GraphInconsistency {
            reason: format!("operand cycle through node {}", stuck),
        });
    }
    Ok(order)
}

/// Number of consumer edges per node, used to release values after their
/// last use.
pub fn use_counts(graph: &Graph) -> HashMap<NodeId, usize> {
    graph
        .node_ids()
        .into_iter()
        .map(|id| (id, graph.use_count(id)))
        .collect()
}
