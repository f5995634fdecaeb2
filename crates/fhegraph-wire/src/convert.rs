//! Decompose/recompose conversions between [`Graph`] and its flat record.
//!
//! [`decompose`] breaks a graph into a [`GraphRecord`]: its nodes in id order
//! and one `(consumer, port, operand)` triple per operand edge. [`recompose`]
//! rebuilds the graph through [`Graph::from_parts`], which restores the
//! input/output maps and re-checks every arity. Ids survive unchanged,
//! including the gaps left behind by dead-node removal.
//!
//! Groups travel as a [`GroupRecord`]. [`recompose_group`] puts every member
//! back on one index space that continues past the largest id any member
//! holds, so graphs added after the round trip cannot collide.

use serde::{Deserialize, Serialize};

use fhegraph_check::CompiledGroup;
use fhegraph_core::error::CoreError;
use fhegraph_core::graph::Graph;
use fhegraph_core::group::GraphGroup;
use fhegraph_core::id::{IndexSpace, NodeId};
use fhegraph_core::node::Node;

/// Flat, serializable form of a [`Graph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub name: String,
    pub vec_width: u32,
    /// First id the rebuilt graph may allocate.
    pub next_index: u64,
    pub nodes: Vec<Node>,
    /// `(consumer, port, operand)` triples.
    pub operands: Vec<(NodeId, u16, NodeId)>,
}

pub fn decompose(graph: &Graph) -> GraphRecord {
    let mut nodes = Vec::with_capacity(graph.node_count());
    let mut operands = Vec::new();
    for id in graph.node_ids() {
        if let Some(node) = graph.node(id) {
            nodes.push(node.clone());
        }
        for (port, operand) in graph.operands(id).into_iter().enumerate() {
            operands.push((id, port as u16, operand));
        }
    }
    GraphRecord {
        name: graph.name().to_string(),
        vec_width: graph.vec_width(),
        next_index: graph.next_index(),
        nodes,
        operands,
    }
}

/// Rebuilds a graph with a fresh index space starting at `next_index`.
pub fn recompose(record: GraphRecord) -> Result<Graph, CoreError> {
    let space = IndexSpace::starting_at(record.next_index);
    recompose_in(record, space)
}

/// Rebuilds a graph allocating from `space`, so that members of one group
/// keep sharing ids after a round trip.
pub fn recompose_in(record: GraphRecord, space: IndexSpace) -> Result<Graph, CoreError> {
    space.advance_to(record.next_index);
    Graph::from_parts(
        record.name,
        record.vec_width,
        record.nodes,
        record.operands,
        space,
    )
}

/// Flat, serializable form of a [`GraphGroup`]; members in group order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    /// First id the rebuilt group may allocate.
    pub next_index: u64,
    pub members: Vec<GraphRecord>,
}

pub fn decompose_group(group: &GraphGroup) -> GroupRecord {
    GroupRecord {
        name: group.name().to_string(),
        next_index: group.next_index(),
        members: group.graphs().map(decompose).collect(),
    }
}

/// Records the lowered members of a compiled group.
pub fn decompose_compiled_group(compiled: &CompiledGroup) -> GroupRecord {
    let members: Vec<GraphRecord> = compiled
        .graphs
        .values()
        .map(|member| decompose(&member.graph))
        .collect();
    let next_index = members
        .iter()
        .map(|member| member.next_index)
        .max()
        .unwrap_or(0);
    GroupRecord {
        name: compiled.name.clone(),
        next_index,
        members,
    }
}

/// Rebuilds a group whose members share one index space.
///
/// Members are adopted one by one, so colliding ids and overlapping input
/// names are rejected as they would be when building the group.
pub fn recompose_group(record: GroupRecord) -> Result<GraphGroup, CoreError> {
    let mut group = GraphGroup::with_space(record.name, IndexSpace::starting_at(record.next_index));
    for member in record.members {
        group.add_graph(recompose(member)?)?;
    }
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhegraph_core::ops::Op;
    use fhegraph_core::types::{ConstValue, DataType};

    fn build_test_graph() -> Graph {
        let mut graph = Graph::new("affine", 4).unwrap();
        let x = graph.declare_input("x", DataType::Cipher).unwrap();
        let w = graph.declare_input("w", DataType::Plain).unwrap();
        let b = graph.constant(ConstValue::Float(vec![0.5, 1.5])).unwrap();
        let wx = graph.mul(x, w).unwrap();
        let y = graph.sub(wx, b).unwrap();
        let turned = graph.rotate_left(y, 1).unwrap();
        graph.declare_output("y", turned).unwrap();
        graph
    }

    #[test]
    fn decompose_recompose_roundtrip() {
        let graph = build_test_graph();
        let record = decompose(&graph);
        assert_eq!(record.nodes.len(), graph.node_count());

        let rebuilt = recompose(record.clone()).unwrap();
        assert_eq!(rebuilt.name(), "affine");
        assert_eq!(rebuilt.vec_width(), 4);
        assert_eq!(rebuilt.node_ids(), graph.node_ids());
        assert_eq!(rebuilt.inputs(), graph.inputs());
        assert_eq!(rebuilt.outputs(), graph.outputs());
        for id in graph.node_ids() {
            assert_eq!(rebuilt.node(id), graph.node(id));
            assert_eq!(rebuilt.operands(id), graph.operands(id));
        }
        assert_eq!(decompose(&rebuilt), record);
    }

    #[test]
    fn ids_keep_their_gaps() {
        let mut graph = build_test_graph();
        let x = graph.input_node("x").unwrap();
        let spare = graph.negate(x).unwrap();
        let twice = graph.negate(spare).unwrap();
        let y = graph.output_source("y").unwrap();
        graph.replace_all_uses_with(y, twice).unwrap();
        assert!(graph.remove_dead_nodes() > 0);

        let rebuilt = recompose(decompose(&graph)).unwrap();
        assert_eq!(rebuilt.node_ids(), graph.node_ids());
        assert_eq!(rebuilt.next_index(), graph.next_index());

        // New nodes never collide with recovered ones.
        let mut rebuilt = rebuilt;
        let fresh = rebuilt.negate(twice).unwrap();
        assert!(!graph.contains(fresh));
    }

    #[test]
    fn shared_spaces_advance_past_every_member() {
        let space = IndexSpace::new();
        let rebuilt = recompose_in(decompose(&build_test_graph()), space.clone()).unwrap();
        assert_eq!(space.peek(), rebuilt.next_index());
        assert!(space.is_shared_with(rebuilt.space()));
    }

    #[test]
    fn arity_is_rechecked() {
        let mut record = decompose(&build_test_graph());
        record.operands.pop();
        assert!(matches!(
            recompose(record),
            Err(CoreError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut record = decompose(&build_test_graph());
        let first = record.nodes[0].clone();
        record.nodes.push(Node::new(first.id, Op::Negate));
        assert!(recompose(record).is_err());
    }

    fn two_stage_group() -> GraphGroup {
        let mut group = GraphGroup::new("stats");
        {
            let count = group.new_graph("count", 4).unwrap();
            let x = count.declare_input("x", DataType::Cipher).unwrap();
            let k = count.constant(ConstValue::Int(vec![2])).unwrap();
            let y = count.mul(x, k).unwrap();
            count.declare_output("twice", y).unwrap();
        }
        {
            let mean = group.new_graph("mean", 4).unwrap();
            let total = mean.declare_input("total", DataType::Cipher).unwrap();
            let n = mean.declare_input("n", DataType::Cipher).unwrap();
            let sum = mean.add(total, n).unwrap();
            mean.declare_output("sum", sum).unwrap();
        }
        group
    }

    #[test]
    fn groups_keep_ids_and_share_one_space() {
        let group = two_stage_group();
        let record = decompose_group(&group);
        let json = serde_json::to_string(&record).unwrap();
        let rebuilt = recompose_group(serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(rebuilt.name(), "stats");
        assert_eq!(rebuilt.next_index(), group.next_index());
        for (original, restored) in group.graphs().zip(rebuilt.graphs()) {
            assert_eq!(original.name(), restored.name());
            assert_eq!(original.node_ids(), restored.node_ids());
            assert!(restored.space().is_shared_with(rebuilt.space()));
        }
    }

    #[test]
    fn rebuilt_groups_allocate_past_the_largest_id() {
        let mut record = decompose_group(&two_stage_group());
        // A stale counter must not hand out ids the members already hold.
        record.next_index = 0;
        let mut rebuilt = recompose_group(record).unwrap();
        let largest = rebuilt
            .graphs()
            .flat_map(|graph| graph.node_ids())
            .max()
            .unwrap();
        let fresh = rebuilt
            .new_graph("extra", 4)
            .unwrap()
            .declare_input("z", DataType::Cipher)
            .unwrap();
        assert!(fresh > largest);
    }

    #[test]
    fn group_members_must_not_collide() {
        let mut record = decompose_group(&two_stage_group());
        let first_id = record.members[0].nodes[0].id;
        let stray = record.members[1].nodes[0].id;
        for node in &mut record.members[1].nodes {
            if node.id == stray {
                node.id = first_id;
            }
        }
        for (consumer, _, operand) in &mut record.members[1].operands {
            if *consumer == stray {
                *consumer = first_id;
            }
            if *operand == stray {
                *operand = first_id;
            }
        }
        assert!(matches!(
            recompose_group(record),
            Err(CoreError::IndexCollision { .. })
        ));
    }
}
