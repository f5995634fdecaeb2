//! Graph: the arena-owned DAG of operation nodes.
//!
//! [`Graph`] owns every [`Node`] in a petgraph `StableGraph`. Operands are
//! edges from producer to consumer weighted with the operand port, so a
//! node's operand list is its incoming edges sorted by port.
//!
//! Construction is append-only. Rewrites go through
//! [`Graph::replace_all_uses_with`], which redirects consumer edges and never
//! edits a node's own operand list. Nodes left unreferenced by a rewrite stay
//! in the arena until [`Graph::remove_dead_nodes`] runs.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use smallvec::SmallVec;

use crate::edge::OperandEdge;
use crate::error::CoreError;
use crate::id::{IndexSpace, NodeId};
use crate::node::Node;
use crate::ops::{BinaryOp, MacroOp, Op};
use crate::types::{ConstValue, DataType};

/// Operand list of a node. Nearly every op has at most two.
pub type Operands = SmallVec<[NodeId; 2]>;

/// A computation graph over vectors of `vec_width` slots.
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    vec_width: u32,
    dag: StableGraph<Node, OperandEdge, Directed, u32>,
    index: HashMap<NodeId, NodeIndex<u32>>,
    inputs: IndexMap<String, NodeId>,
    outputs: IndexMap<String, NodeId>,
    space: IndexSpace,
}

impl Graph {
    /// Creates an empty graph with its own index space.
    pub fn new(name: impl Into<String>, vec_width: u32) -> Result<Self, CoreError> {
        Self::with_space(name, vec_width, IndexSpace::new())
    }

    /// Creates an empty graph allocating node ids from `space`.
    pub fn with_space(
        name: impl Into<String>,
        vec_width: u32,
        space: IndexSpace,
    ) -> Result<Self, CoreError> {
        if vec_width == 0 {
            return Err(CoreError::InvalidVectorWidth { width: vec_width });
        }
        Ok(Graph {
            name: name.into(),
            vec_width,
            dag: StableGraph::new(),
            index: HashMap::new(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            space,
        })
    }

    /// Rebuilds a graph from its nodes and `(consumer, port, operand)` triples.
    ///
    /// Used by the wire layer. Input and output maps are recovered from the
    /// `Input`/`Output` ops, and `space` is advanced past the largest id.
    pub fn from_parts(
        name: impl Into<String>,
        vec_width: u32,
        nodes: Vec<Node>,
        operands: Vec<(NodeId, u16, NodeId)>,
        space: IndexSpace,
    ) -> Result<Self, CoreError> {
        let mut graph = Self::with_space(name, vec_width, space)?;
        let mut sorted = nodes;
        sorted.sort_by_key(|node| node.id);

        for node in sorted {
            if graph.index.contains_key(&node.id) {
                return Err(CoreError::GraphInconsistency {
                    reason: format!("node id {} appears twice", node.id),
                });
            }
            graph.register_name(&node)?;
            graph.space.advance_to(node.id.0 + 1);
            let id = node.id;
            let idx = graph.dag.add_node(node);
            graph.index.insert(id, idx);
        }

        for (consumer, port, operand) in operands {
            let to = graph.index_of(consumer)?;
            let from = graph.index_of(operand)?;
            graph.dag.add_edge(from, to, OperandEdge { port });
        }

        for id in graph.node_ids() {
            let op = graph.op(id)?;
            let actual = graph.operands(id).len();
            if actual != op.arity() {
                return Err(CoreError::ArityMismatch {
                    op: op.name(),
                    expected: op.arity(),
                    actual,
                });
            }
        }
        Ok(graph)
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of SIMD slots every value of this graph spans.
    pub fn vec_width(&self) -> u32 {
        self.vec_width
    }

    pub fn space(&self) -> &IndexSpace {
        &self.space
    }

    /// The id the next created node will receive.
    pub fn next_index(&self) -> u64 {
        self.space.peek()
    }

    pub fn node_count(&self) -> usize {
        self.dag.node_count()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).and_then(|idx| self.dag.node_weight(*idx))
    }

    pub fn op(&self, id: NodeId) -> Result<&Op, CoreError> {
        self.node(id)
            .map(|node| &node.op)
            .ok_or(CoreError::NodeNotFound { id })
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.index.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Iterates over every node in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.node_ids()
            .into_iter()
            .filter_map(move |id| self.node(id))
    }

    /// Operands of `id` in port order. Empty for unknown ids.
    pub fn operands(&self, id: NodeId) -> Operands {
        let Some(&idx) = self.index.get(&id) else {
            return Operands::new();
        };
        let mut ports: SmallVec<[(u16, NodeId); 2]> = self
            .dag
            .edges_directed(idx, Direction::Incoming)
            .map(|edge| (edge.weight().port, self.dag[edge.source()].id))
            .collect();
        ports.sort_by_key(|(port, _)| *port);
        ports.into_iter().map(|(_, operand)| operand).collect()
    }

    /// Consumers of `id` with the port they read it on, in ascending
    /// consumer order.
    pub fn uses(&self, id: NodeId) -> Vec<(NodeId, u16)> {
        let Some(&idx) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut uses: Vec<(NodeId, u16)> = self
            .dag
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| (self.dag[edge.target()].id, edge.weight().port))
            .collect();
        uses.sort();
        uses
    }

    pub fn use_count(&self, id: NodeId) -> usize {
        self.index
            .get(&id)
            .map(|idx| self.dag.edges_directed(*idx, Direction::Outgoing).count())
            .unwrap_or(0)
    }

    /// Declared inputs, name to `Input` node, in declaration order.
    pub fn inputs(&self) -> &IndexMap<String, NodeId> {
        &self.inputs
    }

    /// Declared outputs, name to `Output` node, in declaration order.
    pub fn outputs(&self) -> &IndexMap<String, NodeId> {
        &self.outputs
    }

    pub fn input_node(&self, name: &str) -> Option<NodeId> {
        self.inputs.get(name).copied()
    }

    pub fn output_node(&self, name: &str) -> Option<NodeId> {
        self.outputs.get(name).copied()
    }

    /// The value an output node forwards.
    pub fn output_source(&self, name: &str) -> Option<NodeId> {
        self.output_node(name)
            .and_then(|out| self.operands(out).first().copied())
    }

    // -----------------------------------------------------------------------
    // Builders
    // -----------------------------------------------------------------------

    /// Appends a node with a fresh index.
    ///
    /// Every operand must already exist in this graph and the operand count
    /// must match the op's arity.
    pub fn make_node(&mut self, op: Op, operands: &[NodeId]) -> Result<NodeId, CoreError> {
        if operands.len() != op.arity() {
            return Err(CoreError::ArityMismatch {
                op: op.name(),
                expected: op.arity(),
                actual: operands.len(),
            });
        }
        let operand_indices = operands
            .iter()
            .map(|id| self.index_of(*id))
            .collect::<Result<SmallVec<[NodeIndex<u32>; 3]>, _>>()?;

        let id = self.space.allocate();
        let node = Node::new(id, op);
        self.register_name(&node)?;
        let idx = self.dag.add_node(node);
        self.index.insert(id, idx);

        for (port, from) in operand_indices.into_iter().enumerate() {
            self.dag.add_edge(from, idx, OperandEdge { port: port as u16 });
        }
        Ok(id)
    }

    pub fn declare_input(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
    ) -> Result<NodeId, CoreError> {
        self.make_node(
            Op::Input {
                name: name.into(),
                ty,
            },
            &[],
        )
    }

    pub fn declare_output(
        &mut self,
        name: impl Into<String>,
        value: NodeId,
    ) -> Result<NodeId, CoreError> {
        self.make_node(Op::Output { name: name.into() }, &[value])
    }

    /// Adds a constant. Its length must divide the vector width.
    pub fn constant(&mut self, value: ConstValue) -> Result<NodeId, CoreError> {
        let len = value.len();
        if len == 0 || self.vec_width as usize % len != 0 {
            return Err(CoreError::VectorWidthMismatch {
                width: self.vec_width,
                len,
            });
        }
        self.make_node(Op::Constant { value }, &[])
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> Result<NodeId, CoreError> {
        self.make_node(Op::Binary { op }, &[lhs, rhs])
    }

    pub fn add(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, CoreError> {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, CoreError> {
        self.binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, CoreError> {
        self.binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn div(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, CoreError> {
        self.binary(BinaryOp::Div, lhs, rhs)
    }

    pub fn negate(&mut self, value: NodeId) -> Result<NodeId, CoreError> {
        self.make_node(Op::Negate, &[value])
    }

    pub fn rotate_left(&mut self, value: NodeId, steps: u32) -> Result<NodeId, CoreError> {
        self.make_node(Op::RotateLeft { steps }, &[value])
    }

    pub fn rotate_right(&mut self, value: NodeId, steps: u32) -> Result<NodeId, CoreError> {
        self.make_node(Op::RotateRight { steps }, &[value])
    }

    pub fn encode(
        &mut self,
        value: NodeId,
        scale_bits: u32,
        level: u32,
    ) -> Result<NodeId, CoreError> {
        self.make_node(Op::Encode { scale_bits, level }, &[value])
    }

    pub fn macro_op(&mut self, op: MacroOp, operands: &[NodeId]) -> Result<NodeId, CoreError> {
        self.make_node(Op::Macro { op }, operands)
    }

    // -----------------------------------------------------------------------
    // Rewrites
    // -----------------------------------------------------------------------

    /// Redirects every consumer of `old` to read `new` on the same port.
    ///
    /// Edges into `new` itself are left alone so that `new` may be built on
    /// top of `old`. Returns the number of redirected edges.
    pub fn replace_all_uses_with(&mut self, old: NodeId, new: NodeId) -> Result<usize, CoreError> {
        let old_idx = self.index_of(old)?;
        let new_idx = self.index_of(new)?;
        if old_idx == new_idx {
            return Ok(0);
        }

        let rewired: Vec<_> = self
            .dag
            .edges_directed(old_idx, Direction::Outgoing)
            .filter(|edge| edge.target() != new_idx)
            .map(|edge| (edge.id(), edge.target(), *edge.weight()))
            .collect();

        for (edge, target, weight) in &rewired {
            self.dag.remove_edge(*edge);
            self.dag.add_edge(new_idx, *target, *weight);
        }
        Ok(rewired.len())
    }

    /// Deletes every node that no output transitively depends on.
    ///
    /// Input nodes are kept even when unused so the graph's declared
    /// interface is unchanged. Returns the number of removed nodes.
    pub fn remove_dead_nodes(&mut self) -> usize {
        let mut live: HashSet<NodeIndex<u32>> = HashSet::new();
        let mut queue: VecDeque<NodeIndex<u32>> = self
            .outputs
            .values()
            .chain(self.inputs.values())
            .filter_map(|id| self.index.get(id).copied())
            .collect();

        while let Some(idx) = queue.pop_front() {
            if !live.insert(idx) {
                continue;
            }
            queue.extend(self.dag.neighbors_directed(idx, Direction::Incoming));
        }

        let dead: Vec<(NodeId, NodeIndex<u32>)> = self
            .index
            .iter()
            .filter(|(_, idx)| !live.contains(idx))
            .map(|(id, idx)| (*id, *idx))
            .collect();
        for (id, idx) in &dead {
            self.dag.remove_node(*idx);
            self.index.remove(id);
        }
        dead.len()
    }

    /// Moves this graph onto another index space, e.g. when it joins a group.
    pub(crate) fn rebind_space(&mut self, space: IndexSpace) {
        space.advance_to(self.space.peek());
        self.space = space;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn index_of(&self, id: NodeId) -> Result<NodeIndex<u32>, CoreError> {
        self.index
            .get(&id)
            .copied()
            .ok_or(CoreError::NodeNotFound { id })
    }

    fn register_name(&mut self, node: &Node) -> Result<(), CoreError> {
        match &node.op {
            Op::Input { name, .. } => {
                if self.inputs.contains_key(name) {
                    return Err(CoreError::DuplicateInput { name: name.clone() });
                }
                self.inputs.insert(name.clone(), node.id);
            }
            Op::Output { name } => {
                if self.outputs.contains_key(name) {
                    return Err(CoreError::DuplicateOutput { name: name.clone() });
                }
                self.outputs.insert(name.clone(), node.id);
            }
            _ => {}
        }
        Ok(())
    }
}
