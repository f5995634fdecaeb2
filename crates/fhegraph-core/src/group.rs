//! Graph groups: several graphs sharing one index space and one key context.
//!
//! A protocol that decomposes into sequential sub-programs (a counting stage
//! feeding an averaging stage, say) builds each stage as its own [`Graph`]
//! inside one [`GraphGroup`]. Node ids stay unique across the group, and
//! input names are disjoint, so one key pair and one input valuation can
//! serve every member.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::graph::Graph;
use crate::id::{IndexSpace, NodeId};

#[derive(Debug, Clone)]
pub struct GraphGroup {
    name: String,
    space: IndexSpace,
    graphs: IndexMap<String, Graph>,
}

impl GraphGroup {
    pub fn new(name: impl Into<String>) -> Self {
        GraphGroup {
            name: name.into(),
            space: IndexSpace::new(),
            graphs: IndexMap::new(),
        }
    }

    /// An empty group allocating from `space`, typically one restored to
    /// the id a serialized group had reached.
    pub fn with_space(name: impl Into<String>, space: IndexSpace) -> Self {
        GraphGroup {
            name: name.into(),
            space,
            graphs: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The next id the shared index space will hand out.
    pub fn next_index(&self) -> u64 {
        self.space.peek()
    }

    pub fn space(&self) -> &IndexSpace {
        &self.space
    }

    /// Creates an empty member graph allocating from the group's index space.
    pub fn new_graph(
        &mut self,
        name: impl Into<String>,
        vec_width: u32,
    ) -> Result<&mut Graph, CoreError> {
        let name = name.into();
        if self.graphs.contains_key(&name) {
            return Err(CoreError::DuplicateGraph { name });
        }
        let graph = Graph::with_space(name.clone(), vec_width, self.space.clone())?;
        Ok(self.graphs.entry(name).or_insert(graph))
    }

    /// Adopts a graph that was built on its own.
    ///
    /// Its node ids must not collide with any member's and its input names
    /// must be new to the group. On success the graph is moved onto the
    /// group's index space, which advances past the graph's ids.
    pub fn add_graph(&mut self, mut graph: Graph) -> Result<(), CoreError> {
        let name = graph.name().to_string();
        if self.graphs.contains_key(&name) {
            return Err(CoreError::DuplicateGraph { name });
        }
        self.check_input_names(&graph)?;

        if !graph.space().is_shared_with(&self.space) {
            let used: HashSet<NodeId> = self
                .graphs
                .values()
                .flat_map(|member| member.node_ids())
                .collect();
            if let Some(id) = graph.node_ids().into_iter().find(|id| used.contains(id)) {
                return Err(CoreError::IndexCollision { id, graph: name });
            }
            graph.rebind_space(self.space.clone());
        }

        self.graphs.insert(name, graph);
        Ok(())
    }

    pub fn graph(&self, name: &str) -> Result<&Graph, CoreError> {
        self.graphs.get(name).ok_or_else(|| CoreError::GraphNotFound {
            name: name.to_string(),
        })
    }

    pub fn graph_mut(&mut self, name: &str) -> Result<&mut Graph, CoreError> {
        self.graphs
            .get_mut(name)
            .ok_or_else(|| CoreError::GraphNotFound {
                name: name.to_string(),
            })
    }

    /// Members in insertion order.
    pub fn graphs(&self) -> impl Iterator<Item = &Graph> {
        self.graphs.values()
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Validates that input names are disjoint across all members.
    ///
    /// Members created with [`new_graph`](Self::new_graph) can gain inputs
    /// after joining, so this is re-checked before compiling the group.
    pub fn validate_input_names(&self) -> Result<(), CoreError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for graph in self.graphs.values() {
            for name in graph.inputs().keys() {
                if !seen.insert(name.as_str()) {
                    return Err(CoreError::InputNameOverlap {
                        name: name.clone(),
                        graph: graph.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_input_names(&self, graph: &Graph) -> Result<(), CoreError> {
        for name in graph.inputs().keys() {
            if self
                .graphs
                .values()
                .any(|member| member.inputs().contains_key(name))
            {
                return Err(CoreError::InputNameOverlap {
                    name: name.clone(),
                    graph: graph.name().to_string(),
                });
            }
        }
        Ok(())
    }
}
