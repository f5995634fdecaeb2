//! The `compile` entry point: validation, inference, lowering and analysis.
//!
//! The caller's graph is never modified; lowering runs on a copy. The copy
//! keeps sharing the caller's index space, so nodes inserted by lowering get
//! ids that are still unique across a group.

use indexmap::IndexMap;
use tracing::debug;

use fhegraph_core::graph::Graph;
use fhegraph_core::group::GraphGroup;
use fhegraph_core::scheme::SchemeKind;
use fhegraph_core::signature::{EncodingInfo, Signature};
use fhegraph_core::types::DataType;

use crate::analysis::{analyze, KeyRequirements};
use crate::error::CompileError;
use crate::lowering::{lower, LoweringOptions, LoweringReport};
use crate::typecheck::{infer_types, validate_graph, TypeMap};

/// Default fixed-point scale (log2) of the approximate scheme.
pub const DEFAULT_SCALE_BITS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub scheme: SchemeKind,
    /// Scale of encoded plaintexts; ignored by integer schemes.
    pub scale_bits: u32,
}

impl CompileOptions {
    pub fn new(scheme: SchemeKind) -> Self {
        let scale_bits = match scheme {
            SchemeKind::Ckks => DEFAULT_SCALE_BITS,
            SchemeKind::Bfv | SchemeKind::Bitwise => 0,
        };
        CompileOptions { scheme, scale_bits }
    }

    pub fn with_scale_bits(mut self, scale_bits: u32) -> Self {
        if self.scheme == SchemeKind::Ckks {
            self.scale_bits = scale_bits;
        }
        self
    }
}

/// Anything keys can be generated for.
pub trait KeySource {
    fn scheme(&self) -> SchemeKind;
    fn requirements(&self) -> &KeyRequirements;
}

/// A graph lowered for one scheme, with everything key generation,
/// encryption and execution need.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub scheme: SchemeKind,
    pub graph: Graph,
    pub types: TypeMap,
    pub signature: Signature,
    pub requirements: KeyRequirements,
    pub report: LoweringReport,
}

impl KeySource for CompiledGraph {
    fn scheme(&self) -> SchemeKind {
        self.scheme
    }

    fn requirements(&self) -> &KeyRequirements {
        &self.requirements
    }
}

/// Every member of a group compiled for one scheme, plus the union of their
/// key requirements.
#[derive(Debug, Clone)]
pub struct CompiledGroup {
    pub name: String,
    pub scheme: SchemeKind,
    pub graphs: IndexMap<String, CompiledGraph>,
    pub requirements: KeyRequirements,
}

impl CompiledGroup {
    pub fn graph(&self, name: &str) -> Option<&CompiledGraph> {
        self.graphs.get(name)
    }
}

impl KeySource for CompiledGroup {
    fn scheme(&self) -> SchemeKind {
        self.scheme
    }

    fn requirements(&self) -> &KeyRequirements {
        &self.requirements
    }
}

/// Compiles `graph` for `options.scheme`.
pub fn compile(graph: &Graph, options: &CompileOptions) -> Result<CompiledGraph, CompileError> {
    let errors = validate_graph(graph);
    if !errors.is_empty() {
        return Err(CompileError::TypeErrors(errors));
    }

    let mut lowered = graph.clone();
    let mut types = infer_types(&lowered)?;
    let lowering = LoweringOptions {
        scheme: options.scheme,
        scale_bits: options.scale_bits,
    };
    let report = lower(&mut lowered, &mut types, &lowering)?;
    let removed = lowered.remove_dead_nodes();

    let types = infer_types(&lowered)?;
    let requirements = analyze(&lowered, &types)?;
    let signature = signature_of(&lowered, &types, options)?;

    debug!(
        graph = lowered.name(),
        scheme = %options.scheme,
        nodes = lowered.node_count(),
        removed,
        depth = requirements.mult_depth,
        rotations = requirements.rotation_steps.len(),
        "compiled graph"
    );

    Ok(CompiledGraph {
        scheme: options.scheme,
        graph: lowered,
        types,
        signature,
        requirements,
        report,
    })
}

/// Compiles every member of `group` and merges their key requirements.
pub fn compile_group(
    group: &GraphGroup,
    options: &CompileOptions,
) -> Result<CompiledGroup, CompileError> {
    group.validate_input_names()?;

    let mut graphs = IndexMap::new();
    let mut requirements = KeyRequirements::default();
    for graph in group.graphs() {
        let compiled = compile(graph, options)?;
        requirements.merge(&compiled.requirements);
        graphs.insert(graph.name().to_string(), compiled);
    }

    Ok(CompiledGroup {
        name: group.name().to_string(),
        scheme: options.scheme,
        graphs,
        requirements,
    })
}

fn signature_of(
    graph: &Graph,
    types: &TypeMap,
    options: &CompileOptions,
) -> Result<Signature, CompileError> {
    let mut signature = Signature::new(graph.vec_width());
    for (name, id) in graph.inputs() {
        let ty = types.of(*id)?;
        let scale_bits = match ty {
            DataType::Raw => 0,
            DataType::Plain | DataType::Cipher => options.scale_bits,
        };
        signature.inputs.insert(
            name.clone(),
            EncodingInfo {
                ty,
                scale_bits,
                level: 0,
            },
        );
    }
    for (name, id) in graph.outputs() {
        signature.outputs.insert(name.clone(), types.of(*id)?);
    }
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhegraph_core::ops::{BinaryOp, Op};
    use fhegraph_core::types::ConstValue;

    fn affine() -> Graph {
        let mut graph = Graph::new("affine", 16).unwrap();
        let x = graph.declare_input("x", DataType::Cipher).unwrap();
        let k = graph.declare_input("k", DataType::Raw).unwrap();
        let ten = graph.constant(ConstValue::Float(vec![10.0])).unwrap();
        let shifted = graph.sub(ten, x).unwrap();
        let scaled = graph.mul(shifted, k).unwrap();
        graph.declare_output("y", scaled).unwrap();
        graph
    }

    #[test]
    fn compile_lowers_and_signs_the_graph() {
        let graph = affine();
        let compiled = compile(&graph, &CompileOptions::new(SchemeKind::Ckks)).unwrap();

        assert_eq!(compiled.signature.vec_width, 16);
        assert_eq!(compiled.signature.input("x").unwrap().ty, DataType::Cipher);
        assert_eq!(compiled.signature.input("x").unwrap().scale_bits, 60);
        assert_eq!(compiled.signature.input("k").unwrap().scale_bits, 0);
        assert_eq!(compiled.signature.output("y"), Some(DataType::Cipher));
        assert_eq!(compiled.requirements.mult_depth, 1);
        assert!(!compiled.requirements.needs_relin);

        // The dead Sub is gone; the caller's graph is untouched.
        assert!(compiled
            .graph
            .nodes()
            .all(|node| node.op != Op::Binary { op: BinaryOp::Sub }));
        assert!(graph
            .nodes()
            .any(|node| node.op == Op::Binary { op: BinaryOp::Sub }));
        assert_eq!(compiled.types.len(), compiled.graph.node_count());
    }

    #[test]
    fn invalid_graphs_report_type_errors() {
        let mut graph = Graph::new("g", 4).unwrap();
        graph.declare_input("x", DataType::Cipher).unwrap();
        assert!(matches!(
            compile(&graph, &CompileOptions::new(SchemeKind::Bfv)),
            Err(CompileError::TypeErrors(errors)) if errors.len() == 1
        ));
    }

    #[test]
    fn scale_only_applies_to_the_approximate_scheme() {
        assert_eq!(CompileOptions::new(SchemeKind::Bfv).with_scale_bits(40).scale_bits, 0);
        assert_eq!(CompileOptions::new(SchemeKind::Ckks).with_scale_bits(40).scale_bits, 40);
    }

    #[test]
    fn group_members_compile_without_index_collisions() {
        let mut group = GraphGroup::new("stats");
        {
            let first = group.new_graph("first", 8).unwrap();
            let x = first.declare_input("x", DataType::Cipher).unwrap();
            let c = first.constant(ConstValue::Int(vec![1])).unwrap();
            let d = first.sub(c, x).unwrap();
            first.declare_output("d", d).unwrap();
        }
        {
            let second = group.new_graph("second", 8).unwrap();
            let y = second.declare_input("y", DataType::Cipher).unwrap();
            let r = second.rotate_left(y, 1).unwrap();
            let sq = second.mul(r, r).unwrap();
            second.declare_output("s", sq).unwrap();
        }

        let compiled = compile_group(&group, &CompileOptions::new(SchemeKind::Bfv)).unwrap();

        let first: Vec<_> = compiled.graph("first").unwrap().graph.node_ids();
        let second: Vec<_> = compiled.graph("second").unwrap().graph.node_ids();
        assert!(first.iter().all(|id| !second.contains(id)));
        assert!(compiled.requirements.needs_relin);
        assert!(compiled.requirements.rotation_steps.contains(&1));
        assert_eq!(compiled.scheme(), SchemeKind::Bfv);
    }
}
