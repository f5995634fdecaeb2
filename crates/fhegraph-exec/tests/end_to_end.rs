//! End-to-end tests: build a graph, compile it, generate keys, encrypt,
//! execute and decrypt, for each of the three schemes.
//!
//! Tests cover:
//! - Packed approximate and exact arithmetic on full-width vectors
//! - Groups of graphs sharing one key pair
//! - Division guards and the bitwise zero-divisor convention
//! - Lowered graphs agreeing with their naive meaning
//! - Bitwise gates agreeing with wrapping byte arithmetic
//! - Native handle lifetimes, level exhaustion and key mismatches

use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use fhegraph_check::{compile, compile_group, CompileOptions, CompiledGraph};
use fhegraph_core::graph::Graph;
use fhegraph_core::group::GraphGroup;
use fhegraph_core::scheme::SchemeKind;
use fhegraph_core::types::{ConstValue, DataType};
use fhegraph_core::valuation::{PlainValue, Valuation};
use fhegraph_exec::{
    decrypt, encrypt, execute, generate_keys, Bfv, Bitwise, Ckks, ContextCache, ExecError,
    MergePolicy, SchemeConfig,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn config(seed: u64) -> SchemeConfig {
    SchemeConfig::default().with_seed(seed)
}

fn compiled(graph: &Graph, scheme: SchemeKind) -> CompiledGraph {
    compile(graph, &CompileOptions::new(scheme)).expect("graph should compile")
}

fn floats(valuation: &Valuation, name: &str) -> Vec<f64> {
    valuation
        .get(name)
        .and_then(|value| value.as_f64_vec())
        .expect("float vector output")
        .to_vec()
}

fn ints(valuation: &Valuation, name: &str) -> Vec<i64> {
    valuation
        .get(name)
        .and_then(|value| value.as_i64_vec())
        .expect("integer vector output")
        .to_vec()
}

fn byte(valuation: &Valuation, name: &str) -> u8 {
    valuation
        .get(name)
        .and_then(|value| value.as_byte())
        .expect("byte output")
}

// ---------------------------------------------------------------------------
// Packed schemes
// ---------------------------------------------------------------------------

#[test]
fn ckks_computes_shifted_product() {
    let width = 2048;
    let mut graph = Graph::new("shifted_product", width).unwrap();
    let x = graph.declare_input("x", DataType::Cipher).unwrap();
    let y = graph.declare_input("y", DataType::Cipher).unwrap();
    let ten = graph.constant(ConstValue::Float(vec![10.0])).unwrap();
    let shifted = graph.add(x, ten).unwrap();
    let product = graph.mul(shifted, y).unwrap();
    graph.declare_output("z", product).unwrap();

    let compiled = compiled(&graph, SchemeKind::Ckks);
    let cache = ContextCache::new();
    let (public, secret) = generate_keys::<Ckks>(&compiled, &cache, &config(1)).unwrap();

    let mut rng = ChaCha20Rng::seed_from_u64(99);
    let xs: Vec<f64> = (0..width).map(|_| rng.gen_range(0.0..1024.0)).collect();
    let ys: Vec<f64> = (0..width).map(|_| rng.gen_range(0.0..1024.0)).collect();
    let inputs: Valuation = [
        ("x", PlainValue::F64Vec(xs.clone())),
        ("y", PlainValue::F64Vec(ys.clone())),
    ]
    .into_iter()
    .collect();

    let encrypted = encrypt(&public, &inputs, &compiled.signature).unwrap();
    let outputs = execute(&public, &compiled.graph, &encrypted).unwrap();
    let result = decrypt(&secret, &outputs, &compiled.signature).unwrap();

    let z = floats(&result, "z");
    assert_eq!(z.len(), width as usize);
    for i in 0..z.len() {
        let expected = (xs[i] + 10.0) * ys[i];
        assert!(
            (z[i] - expected).abs() < 1e-3,
            "slot {i}: got {}, expected {expected}",
            z[i]
        );
    }
}

#[test]
fn bfv_computes_product_minus_operand() {
    let width = 4096;
    let mut graph = Graph::new("poly", width).unwrap();
    let x = graph.declare_input("x", DataType::Cipher).unwrap();
    let y = graph.declare_input("y", DataType::Cipher).unwrap();
    let xy = graph.mul(x, y).unwrap();
    let diff = graph.sub(xy, x).unwrap();
    graph.declare_output("out", diff).unwrap();

    let compiled = compiled(&graph, SchemeKind::Bfv);
    let (public, secret) =
        generate_keys::<Bfv>(&compiled, &ContextCache::new(), &config(2)).unwrap();
    assert_eq!(public.context().slot_count(), width as usize);

    let inputs: Valuation = [
        ("x", PlainValue::I64Vec(vec![1; width as usize])),
        ("y", PlainValue::I64Vec(vec![2; width as usize])),
    ]
    .into_iter()
    .collect();
    let encrypted = encrypt(&public, &inputs, &compiled.signature).unwrap();
    let outputs = execute(&public, &compiled.graph, &encrypted).unwrap();
    let result = decrypt(&secret, &outputs, &compiled.signature).unwrap();

    assert_eq!(ints(&result, "out"), vec![1; width as usize]);
}

#[test]
fn rotations_use_generated_galois_keys() {
    let mut graph = Graph::new("neighbors", 8).unwrap();
    let x = graph.declare_input("x", DataType::Cipher).unwrap();
    let left = graph.rotate_left(x, 1).unwrap();
    let right = graph.rotate_right(x, 2).unwrap();
    let sum = graph.add(left, right).unwrap();
    graph.declare_output("s", sum).unwrap();

    let rotating = compiled(&graph, SchemeKind::Bfv);
    let cache = ContextCache::new();
    let (public, secret) = generate_keys::<Bfv>(&rotating, &cache, &config(3)).unwrap();

    let xs: Vec<i64> = (0..8).collect();
    let inputs: Valuation = [("x", PlainValue::I64Vec(xs.clone()))].into_iter().collect();
    let encrypted = encrypt(&public, &inputs, &rotating.signature).unwrap();
    let outputs = execute(&public, &rotating.graph, &encrypted).unwrap();
    let result = decrypt(&secret, &outputs, &rotating.signature).unwrap();

    let expected: Vec<i64> = (0..8).map(|i| xs[(i + 1) % 8] + xs[(i + 6) % 8]).collect();
    assert_eq!(ints(&result, "s"), expected);

    // Keys generated for a graph without rotations lack the Galois keys.
    let mut plain = Graph::new("plain", 8).unwrap();
    let x = plain.declare_input("x", DataType::Cipher).unwrap();
    plain.declare_output("y", x).unwrap();
    let (bare, _) =
        generate_keys::<Bfv>(&compiled(&plain, SchemeKind::Bfv), &cache, &config(4)).unwrap();
    let encrypted = encrypt(&bare, &inputs, &rotating.signature).unwrap();
    assert!(matches!(
        execute(&bare, &rotating.graph, &encrypted),
        Err(ExecError::NullContext { .. })
    ));
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[test]
fn group_members_share_one_key_pair() {
    let mut group = GraphGroup::new("stats");
    {
        let total = group.new_graph("total", 16).unwrap();
        let a = total.declare_input("a", DataType::Cipher).unwrap();
        let b = total.declare_input("b", DataType::Cipher).unwrap();
        let sum = total.add(a, b).unwrap();
        total.declare_output("sum", sum).unwrap();
    }
    {
        let square = group.new_graph("square", 16).unwrap();
        let c = square.declare_input("c", DataType::Cipher).unwrap();
        let sq = square.mul(c, c).unwrap();
        square.declare_output("sq", sq).unwrap();
    }

    let compiled = compile_group(&group, &CompileOptions::new(SchemeKind::Ckks)).unwrap();
    let total = compiled.graph("total").unwrap();
    let square = compiled.graph("square").unwrap();
    let total_ids = total.graph.node_ids();
    assert!(square
        .graph
        .node_ids()
        .iter()
        .all(|id| !total_ids.contains(id)));

    let (public, secret) =
        generate_keys::<Ckks>(&compiled, &ContextCache::new(), &config(5)).unwrap();

    // Two parties encrypt their own inputs; the server merges them.
    let alice: Valuation = [("a", PlainValue::F64(1.5))].into_iter().collect();
    let bob: Valuation = [("b", PlainValue::F64(2.25))].into_iter().collect();
    let carol: Valuation = [("c", PlainValue::F64(3.0))].into_iter().collect();
    let mut inputs = encrypt(&public, &alice, &total.signature).unwrap();
    inputs
        .merge(encrypt(&public, &bob, &total.signature).unwrap(), MergePolicy::Disjoint)
        .unwrap();
    inputs
        .merge(encrypt(&public, &carol, &square.signature).unwrap(), MergePolicy::Disjoint)
        .unwrap();
    assert_eq!(inputs.len(), 3);

    let total_out = execute(
        &public,
        &total.graph,
        &inputs.subset(total.graph.inputs().keys().map(String::as_str)),
    )
    .unwrap();
    let square_out = execute(
        &public,
        &square.graph,
        &inputs.subset(square.graph.inputs().keys().map(String::as_str)),
    )
    .unwrap();

    let sum = decrypt(&secret, &total_out, &total.signature).unwrap();
    let sq = decrypt(&secret, &square_out, &square.signature).unwrap();
    assert!(floats(&sum, "sum").iter().all(|v| (v - 3.75).abs() < 1e-3));
    assert!(floats(&sq, "sq").iter().all(|v| (v - 9.0).abs() < 1e-3));
}

// ---------------------------------------------------------------------------
// Division
// ---------------------------------------------------------------------------

#[test]
fn plain_zero_divisors_are_rejected_before_evaluation() {
    let mut graph = Graph::new("ratio", 4).unwrap();
    let x = graph.declare_input("x", DataType::Cipher).unwrap();
    let zero = graph.constant(ConstValue::Float(vec![1.0, 0.0])).unwrap();
    let q = graph.div(x, zero).unwrap();
    graph.declare_output("q", q).unwrap();

    let compiled = compiled(&graph, SchemeKind::Ckks);
    let (public, _) = generate_keys::<Ckks>(&compiled, &ContextCache::new(), &config(6)).unwrap();
    let inputs: Valuation = [("x", PlainValue::F64(8.0))].into_iter().collect();
    let encrypted = encrypt(&public, &inputs, &compiled.signature).unwrap();

    // Lowering replaced the division with one reading the encoded constant.
    let lowered_q = compiled.graph.output_source("q").unwrap();
    assert_ne!(lowered_q, q);
    let err = execute(&public, &compiled.graph, &encrypted).unwrap_err();
    assert!(err.is_arithmetic());
    assert!(matches!(err, ExecError::DivisionByZero { node } if node == lowered_q));
}

#[test]
fn ckks_divides_by_plain_and_cipher_values() {
    let mut graph = Graph::new("ratios", 4).unwrap();
    let x = graph.declare_input("x", DataType::Cipher).unwrap();
    let y = graph.declare_input("y", DataType::Cipher).unwrap();
    let four = graph.constant(ConstValue::Float(vec![4.0])).unwrap();
    let by_plain = graph.div(x, four).unwrap();
    let by_cipher = graph.div(four, y).unwrap();
    graph.declare_output("by_plain", by_plain).unwrap();
    graph.declare_output("by_cipher", by_cipher).unwrap();

    let compiled = compiled(&graph, SchemeKind::Ckks);
    let (public, secret) =
        generate_keys::<Ckks>(&compiled, &ContextCache::new(), &config(7)).unwrap();
    let inputs: Valuation = [
        ("x", PlainValue::F64Vec(vec![2.0, 6.0])),
        ("y", PlainValue::F64Vec(vec![8.0, 0.5])),
    ]
    .into_iter()
    .collect();
    let encrypted = encrypt(&public, &inputs, &compiled.signature).unwrap();
    let outputs = execute(&public, &compiled.graph, &encrypted).unwrap();
    let result = decrypt(&secret, &outputs, &compiled.signature).unwrap();

    let expect = |got: Vec<f64>, want: [f64; 4]| {
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < 1e-3, "got {g}, expected {w}");
        }
    };
    expect(floats(&result, "by_plain"), [0.5, 1.5, 0.5, 1.5]);
    expect(floats(&result, "by_cipher"), [0.5, 8.0, 0.5, 8.0]);
}

#[test]
fn bitwise_division_is_exact_and_saturates_on_zero() {
    let mut graph = Graph::new("quotient", 1).unwrap();
    let x = graph.declare_input("x", DataType::Cipher).unwrap();
    let y = graph.declare_input("y", DataType::Cipher).unwrap();
    let q = graph.div(x, y).unwrap();
    graph.declare_output("q", q).unwrap();

    let compiled = compiled(&graph, SchemeKind::Bitwise);
    let cache = ContextCache::new();
    let (public, secret) = generate_keys::<Bitwise>(&compiled, &cache, &config(8)).unwrap();

    let run = |x: u8, y: u8| {
        let inputs: Valuation = [("x", PlainValue::Byte(x)), ("y", PlainValue::Byte(y))]
            .into_iter()
            .collect();
        let encrypted = encrypt(&public, &inputs, &compiled.signature).unwrap();
        let outputs = execute(&public, &compiled.graph, &encrypted).unwrap();
        byte(&decrypt(&secret, &outputs, &compiled.signature).unwrap(), "q")
    };
    assert_eq!(run(200, 7), 28);
    assert_eq!(run(200, 0), 255);

    // Without the server key nothing is evaluated.
    let client = public.without_evaluation_keys();
    let inputs: Valuation = [("x", PlainValue::Byte(9)), ("y", PlainValue::Byte(3))]
        .into_iter()
        .collect();
    let encrypted = encrypt(&client, &inputs, &compiled.signature).unwrap();
    assert!(matches!(
        execute(&client, &compiled.graph, &encrypted),
        Err(ExecError::NullContext { .. })
    ));
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

#[test]
fn lowered_graphs_keep_their_meaning() {
    // Operand order and plain-minus-cipher both get rewritten for BFV.
    let mut graph = Graph::new("mixed", 4).unwrap();
    let x = graph.declare_input("x", DataType::Cipher).unwrap();
    let k = graph.declare_input("k", DataType::Raw).unwrap();
    let hundred = graph.constant(ConstValue::Int(vec![100])).unwrap();
    let scaled = graph.mul(k, x).unwrap();
    let flipped = graph.sub(hundred, scaled).unwrap();
    let shifted = graph.add(hundred, flipped).unwrap();
    graph.declare_output("naive", shifted).unwrap();

    let compiled = compiled(&graph, SchemeKind::Bfv);
    assert!(!compiled.report.is_unchanged());
    let (public, secret) = generate_keys::<Bfv>(&compiled, &ContextCache::new(), &config(9)).unwrap();

    let xs = vec![1, -2, 30, 7];
    let ks = vec![3, 3, -1, 0];
    let inputs: Valuation = [
        ("x", PlainValue::I64Vec(xs.clone())),
        ("k", PlainValue::I64Vec(ks.clone())),
    ]
    .into_iter()
    .collect();
    let encrypted = encrypt(&public, &inputs, &compiled.signature).unwrap();
    let outputs = execute(&public, &compiled.graph, &encrypted).unwrap();
    let result = decrypt(&secret, &outputs, &compiled.signature).unwrap();

    let expected: Vec<i64> = xs
        .iter()
        .zip(&ks)
        .map(|(x, k)| 100 + (100 - k * x))
        .collect();
    assert_eq!(ints(&result, "naive"), expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn bitwise_gates_agree_with_wrapping_bytes(x in any::<u8>(), y in any::<u8>()) {
        let mut graph = Graph::new("gates", 1).unwrap();
        let a = graph.declare_input("x", DataType::Cipher).unwrap();
        let b = graph.declare_input("y", DataType::Cipher).unwrap();
        let three = graph.constant(ConstValue::Byte(3)).unwrap();
        let product = graph.mul(a, b).unwrap();
        let flipped = graph.sub(three, a).unwrap();
        let total = graph.add(product, flipped).unwrap();
        graph.declare_output("r", total).unwrap();

        let compiled = compiled(&graph, SchemeKind::Bitwise);
        let (public, secret) =
            generate_keys::<Bitwise>(&compiled, &ContextCache::new(), &config(12)).unwrap();
        let inputs: Valuation = [("x", PlainValue::Byte(x)), ("y", PlainValue::Byte(y))]
            .into_iter()
            .collect();
        let encrypted = encrypt(&public, &inputs, &compiled.signature).unwrap();
        let outputs = execute(&public, &compiled.graph, &encrypted).unwrap();
        let result = decrypt(&secret, &outputs, &compiled.signature).unwrap();

        prop_assert_eq!(byte(&result, "r"), x.wrapping_mul(y).wrapping_add(3u8.wrapping_sub(x)));
    }
}

// ---------------------------------------------------------------------------
// Resources and failure modes
// ---------------------------------------------------------------------------

#[test]
fn native_handles_return_to_baseline() {
    let mut graph = Graph::new("gates", 1).unwrap();
    let x = graph.declare_input("x", DataType::Cipher).unwrap();
    let y = graph.declare_input("y", DataType::Cipher).unwrap();
    let sum = graph.add(x, y).unwrap();
    let prod = graph.mul(sum, x).unwrap();
    let turned = graph.rotate_left(prod, 3).unwrap();
    graph.declare_output("out", turned).unwrap();

    let compiled = compiled(&graph, SchemeKind::Bitwise);
    let cache = ContextCache::new();
    let (public, secret) = generate_keys::<Bitwise>(&compiled, &cache, &config(10)).unwrap();
    let heap = public.context().native_heap().unwrap().clone();
    let baseline = heap.live();

    {
        let inputs: Valuation = [("x", PlainValue::Byte(5)), ("y", PlainValue::Byte(6))]
            .into_iter()
            .collect();
        let encrypted = encrypt(&public, &inputs, &compiled.signature).unwrap();
        let outputs = execute(&public, &compiled.graph, &encrypted).unwrap();
        // Inputs and the single output are all that survive execution.
        assert_eq!(heap.live(), baseline + 3);
        let result = decrypt(&secret, &outputs, &compiled.signature).unwrap();
        assert_eq!(byte(&result, "out"), ((5u8 + 6) * 5).rotate_left(3));
    }

    assert_eq!(heap.live(), baseline);
    assert_eq!(heap.double_releases(), 0);
}

#[test]
fn exhausted_levels_are_arithmetic_errors() {
    let mut graph = Graph::new("deep", 4).unwrap();
    let x = graph.declare_input("x", DataType::Cipher).unwrap();
    let p = graph.declare_input("p", DataType::Plain).unwrap();
    let prod = graph.mul(x, p).unwrap();
    graph.declare_output("prod", prod).unwrap();
    let deep = compiled(&graph, SchemeKind::Ckks);

    // Keys sized for a graph with no multiplications have no spare level.
    let mut shallow = Graph::new("shallow", 4).unwrap();
    let x = shallow.declare_input("x", DataType::Cipher).unwrap();
    let p = shallow.declare_input("p", DataType::Plain).unwrap();
    let sum = shallow.add(x, p).unwrap();
    shallow.declare_output("sum", sum).unwrap();
    let (public, _) = generate_keys::<Ckks>(
        &compiled(&shallow, SchemeKind::Ckks),
        &ContextCache::new(),
        &config(11),
    )
    .unwrap();

    let inputs: Valuation = [("x", PlainValue::F64(2.0)), ("p", PlainValue::F64(3.0))]
        .into_iter()
        .collect();
    let encrypted = encrypt(&public, &inputs, &deep.signature).unwrap();
    let err = execute(&public, &deep.graph, &encrypted).unwrap_err();
    assert!(matches!(err, ExecError::Arithmetic { .. }), "{err}");
}

#[test]
fn ciphertexts_from_another_key_pair_are_refused() {
    let mut graph = Graph::new("double", 4).unwrap();
    let x = graph.declare_input("x", DataType::Cipher).unwrap();
    let d = graph.add(x, x).unwrap();
    graph.declare_output("d", d).unwrap();
    let compiled = compiled(&graph, SchemeKind::Bfv);

    let cache = ContextCache::new();
    let (alice, _) = generate_keys::<Bfv>(&compiled, &cache, &config(12)).unwrap();
    let (bob, _) = generate_keys::<Bfv>(&compiled, &cache, &config(13)).unwrap();
    assert_eq!(cache.len(), 1);

    let inputs: Valuation = [("x", PlainValue::I64(4))].into_iter().collect();
    let encrypted = encrypt(&alice, &inputs, &compiled.signature).unwrap();
    assert!(matches!(
        execute(&bob, &compiled.graph, &encrypted),
        Err(ExecError::Configuration { .. })
    ));
}
