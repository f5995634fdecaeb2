//! fhegraph command-line tool.
//!
//! Provides the `fhegraph` binary, which walks a graph through the
//! owner/server/client workflow using files:
//!
//! - `keygen` compiles a graph record and writes one key bundle per role
//! - `encrypt` turns a valuation JSON file into an input blob
//! - `execute` runs the server bundle's graph on an input blob
//! - `decrypt` turns an output blob back into valuation JSON
//!
//! Every blob names the scheme it was written for, so only `keygen` takes
//! one, and even there it is inferred from the graph's constants when
//! omitted. `encrypt` draws its randomness from `FHEGRAPH_SEED` when set.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::info;

use fhegraph_check::{compile, infer_scheme, CompileError, CompileOptions, CompiledGraph};
use fhegraph_core::scheme::SchemeKind;
use fhegraph_core::valuation::Valuation;
use fhegraph_exec::{
    decrypt, encrypt_with, execute, generate_keys, Bfv, Bitwise, Ckks, ContextCache, Scheme,
    SchemeConfig,
};
use fhegraph_wire::{
    decode_valuation, encode_valuation, envelope, CapabilityFlags, Expected, GraphRecord,
    KeyBundle,
};

/// Homomorphic graph compiler and runner.
#[derive(Parser)]
#[command(name = "fhegraph", about = "Homomorphic graph compiler and runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Compile a graph and write owner, server and client key bundles.
    Keygen {
        /// Graph record JSON.
        #[arg(short, long)]
        graph: PathBuf,

        /// Backend scheme: ckks, bfv or bitwise (default: inferred).
        #[arg(short, long)]
        scheme: Option<SchemeKind>,

        /// Scheme configuration JSON (default: from FHEGRAPH_* variables).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Fixed-point scale, log2; approximate scheme only.
        #[arg(long)]
        scale_bits: Option<u32>,

        /// Directory for owner.bundle, server.bundle and client.bundle.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Encrypt a valuation JSON file with a bundle that can encrypt.
    Encrypt {
        #[arg(short, long)]
        bundle: PathBuf,

        #[arg(short, long)]
        inputs: PathBuf,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Execute the bundle's graph on an input blob.
    Execute {
        #[arg(short, long)]
        bundle: PathBuf,

        #[arg(short, long)]
        inputs: PathBuf,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Decrypt an output blob and print it as valuation JSON.
    Decrypt {
        #[arg(short, long)]
        bundle: PathBuf,

        #[arg(short, long)]
        outputs: PathBuf,

        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Keygen {
            graph,
            scheme,
            config,
            scale_bits,
            out_dir,
        } => run_keygen(&graph, scheme, config.as_deref(), scale_bits, &out_dir),
        Commands::Encrypt {
            bundle,
            inputs,
            out,
        } => run_encrypt(&bundle, &inputs, &out),
        Commands::Execute {
            bundle,
            inputs,
            out,
        } => run_execute(&bundle, &inputs, &out),
        Commands::Decrypt {
            bundle,
            outputs,
            out,
        } => run_decrypt(&bundle, &outputs, out.as_deref()),
    };
    process::exit(exit_code);
}

/// Why a subcommand stopped.
///
/// Exit codes: 1 = fhegraph error, 2 = graph rejected, 3 = I/O error.
enum Failure {
    Fhe(String),
    Rejected(CompileError),
    Io(String),
}

impl Failure {
    fn exit_code(&self) -> i32 {
        match self {
            Failure::Fhe(_) => 1,
            Failure::Rejected(_) => 2,
            Failure::Io(_) => 3,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Fhe(msg) | Failure::Io(msg) => f.write_str(msg),
            Failure::Rejected(CompileError::TypeErrors(errors)) => {
                write!(f, "graph failed validation with {} error(s):", errors.len())?;
                for err in errors {
                    write!(f, "\n  - {err}")?;
                }
                Ok(())
            }
            Failure::Rejected(err) => write!(f, "{err}"),
        }
    }
}

fn fhe(err: impl fmt::Display) -> Failure {
    Failure::Fhe(err.to_string())
}

fn report(result: Result<(), Failure>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(failure) => {
            eprintln!("Error: {failure}");
            failure.exit_code()
        }
    }
}

fn read(path: &Path) -> Result<Vec<u8>, Failure> {
    fs::read(path).map_err(|e| Failure::Io(format!("failed to read '{}': {e}", path.display())))
}

fn write(path: &Path, bytes: &[u8]) -> Result<(), Failure> {
    fs::write(path, bytes)
        .map_err(|e| Failure::Io(format!("failed to write '{}': {e}", path.display())))
}

/// The scheme a blob was written for, read from its envelope.
fn scheme_of(bytes: &[u8]) -> Result<SchemeKind, Failure> {
    envelope::peek(bytes).map(|e| e.scheme).map_err(fhe)
}

// ---------------------------------------------------------------------------
// keygen
// ---------------------------------------------------------------------------

fn run_keygen(
    graph_path: &Path,
    scheme: Option<SchemeKind>,
    config_path: Option<&Path>,
    scale_bits: Option<u32>,
    out_dir: &Path,
) -> i32 {
    report(keygen(graph_path, scheme, config_path, scale_bits, out_dir))
}

fn keygen(
    graph_path: &Path,
    scheme: Option<SchemeKind>,
    config_path: Option<&Path>,
    scale_bits: Option<u32>,
    out_dir: &Path,
) -> Result<(), Failure> {
    let record: GraphRecord = serde_json::from_slice(&read(graph_path)?).map_err(|e| {
        Failure::Io(format!("'{}' is not a graph record: {e}", graph_path.display()))
    })?;
    let graph = fhegraph_wire::recompose(record).map_err(fhe)?;
    let scheme = match scheme {
        Some(scheme) => scheme,
        None => infer_scheme(&graph).map_err(Failure::Rejected)?,
    };

    let config = match config_path {
        Some(path) => {
            let text = String::from_utf8_lossy(&read(path)?).into_owned();
            SchemeConfig::from_json_str(&text).map_err(fhe)?
        }
        None => SchemeConfig::from_env().map_err(fhe)?,
    };
    let options = CompileOptions::new(scheme).with_scale_bits(scale_bits.unwrap_or(config.scale_bits));
    let compiled = compile(&graph, &options).map_err(Failure::Rejected)?;

    let bundles = match scheme {
        SchemeKind::Ckks => role_bundles::<Ckks>(&compiled, &config)?,
        SchemeKind::Bfv => role_bundles::<Bfv>(&compiled, &config)?,
        SchemeKind::Bitwise => role_bundles::<Bitwise>(&compiled, &config)?,
    };
    fs::create_dir_all(out_dir)
        .map_err(|e| Failure::Io(format!("failed to create '{}': {e}", out_dir.display())))?;
    for (name, bytes) in bundles {
        let path = out_dir.join(name);
        write(&path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "wrote key bundle");
    }
    Ok(())
}

fn role_bundles<S: Scheme>(
    compiled: &CompiledGraph,
    config: &SchemeConfig,
) -> Result<Vec<(&'static str, Vec<u8>)>, Failure> {
    let cache = ContextCache::new();
    let (public, secret) = generate_keys::<S>(compiled, &cache, config).map_err(fhe)?;
    let roles = [
        ("owner.bundle", CapabilityFlags::key_owner()),
        ("server.bundle", CapabilityFlags::compute_server()),
        (
            "client.bundle",
            CapabilityFlags::decrypting_client().union(CapabilityFlags::encrypting_client()),
        ),
    ];
    roles
        .into_iter()
        .map(|(name, flags)| {
            KeyBundle::serialize(Some(&public), Some(&secret), Some(compiled), flags)
                .map(|bytes| (name, bytes))
                .map_err(fhe)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// encrypt / execute / decrypt
// ---------------------------------------------------------------------------

fn run_encrypt(bundle_path: &Path, inputs_path: &Path, out: &Path) -> i32 {
    report(encrypt_files(bundle_path, inputs_path, out))
}

fn encrypt_files(bundle_path: &Path, inputs_path: &Path, out: &Path) -> Result<(), Failure> {
    let bundle = read(bundle_path)?;
    let valuation: Valuation = serde_json::from_slice(&read(inputs_path)?).map_err(|e| {
        Failure::Io(format!("'{}' is not a valuation: {e}", inputs_path.display()))
    })?;
    let blob = match scheme_of(&bundle)? {
        SchemeKind::Ckks => encrypt_for::<Ckks>(&bundle, &valuation)?,
        SchemeKind::Bfv => encrypt_for::<Bfv>(&bundle, &valuation)?,
        SchemeKind::Bitwise => encrypt_for::<Bitwise>(&bundle, &valuation)?,
    };
    write(out, &blob)
}

fn encrypt_for<S: Scheme>(bundle: &[u8], valuation: &Valuation) -> Result<Vec<u8>, Failure> {
    let bundle = KeyBundle::<S>::deserialize(bundle, &ContextCache::new()).map_err(fhe)?;
    let signature = bundle.require_signature().map_err(fhe)?;
    let mut rng = SchemeConfig::from_env().map_err(fhe)?.rng();
    let encrypted = match (bundle.public(), bundle.secret()) {
        (Some(public), _) => encrypt_with(public, valuation, signature, &mut rng),
        (None, Some(secret)) => encrypt_with(secret, valuation, signature, &mut rng),
        (None, None) => return Err(fhe("bundle can neither encrypt nor decrypt")),
    }
    .map_err(fhe)?;
    encode_valuation(&encrypted).map_err(fhe)
}

fn run_execute(bundle_path: &Path, inputs_path: &Path, out: &Path) -> i32 {
    report(execute_files(bundle_path, inputs_path, out))
}

fn execute_files(bundle_path: &Path, inputs_path: &Path, out: &Path) -> Result<(), Failure> {
    let bundle = read(bundle_path)?;
    let inputs = read(inputs_path)?;
    let blob = match scheme_of(&bundle)? {
        SchemeKind::Ckks => execute_for::<Ckks>(&bundle, &inputs)?,
        SchemeKind::Bfv => execute_for::<Bfv>(&bundle, &inputs)?,
        SchemeKind::Bitwise => execute_for::<Bitwise>(&bundle, &inputs)?,
    };
    write(out, &blob)
}

fn execute_for<S: Scheme>(bundle: &[u8], inputs: &[u8]) -> Result<Vec<u8>, Failure> {
    let bundle = KeyBundle::<S>::deserialize(bundle, &ContextCache::new()).map_err(fhe)?;
    let graph = bundle.require_graph().map_err(fhe)?;
    let expected = match bundle.signature() {
        Some(signature) => Expected::Inputs(signature),
        None => Expected::Any,
    };
    let inputs = decode_valuation::<S>(inputs, bundle.context(), expected).map_err(fhe)?;
    let public = bundle.require_public().map_err(fhe)?;
    let outputs = execute(public, graph, &inputs).map_err(fhe)?;
    encode_valuation(&outputs).map_err(fhe)
}

fn run_decrypt(bundle_path: &Path, outputs_path: &Path, out: Option<&Path>) -> i32 {
    report(decrypt_files(bundle_path, outputs_path, out))
}

fn decrypt_files(bundle_path: &Path, outputs_path: &Path, out: Option<&Path>) -> Result<(), Failure> {
    let bundle = read(bundle_path)?;
    let outputs = read(outputs_path)?;
    let valuation = match scheme_of(&bundle)? {
        SchemeKind::Ckks => decrypt_for::<Ckks>(&bundle, &outputs)?,
        SchemeKind::Bfv => decrypt_for::<Bfv>(&bundle, &outputs)?,
        SchemeKind::Bitwise => decrypt_for::<Bitwise>(&bundle, &outputs)?,
    };
    let json = serde_json::to_string_pretty(&valuation).map_err(fhe)?;
    match out {
        Some(path) => write(path, json.as_bytes()),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

fn decrypt_for<S: Scheme>(bundle: &[u8], outputs: &[u8]) -> Result<Valuation, Failure> {
    let bundle = KeyBundle::<S>::deserialize(bundle, &ContextCache::new()).map_err(fhe)?;
    let secret = bundle.require_secret().map_err(fhe)?;
    let signature = bundle.require_signature().map_err(fhe)?;
    let outputs = decode_valuation::<S>(outputs, bundle.context(), Expected::Outputs(signature))
        .map_err(fhe)?;
    decrypt(secret, &outputs, signature).map_err(fhe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhegraph_core::graph::Graph;
    use fhegraph_core::types::{ConstValue, DataType};
    use fhegraph_core::valuation::PlainValue;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fhegraph-cli-{}-{name}", process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_graph(dir: &Path) -> PathBuf {
        let mut graph = Graph::new("poly", 4).unwrap();
        let x = graph.declare_input("x", DataType::Cipher).unwrap();
        let y = graph.declare_input("y", DataType::Cipher).unwrap();
        let xy = graph.mul(x, y).unwrap();
        let out = graph.sub(xy, x).unwrap();
        graph.declare_output("out", out).unwrap();
        let path = dir.join("graph.json");
        fs::write(&path, serde_json::to_vec(&fhegraph_wire::decompose(&graph)).unwrap()).unwrap();
        path
    }

    #[test]
    fn files_flow_through_every_role() {
        let dir = scratch("flow");
        let graph = write_graph(&dir);
        assert_eq!(run_keygen(&graph, Some(SchemeKind::Bfv), None, None, &dir), 0);

        let inputs: Valuation = [
            ("x", PlainValue::I64Vec(vec![1, 2, 3, 4])),
            ("y", PlainValue::I64(5)),
        ]
        .into_iter()
        .collect();
        let inputs_path = dir.join("inputs.json");
        fs::write(&inputs_path, serde_json::to_vec(&inputs).unwrap()).unwrap();

        let client = dir.join("client.bundle");
        let server = dir.join("server.bundle");
        let input_blob = dir.join("inputs.blob");
        let output_blob = dir.join("outputs.blob");
        let result_path = dir.join("result.json");
        assert_eq!(run_encrypt(&client, &inputs_path, &input_blob), 0);
        assert_eq!(run_execute(&server, &input_blob, &output_blob), 0);
        assert_eq!(run_decrypt(&client, &output_blob, Some(&result_path)), 0);

        let result: Valuation = serde_json::from_slice(&fs::read(&result_path).unwrap()).unwrap();
        assert_eq!(result.get("out"), Some(&PlainValue::I64Vec(vec![4, 8, 12, 16])));

        // The server bundle holds no secret key, the client bundle no graph.
        assert_eq!(run_decrypt(&server, &output_blob, None), 1);
        assert_eq!(run_execute(&client, &input_blob, &output_blob), 1);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn exit_codes_name_the_failure() {
        let dir = scratch("codes");
        let missing = dir.join("missing.json");
        assert_eq!(run_keygen(&missing, Some(SchemeKind::Ckks), None, None, &dir), 3);

        let mut graph = Graph::new("bad", 4).unwrap();
        graph.declare_input("x", DataType::Cipher).unwrap();
        let path = dir.join("bad.json");
        fs::write(&path, serde_json::to_vec(&fhegraph_wire::decompose(&graph)).unwrap()).unwrap();
        assert_eq!(run_keygen(&path, Some(SchemeKind::Ckks), None, None, &dir), 2);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn keygen_infers_the_scheme_when_none_is_given() {
        let dir = scratch("infer");
        let mut graph = Graph::new("halve", 1).unwrap();
        let x = graph.declare_input("x", DataType::Cipher).unwrap();
        let two = graph.constant(ConstValue::Int(vec![2])).unwrap();
        let half = graph.div(x, two).unwrap();
        graph.declare_output("half", half).unwrap();
        let path = dir.join("halve.json");
        fs::write(&path, serde_json::to_vec(&fhegraph_wire::decompose(&graph)).unwrap()).unwrap();

        assert_eq!(run_keygen(&path, None, None, None, &dir), 0);
        let server = fs::read(dir.join("server.bundle")).unwrap();
        assert_eq!(scheme_of(&server).ok(), Some(SchemeKind::Bitwise));

        let mut mixed = Graph::new("mixed", 4).unwrap();
        let x = mixed.declare_input("x", DataType::Cipher).unwrap();
        let byte = mixed.constant(ConstValue::Byte(1)).unwrap();
        let half = mixed.constant(ConstValue::Float(vec![0.5])).unwrap();
        let sum = mixed.add(x, byte).unwrap();
        let scaled = mixed.mul(sum, half).unwrap();
        mixed.declare_output("scaled", scaled).unwrap();
        let path = dir.join("mixed.json");
        fs::write(&path, serde_json::to_vec(&fhegraph_wire::decompose(&mixed)).unwrap()).unwrap();
        assert_eq!(run_keygen(&path, None, None, None, &dir), 2);
        fs::remove_dir_all(&dir).unwrap();
    }
}
