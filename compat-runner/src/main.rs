//! Cross-implementation MessagePack fixtures.
//!
//! `generate` writes one `<case>.msgpack` per canonical case plus a
//! `manifest.json` describing each (`type`, `value`, `isUnknown`, `isNull`);
//! `verify` decodes every fixture in a directory against its manifest entry,
//! whichever implementation produced it.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};
use tracing::{debug, error, info, trace};
use tracing_subscriber::EnvFilter;

use cty::codec::{self, json::UNKNOWN_SENTINEL_KEY, type_json};
use cty::{Native, Number, Refinement, Type, Value};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// generate and verify cty compatibility fixtures
#[derive(Parser, Debug)]
#[command(name = "compat-runner")]
struct CommandLineInterface {
    /// log filter, e.g. `debug` or `trace`
    #[arg(long, short, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// write fixtures and manifest.json
    Generate {
        /// directory for fixture files
        #[arg(long, short)]
        directory: PathBuf,
    },
    /// decode fixtures and check them against manifest.json
    Verify {
        /// directory holding fixture files and manifest.json
        #[arg(long, short)]
        directory: PathBuf,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
    /// Type the fixture was encoded under.
    #[serde(rename = "type")]
    ty: Type,
    value: Json,
    is_unknown: bool,
    is_null: bool,
}

type Manifest = BTreeMap<String, ManifestEntry>;

// ————————————————————————————————————————————————————————————————————————————
// CASES
// ————————————————————————————————————————————————————————————————————————————

fn validated(raw: Json, ty: &Type) -> anyhow::Result<Value> {
    Ok(cty::validate(&Native::from(raw), ty)?)
}

/// Every case paired with the type it is encoded under.
fn canonical_cases() -> anyhow::Result<Vec<(&'static str, Value, Type)>> {
    let tuple = Type::tuple([Type::String, Type::Number]);
    let nested = Type::object_with_optional(
        [
            ("id", Type::String),
            ("enabled", Type::Bool),
            ("ports", Type::list(Type::Number)),
            ("config", Type::object([("retries", Type::Number), ("params", Type::map(Type::String))])),
            ("metadata", Type::map(Type::String)),
            ("extra", Type::String),
        ],
        ["metadata"],
    )?;
    let nested_value = cty::validate(
        &Native::map([
            ("id", Native::from("rs-obj1")),
            ("enabled", Native::from(true)),
            ("ports", Native::from(json!([8080, 8443]))),
            ("config", Native::from(json!({"retries": 3, "params": {"timeout": "10s"}}))),
            ("metadata", Native::Absent),
            ("extra", Native::Value(Value::unknown(Type::String))),
        ]),
        &nested,
    )?;
    let large: Number = "340282366920938463463374607431768211456".parse()?;

    let mut cases = vec![
        ("string_simple", validated(json!("hello from rust"), &Type::String)?, Type::String),
        ("number_simple", Value::number(12345i64), Type::Number),
        ("bool_true", Value::bool(true), Type::Bool),
        ("large_number", Value::number(large), Type::Number),
        ("null_string", Value::null(Type::String), Type::String),
        ("unknown_unrefined", Value::unknown(Type::Number), Type::Number),
        (
            "unknown_refined_str",
            Value::unknown_refined(Type::String, Refinement::new().string_prefix("rs-")),
            Type::String,
        ),
        (
            "unknown_refined_num",
            Value::unknown_refined(
                Type::Number,
                Refinement::new()
                    .number_lower_bound(Number::from(100i64), true)
                    .number_upper_bound(Number::from(200i64), false),
            ),
            Type::Number,
        ),
        (
            "unknown_refined_list",
            Value::unknown_refined(
                Type::list(Type::String),
                Refinement::new().length_lower_bound(1).length_upper_bound(5),
            ),
            Type::list(Type::String),
        ),
        ("list_of_strings", validated(json!(["rs-a", "rs-b"]), &Type::list(Type::String))?, Type::list(Type::String)),
        ("set_of_numbers", validated(json!([300, 100, 200]), &Type::set(Type::Number))?, Type::set(Type::Number)),
        ("map_simple", validated(json!({"rs_a": true, "rs_b": false}), &Type::map(Type::Bool))?, Type::map(Type::Bool)),
        (
            "set_of_tuples",
            validated(json!([["a", 1], ["b", 2]]), &Type::set(tuple.clone()))?,
            Type::set(tuple),
        ),
        ("deeply_nested_object", nested_value, nested),
        ("dynamic_wrapped_string", validated(json!("dynamic from rust"), &Type::Dynamic)?, Type::Dynamic),
        ("dynamic_wrapped_object", validated(json!({"key": "rs-value"}), &Type::Dynamic)?, Type::Dynamic),
    ];
    cases.sort_by_key(|(name, ..)| *name);
    Ok(cases)
}

// ————————————————————————————————————————————————————————————————————————————
// GENERATE
// ————————————————————————————————————————————————————————————————————————————

fn generate(directory: &Path) -> anyhow::Result<ExitCode> {
    info!(directory = %directory.display(), "generating fixtures");
    std::fs::create_dir_all(directory).with_context(|| format!("failed to create {}", directory.display()))?;

    let mut manifest = Manifest::new();
    for (name, value, ty) in canonical_cases()? {
        debug!(case = name, %ty, "processing case");
        let bytes = codec::encode_msgpack_as(&value, &ty).with_context(|| format!("failed to encode {name}"))?;
        let path = directory.join(format!("{name}.msgpack"));
        std::fs::write(&path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
        trace!(file = %path.display(), bytes = bytes.len(), "wrote fixture");

        manifest.insert(name.to_string(), ManifestEntry {
            ty,
            value: manifest_native(&value)?,
            is_unknown: value.is_unknown(),
            is_null: value.is_null(),
        });
    }

    let manifest_path = directory.join("manifest.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("failed to write {}", manifest_path.display()))?;
    info!(fixtures = manifest.len(), "generation complete");
    Ok(ExitCode::SUCCESS)
}

/// Plain JSON view of a value: numbers as decimal strings, unknowns as the
/// sentinel object.
fn manifest_native(value: &Value) -> anyhow::Result<Json> {
    if value.is_unknown() {
        return Ok(codec::json::to_json(value, value.ty())?);
    }
    if value.is_null() {
        return Ok(Json::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(Json::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return Ok(Json::String(n.to_plain_string()));
    }
    if let Some(s) = value.as_str() {
        return Ok(Json::String(s.to_string()));
    }
    if let Some(elems) = value.elements() {
        return Ok(Json::Array(elems.iter().map(manifest_native).collect::<anyhow::Result<_>>()?));
    }
    if let Some(entries) = value.entries() {
        let mut out = serde_json::Map::new();
        for (k, v) in entries {
            out.insert(k.clone(), manifest_native(v)?);
        }
        return Ok(Json::Object(out));
    }
    bail!("{} has no manifest form", value.ty())
}

// ————————————————————————————————————————————————————————————————————————————
// VERIFY
// ————————————————————————————————————————————————————————————————————————————

fn verify(directory: &Path) -> anyhow::Result<ExitCode> {
    info!(directory = %directory.display(), "verifying fixtures");
    let manifest_path = directory.join("manifest.json");
    let source = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    let manifest: Manifest = cty::path_de::from_str_with_path(&source)
        .with_context(|| format!("failed to parse {}", manifest_path.display()))?;

    let mut failures = 0usize;
    for (name, entry) in &manifest {
        match verify_case(directory, name, entry) {
            Ok(()) => debug!(case = %name, "verified"),
            Err(err) => {
                failures += 1;
                error!(case = %name, "{err:#}");
            }
        }
    }

    if failures > 0 {
        error!(failures, total = manifest.len(), "verification failed");
        return Ok(ExitCode::FAILURE);
    }
    info!(total = manifest.len(), "all fixtures verified");
    Ok(ExitCode::SUCCESS)
}

fn verify_case(directory: &Path, name: &str, entry: &ManifestEntry) -> anyhow::Result<()> {
    let path = directory.join(format!("{name}.msgpack"));
    let bytes = std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    trace!(case = name, bytes = bytes.len(), ty = %type_json::to_string(&entry.ty)?, "decoding");
    let decoded = codec::decode_msgpack(&bytes, &entry.ty)?;

    if entry.is_unknown {
        if !decoded.is_unknown() {
            bail!("expected unknown, decoded {decoded:?}");
        }
        let expected = codec::decode_json(entry.value.to_string().as_bytes(), &entry.ty)?;
        if decoded.refinement() != expected.refinement() {
            bail!("refinements differ: expected {:?}, decoded {:?}", expected.refinement(), decoded.refinement());
        }
        return Ok(());
    }
    if entry.is_null {
        if !decoded.is_null() {
            bail!("expected null, decoded {decoded:?}");
        }
        return Ok(());
    }
    if !decoded.is_known() {
        bail!("expected a known value, decoded {decoded:?}");
    }
    if !matches(&entry.value, &decoded) {
        bail!("decoded {decoded:?} does not match manifest value {}", entry.value);
    }
    Ok(())
}

/// Whether `value` is what the manifest JSON describes. Set elements match
/// in any order; numbers compare by value whether written as strings or not.
fn matches(expected: &Json, value: &Value) -> bool {
    let sentinel = expected.as_object().is_some_and(|o| o.contains_key(UNKNOWN_SENTINEL_KEY));
    if sentinel {
        return value.is_unknown();
    }
    if expected.is_null() || value.is_null() {
        return expected.is_null() && value.is_null();
    }
    match value.ty() {
        Type::Bool => expected.as_bool() == value.as_bool(),
        Type::Number => {
            let text = match expected {
                Json::String(s) => s.clone(),
                Json::Number(n) => n.to_string(),
                _ => return false,
            };
            text.parse::<Number>().ok().as_ref() == value.as_number()
        }
        Type::String => expected.as_str() == value.as_str(),
        Type::Set(_) => match (expected.as_array(), value.elements()) {
            (Some(xs), Some(elems)) => {
                xs.len() == elems.len() && xs.iter().all(|x| elems.iter().any(|e| matches(x, e)))
            }
            _ => false,
        },
        Type::List(_) | Type::Tuple(_) => match (expected.as_array(), value.elements()) {
            (Some(xs), Some(elems)) => xs.len() == elems.len() && xs.iter().zip(elems).all(|(x, e)| matches(x, e)),
            _ => false,
        },
        Type::Map(_) | Type::Object(_) => match (expected.as_object(), value.entries()) {
            (Some(o), Some(entries)) => {
                o.keys().all(|k| entries.contains_key(k))
                    && entries.iter().all(|(k, v)| matches(o.get(k).unwrap_or(&Json::Null), v))
            }
            _ => false,
        },
        Type::Dynamic | Type::Capsule(_) => false,
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ENTRY
// ————————————————————————————————————————————————————————————————————————————

fn main() -> anyhow::Result<ExitCode> {
    let cli = CommandLineInterface::parse();
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match &cli.cmd {
        Command::Generate { directory } => generate(directory),
        Command::Verify { directory } => verify(directory),
    }
}
