//! CLI: infer | validate | encode | decode
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cty::codec::{self, type_json};
use cty::{Config, Engine, Inference, Native, Type};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// infer, check and transcode CTY values
#[derive(Parser, Debug)]
#[command(name = "cty", version)]
pub struct CommandLineInterface {
    /// log filter, e.g. `info` or `cty=debug` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// config file (defaults to ./cty.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// infer one type covering every input document
    Infer(InferOut),
    /// check JSON documents against a type
    Validate(ValidateOut),
    /// JSON document -> wire bytes
    Encode(EncodeOut),
    /// wire bytes -> JSON
    Decode(DecodeOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct TypeSettings {
    /// type in wire JSON, e.g. '["list","string"]', or @path to a file holding it
    #[arg(long = "type", short = 't')]
    type_spec: String,
}

#[derive(clap::Parser, Debug)]
struct InferOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ValidateOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    type_settings: TypeSettings,
}

#[derive(clap::Parser, Debug)]
struct EncodeOut {
    #[command(flatten)]
    type_settings: TypeSettings,

    #[arg(long, value_enum, default_value_t = Format::Msgpack)]
    format: Format,

    /// JSON document to encode
    #[arg(long, short)]
    input: PathBuf,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct DecodeOut {
    #[command(flatten)]
    type_settings: TypeSettings,

    #[arg(long, value_enum, default_value_t = Format::Msgpack)]
    format: Format,

    /// wire bytes to decode
    #[arg(long, short)]
    input: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Format {
    Json,
    Msgpack,
}

/// One input document and where it came from.
struct Document {
    label: String,
    json: serde_json::Value,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load_documents(&self) -> anyhow::Result<Vec<Document>> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        let mut documents = Vec::new();
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file {source_path_str}"))?;
            let mut push = |label: String, text: &str| -> anyhow::Result<()> {
                let json = serde_json::from_str::<serde_json::Value>(text)
                    .with_context(|| format!("failed to parse JSON ({label})"))?;
                match self.select(json) {
                    Some(json) => documents.push(Document { label, json }),
                    None => warn!(%label, "json pointer selected nothing; skipping"),
                }
                Ok(())
            };
            if self.ndjson {
                for (line_no, line) in source.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    push(format!("{source_path_str}:{}", line_no + 1), line)?;
                }
            } else {
                push(source_path_str.clone(), &source)?;
            }
            debug!(path = %source_path_str, "loaded");
        }
        info!(documents = documents.len(), "inputs loaded");
        Ok(documents)
    }

    fn select(&self, json: serde_json::Value) -> Option<serde_json::Value> {
        match self.json_pointer.as_deref() {
            None => Some(json),
            Some(pointer) => json.pointer(pointer).cloned(),
        }
    }
}

impl TypeSettings {
    fn load(&self) -> anyhow::Result<Type> {
        let (origin, src) = match self.type_spec.strip_prefix('@') {
            Some(path) => {
                let src = std::fs::read_to_string(path).with_context(|| format!("failed to read type file {path}"))?;
                (path.to_string(), src)
            }
            None => ("--type".to_string(), self.type_spec.clone()),
        };
        cty::path_de::from_str_with_path::<Type>(&src).with_context(|| format!("invalid type in {origin}"))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn init_tracing(&self) {
        let filter = match self.log_level.as_deref() {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        };
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    pub fn run(&self) -> anyhow::Result<ExitCode> {
        let config = Config::load(self.config.as_deref()).context("failed to load configuration")?;
        debug!(?config, "configuration");
        let engine = Engine::new(config);

        match &self.cmd {
            Command::Infer(target) => {
                let mut inference = Inference::new();
                for document in target.input_settings.load_documents()? {
                    inference.observe_json(&document.json);
                }
                let ty = inference.solve();
                info!(samples = inference.samples(), %ty, "inferred");
                let rendered = type_json::to_string(&ty)?;
                emit(target.out.as_deref(), format!("{rendered}\n").as_bytes())?;
                Ok(ExitCode::SUCCESS)
            }
            Command::Validate(target) => {
                let ty = target.type_settings.load()?;
                let documents = target.input_settings.load_documents()?;
                let outcomes: Vec<(String, Result<(), String>)> = documents
                    .into_par_iter()
                    .map(|Document { label, json }| {
                        let outcome = engine.validate(&Native::from(json), &ty).map(|_| ()).map_err(|err| err.to_string());
                        (label, outcome)
                    })
                    .collect();

                let mut failures = 0usize;
                for (label, outcome) in &outcomes {
                    match outcome {
                        Ok(()) => println!("{} {label}", "ok".green()),
                        Err(error) => {
                            failures += 1;
                            println!("{} {label}: {error}", "invalid".red().bold());
                        }
                    }
                }
                info!(checked = outcomes.len(), failures, "validation finished");
                Ok(if failures == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
            }
            Command::Encode(target) => {
                let ty = target.type_settings.load()?;
                let source = std::fs::read_to_string(&target.input)
                    .with_context(|| format!("failed to read {}", target.input.display()))?;
                let json: serde_json::Value = serde_json::from_str(&source)
                    .with_context(|| format!("failed to parse JSON ({})", target.input.display()))?;
                let value = engine.validate(&Native::from(json), &ty)?;
                let bytes = match target.format {
                    Format::Json => codec::encode_json_as(&value, &ty)?,
                    Format::Msgpack => codec::encode_msgpack_as(&value, &ty)?,
                };
                info!(bytes = bytes.len(), format = ?target.format, "encoded");
                emit(target.out.as_deref(), &bytes)?;
                Ok(ExitCode::SUCCESS)
            }
            Command::Decode(target) => {
                let ty = target.type_settings.load()?;
                let bytes = std::fs::read(&target.input)
                    .with_context(|| format!("failed to read {}", target.input.display()))?;
                let value = match target.format {
                    Format::Json => engine.decode_json(&bytes, &ty)?,
                    Format::Msgpack => engine.decode_msgpack(&bytes, &ty)?,
                };
                let json = codec::json::to_json(&value, value.ty())?;
                println!("{}", serde_json::to_string_pretty(&json)?);
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn emit(out: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, bytes).with_context(|| format!("failed to write {}", out.display()))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
