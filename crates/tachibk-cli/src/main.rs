//! tachibk - Convert manga reader backups to JSON and back
//!
//! The backup schema is generated from the fork's Kotlin model sources,
//! compiled with `protoc` and cached next to the generated schema text.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use prost_reflect::DescriptorPool;
use std::fs;
use std::path::{Path, PathBuf};
use tachibk_core::backup::{read_backup, write_backup};
use tachibk_core::compiler::{encode_descriptor_set, load_descriptor_set, DEFAULT_PROTOC};
use tachibk_core::{
    BackupConverter, ConverterConfig, DirectorySource, ExtractorConfig, Fork, GitHubSource,
    ProtocCompiler, SchemaCompiler, SchemaDocument, SchemaExtractor, StatsWriter,
};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Directory for converted files when no output is given
const OUTPUT_DIR: &str = "output";

/// Convert tachibk backups to JSON and back
#[derive(Parser, Debug)]
#[command(name = "tachibk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Backup to decode (.tachibk, .proto.gz) or JSON document to encode (.json)
    #[arg(short, long, required_unless_present = "dump_schemas")]
    input: Option<PathBuf>,

    /// Output file; .tachibk and .proto.gz outputs are gzip compressed
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Fork the backup comes from
    #[arg(long, value_enum, default_value = "mihon")]
    fork: ForkArg,

    /// Write the schema of every supported fork and exit
    #[arg(long)]
    dump_schemas: bool,

    /// Translate preference payloads to and from readable values; when
    /// encoding, the JSON must have been decoded with this flag too
    #[arg(long)]
    convert_preferences: bool,

    /// Directory holding generated schemas and compiled descriptor sets
    #[arg(long, default_value = "schemas")]
    schema_dir: PathBuf,

    /// Read model sources from a local checkout instead of GitHub
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Protobuf compiler to run
    #[arg(long, env = "PROTOC", default_value = DEFAULT_PROTOC)]
    protoc: PathBuf,

    /// Regenerate the schema even when one exists
    #[arg(long)]
    refresh_schema: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Supported forks
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ForkArg {
    /// mihonapp/mihon
    Mihon,
    /// jobobby04/TachiyomiSY
    Sy,
    /// Jays2Kings/tachiyomiJ2K
    J2k,
    /// null2264/yokai
    Yokai,
    /// komikku-app/komikku
    Komikku,
}

impl From<ForkArg> for Fork {
    fn from(arg: ForkArg) -> Self {
        match arg {
            ForkArg::Mihon => Fork::Mihon,
            ForkArg::Sy => Fork::Sy,
            ForkArg::J2k => Fork::J2k,
            ForkArg::Yokai => Fork::Yokai,
            ForkArg::Komikku => Fork::Komikku,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    if cli.dump_schemas {
        return dump_schemas(&cli);
    }

    match cli.input {
        Some(ref input) => convert(&cli, input),
        None => anyhow::bail!("--input is required unless --dump-schemas is given"),
    }
}

/// Write `schema-<fork>.proto` for every fork, or only the selected one when
/// sources come from a local directory
fn dump_schemas(cli: &Cli) -> Result<()> {
    let forks = match cli.source_dir {
        Some(_) => vec![Fork::from(cli.fork)],
        None => Fork::ALL.to_vec(),
    };

    info!("Generating schemas for {} forks", forks.len());
    for fork in forks {
        let document = extract_schema(cli, fork)?;
        let path = write_schema(&cli.schema_dir, fork, &document)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

/// Decode a backup to JSON, or encode a JSON document into a backup
fn convert(cli: &Cli, input: &Path) -> Result<()> {
    if !input.is_file() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }

    let compiler = ProtocCompiler::new(&cli.protoc);
    let pool = load_pool(cli, &compiler)?;
    let config = ConverterConfig::new().convert_preferences(cli.convert_preferences);
    let converter = BackupConverter::new(&pool, config)?;
    let output = cli.output.clone().unwrap_or_else(|| default_output(input));

    if is_json(input) {
        let text = fs::read_to_string(input)
            .with_context(|| format!("Failed to read input file: {}", input.display()))?;
        let document = serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON in {}", input.display()))?;
        let bytes = converter.from_json(document)?;

        let compressed = write_backup(&output, &bytes)?;
        info!(
            "{} backup written to {}",
            if compressed { "Compressed" } else { "Uncompressed" },
            output.display()
        );
    } else {
        let data = read_backup(input)?;
        let document = converter.to_json(&data)?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(&output, serde_json::to_string_pretty(&document)?)
            .with_context(|| format!("Failed to write file: {}", output.display()))?;
        info!("Backup decoded to {}", output.display());
    }

    println!("Wrote {}", output.display());
    Ok(())
}

/// Loads the compiled schema for the selected fork, generating and
/// compiling it when needed
fn load_pool(cli: &Cli, compiler: &impl SchemaCompiler) -> Result<DescriptorPool> {
    let fork = Fork::from(cli.fork);
    let schema_path = schema_path(&cli.schema_dir, fork);

    if cli.refresh_schema || !schema_path.exists() {
        if !cli.refresh_schema {
            warn!("No {} schema found, generating one", fork);
        }
        let document = extract_schema(cli, fork)?;
        write_schema(&cli.schema_dir, fork, &document)?;
    }

    let schema = fs::read_to_string(&schema_path)
        .with_context(|| format!("Failed to read schema: {}", schema_path.display()))?;
    compile_cached(&cli.schema_dir, &schema, compiler)
}

/// Runs the extractor over the configured source
fn extract_schema(cli: &Cli, fork: Fork) -> Result<SchemaDocument> {
    let config = ExtractorConfig::new().fork(fork);
    let document = match cli.source_dir {
        Some(ref dir) => SchemaExtractor::with_config(DirectorySource::new(dir), config).extract(),
        None => SchemaExtractor::with_config(GitHubSource::new(fork)?, config).extract(),
    };
    document.with_context(|| format!("Failed to extract the {} schema", fork))
}

fn schema_path(schema_dir: &Path, fork: Fork) -> PathBuf {
    schema_dir.join(format!("schema-{}.proto", fork))
}

/// Writes the rendered schema, logging what it contains
fn write_schema(schema_dir: &Path, fork: Fork, document: &SchemaDocument) -> Result<PathBuf> {
    let mut stats = StatsWriter::default();
    document.walk(&mut stats)?;
    info!(
        "{}: {} sections, {} messages, {} fields",
        fork, stats.section_count, stats.message_count, stats.field_count
    );

    fs::create_dir_all(schema_dir)
        .with_context(|| format!("Failed to create directory: {}", schema_dir.display()))?;
    let path = schema_path(schema_dir, fork);
    fs::write(&path, document.to_text())
        .with_context(|| format!("Failed to write file: {}", path.display()))?;
    Ok(path)
}

/// Cache file for a schema text: first 16 hex chars of its blake3 hash
fn cache_path(schema_dir: &Path, schema: &str) -> PathBuf {
    let hash = blake3::hash(schema.as_bytes());
    schema_dir.join(format!("{}.binpb", &hash.to_hex()[..16]))
}

/// Compiles `schema`, reusing a previously compiled descriptor set of the
/// same text
fn compile_cached(
    schema_dir: &Path,
    schema: &str,
    compiler: &impl SchemaCompiler,
) -> Result<DescriptorPool> {
    let cache = cache_path(schema_dir, schema);

    if cache.is_file() {
        debug!("Using compiled schema {}", cache.display());
        let bytes = fs::read(&cache)
            .with_context(|| format!("Failed to read file: {}", cache.display()))?;
        return Ok(load_descriptor_set(&bytes)?);
    }

    let pool = compiler.compile(schema)?;
    fs::create_dir_all(schema_dir)
        .with_context(|| format!("Failed to create directory: {}", schema_dir.display()))?;
    fs::write(&cache, encode_descriptor_set(&pool))
        .with_context(|| format!("Failed to write file: {}", cache.display()))?;
    debug!("Cached compiled schema at {}", cache.display());
    Ok(pool)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// `output/output.tachibk` when encoding, `output/output.json` when decoding
fn default_output(input: &Path) -> PathBuf {
    let name = if is_json(input) {
        "output.tachibk"
    } else {
        "output.json"
    };
    Path::new(OUTPUT_DIR).join(name)
}
