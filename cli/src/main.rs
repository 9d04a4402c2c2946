use std::path::{Component, Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use hogvm_core::{ExecOptions, ExecResult, Globals, Program, execute_json};


static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "hogvm_core=debug,hogvm_stdlib=debug,hogvm_cli=info";
const BYTECODE_EXTENSION: &str = "hoge";

#[derive(Debug, Parser)]
#[command(name = "hogvm", author, version, about = "Run compiled Hog bytecode", long_about = None)]
struct CliArgs {
    /// Compiled program (`.hoge`, JSON bytecode)
    #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
    file: PathBuf,

    /// Wall-clock budget for the run
    #[arg(long, value_name = "MS", default_value_t = 5000)]
    timeout_ms: u64,

    /// Maximum number of executed instructions
    #[arg(long, value_name = "N")]
    max_steps: Option<u64>,

    /// Maximum number of nested script calls
    #[arg(long, value_name = "N")]
    max_call_depth: Option<usize>,

    /// JSON object exposed to the program as globals
    #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
    globals: Option<PathBuf>,

    #[arg(long)]
    team_id: Option<i64>,

    /// Record and print an instruction trace (stderr)
    #[arg(long)]
    debug: bool,

    /// Print the instruction listing instead of running
    #[arg(long, conflicts_with = "json")]
    disassemble: bool,

    /// Print the full result record as JSON
    #[arg(long)]
    json: bool,
}

fn read_file_content(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file '{}'", path.display()))
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);
    if p.components().any(|comp| matches!(comp, Component::ParentDir)) {
        bail!("Parent directory components ('..') are not allowed in file paths.");
    }
    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn check_extension(path: &Path) -> anyhow::Result<()> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(BYTECODE_EXTENSION) => Ok(()),
        _ => bail!(
            "'{}' is not a compiled Hog program (expected a .{BYTECODE_EXTENSION} file)",
            path.display()
        ),
    }
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Installs a stderr subscriber when `HOGVM_TRACE` is set, so logs never mix
/// with program output on stdout.
fn maybe_init_tracing() {
    let Ok(raw) = std::env::var("HOGVM_TRACE") else {
        return;
    };
    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());
        let builder = fmt().with_writer(std::io::stderr);
        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };
        let _ = builder.try_init();
    });
}

fn load_globals(path: Option<&Path>) -> anyhow::Result<Globals> {
    let Some(path) = path else {
        return Ok(Globals::new());
    };
    let text = read_file_content(path)?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in globals file '{}'", path.display()))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("Globals must be a JSON object, got {}", json_kind(&other)),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn build_options(args: &CliArgs) -> ExecOptions {
    let mut options = ExecOptions::new()
        .with_timeout(Duration::from_millis(args.timeout_ms))
        .with_debug(args.debug)
        .with_team_id(args.team_id);
    if let Some(max_steps) = args.max_steps {
        options = options.with_max_steps(max_steps);
    }
    if let Some(depth) = args.max_call_depth {
        options = options.with_max_call_depth(depth);
    }
    options
}

fn disassemble(source: &str) -> anyhow::Result<()> {
    let program = Program::from_json_str(source)?;
    for instruction in program.disassemble()? {
        println!("{instruction}");
    }
    Ok(())
}

/// Prints the outcome of a run and returns the process exit code.
fn report(result: &ExecResult, as_json: bool) -> anyhow::Result<i32> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&result.to_json())?);
    } else {
        for line in &result.stdout {
            println!("{line}");
        }
        for entry in &result.trace {
            eprintln!(
                "{:>6}  {:<20} stack={} calls={}",
                entry.ip,
                entry.opcode.name(),
                entry.stack_depth,
                entry.call_depth
            );
        }
        if let Some(err) = &result.error {
            eprintln!("Error: {}: {}", err.kind(), err.message());
        }
    }
    Ok(if result.is_ok() { 0 } else { 1 })
}

fn run(args: &CliArgs) -> anyhow::Result<i32> {
    check_extension(&args.file)?;
    let source = read_file_content(&args.file)?;
    if args.disassemble {
        disassemble(&source)?;
        return Ok(0);
    }

    let globals = load_globals(args.globals.as_deref())?;
    let registry = hogvm_stdlib::shared_registry()?;
    let options = build_options(args);
    let result = execute_json(&source, &globals, registry, &options);
    report(&result, args.json)
}

fn main() {
    maybe_init_tracing();
    let args = CliArgs::parse();
    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    }
}
