//!
//! This module is the main entry point for all CLI commands and drives the
//! engine on rule files read from disk.

use std::{
    fs,
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use crate::{
    config::EngineConfig,
    engine::Engine,
    errors::{print_error, ErrorKind, Message, SelError},
    memory::InMemoryEngine,
    types::Value,
};

pub mod args;

pub use args::{Command, SelruleArgs};

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "SELRULE_LOG";

/// File extension of rule sources picked up by `verify`.
pub const SOURCE_EXTENSION: &str = "sel";

// ============================================================================
// CLI DISPATCHER - Main entry point
// ============================================================================

/// Parses the command line, sets up logging and runs the chosen command.
pub fn run() {
    let args = SelruleArgs::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => EngineConfig::load(path).unwrap_or_else(|e| exit_with(e)),
        None => EngineConfig::default(),
    };

    let result = match args.command {
        Command::Verify { path, data } => handle_verify(config, &path, data.as_deref()),
        Command::Ast { file, data } => handle_ast(config, &file, data.as_deref()),
        Command::Scopes { file, data } => handle_scopes(config, &file, data.as_deref()),
        Command::Run {
            file,
            data,
            rule,
            args,
        } => handle_run(config, &file, &data, &rule, &args),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => exit_with(e),
    }
}

/// Installs the stderr subscriber. `SELRULE_LOG` wins over `-v`.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ============================================================================
// COMMAND HANDLERS - Each returns Ok(false) when errors were reported
// ============================================================================

fn handle_verify(config: EngineConfig, path: &Path, data: Option<&Path>) -> Result<bool, SelError> {
    let engine = engine_with_data(config, data)?;
    let files = source_files(path)?;
    let mut errors = 0;
    let mut warnings = 0;

    for file in &files {
        let text = read_file(file)?;
        let verification = engine.verify(&display_name(file), &text);
        report_messages(file, &verification.messages);
        let failed = verification.messages.iter().filter(|m| m.is_error()).count();
        errors += failed;
        warnings += verification.messages.len() - failed;
    }

    println!(
        "{} file(s) verified, {} error(s), {} warning(s)",
        files.len(),
        errors,
        warnings
    );
    Ok(errors == 0)
}

fn handle_ast(config: EngineConfig, file: &Path, data: Option<&Path>) -> Result<bool, SelError> {
    let engine = engine_with_data(config, data)?;
    let text = read_file(file)?;
    let verification = engine.verify(&display_name(file), &text);
    report_messages(file, &verification.messages);
    println!("{}", to_json(&verification.unit)?);
    Ok(!verification.has_errors())
}

fn handle_scopes(config: EngineConfig, file: &Path, data: Option<&Path>) -> Result<bool, SelError> {
    let engine = engine_with_data(config, data)?;
    if !compile_file(&engine, file)? {
        return Ok(false);
    }
    println!("{}", to_json(&engine.scope_summary())?);
    Ok(true)
}

fn handle_run(
    config: EngineConfig,
    file: &Path,
    data: &Path,
    rule: &str,
    args: &[String],
) -> Result<bool, SelError> {
    let engine = engine_with_data(config, Some(data))?;
    if !compile_file(&engine, file)? {
        return Ok(false);
    }
    let values: Vec<Value> = args.iter().map(|arg| parse_argument(arg)).collect();
    debug!(rule, arguments = values.len(), "invoking");
    let records = engine.invoke(rule, values)?;
    info!(rule, records = records.len(), "rule returned");
    println!("{}", to_json(&records)?);
    Ok(true)
}

// ============================================================================
// HELPERS
// ============================================================================

fn engine_with_data(config: EngineConfig, data: Option<&Path>) -> Result<Engine, SelError> {
    let engine = Engine::new(config);
    if let Some(path) = data {
        let memory = InMemoryEngine::from_json(&read_file(path)?)?;
        engine.register_data_engine(Arc::new(memory));
    }
    Ok(engine)
}

/// Compiles `file` into `engine`, printing the messages. Returns whether the
/// unit was accepted.
fn compile_file(engine: &Engine, file: &Path) -> Result<bool, SelError> {
    let text = read_file(file)?;
    match engine.compile(&display_name(file), &text) {
        Ok(compilation) => {
            report_messages(file, &compilation.messages);
            Ok(true)
        }
        Err(SelError {
            kind: ErrorKind::CompilationFailed { messages, .. },
            ..
        }) => {
            report_messages(file, &messages);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Arguments are JSON when they parse as JSON, text otherwise. Parameter
/// conversion takes care of dates written as plain text.
fn parse_argument(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::Text(arg.to_string()))
}

/// A single file is taken as given; directories are searched for sources.
fn source_files(path: &Path) -> Result<Vec<PathBuf>, SelError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(io_error(path, "no such file or directory"));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|file| file.extension().is_some_and(|ext| ext == SOURCE_EXTENSION))
        .collect();
    files.sort();
    Ok(files)
}

fn report_messages(file: &Path, messages: &[Message]) {
    for message in messages {
        eprintln!("{}:{}", file.display(), message);
    }
}

fn read_file(path: &Path) -> Result<String, SelError> {
    fs::read_to_string(path).map_err(|e| io_error(path, &e.to_string()))
}

fn io_error(path: &Path, message: &str) -> SelError {
    SelError::new(
        ErrorKind::Io {
            path: path.display().to_string(),
            message: message.to_string(),
        },
        "cli",
    )
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, SelError> {
    serde_json::to_string_pretty(value).map_err(|e| {
        SelError::new(
            ErrorKind::Io {
                path: "<stdout>".to_string(),
                message: e.to_string(),
            },
            "cli",
        )
    })
}

fn display_name(path: &Path) -> String {
    path.display().to_string()
}

fn exit_with(error: SelError) -> ! {
    print_error(error);
    process::exit(1);
}
