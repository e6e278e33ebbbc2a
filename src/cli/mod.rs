//! rustmatch CLI entrypoint.
//!
//! Replays captured descriptor dumps through a [`CaptureSession`] against a
//! goal descriptor dump and reports the correspondences found per capture.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{ArgAction, Parser, ValueEnum};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::{ConfigError, ConfigLoader, MatchConfig, MatchStrategy};
use crate::features::FeatureError;
use crate::io::{load_descriptor_set, DescriptorFileError};
use crate::session::{CaptureSession, MatchMarker, MatchRecorder, PrecomputedExtractor, ScriptedEvents};

/// rustmatch command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "rustmatch", version, about = "Match captured descriptors against a goal image")]
struct CliArgs {
    /// Goal image descriptor dump (JSON).
    #[arg(long, value_name = "FILE")]
    reference: Option<PathBuf>,
    /// Captured descriptor dump (JSON); repeat for several captures.
    #[arg(long, value_name = "FILE")]
    query: Vec<PathBuf>,
    /// Path to a YAML or TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Matching strategy.
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
    /// Ratio test threshold in (0, 1].
    #[arg(long, value_name = "RATIO")]
    ratio: Option<f64>,
    /// Number of randomized kd-trees (approximate strategy).
    #[arg(long, value_name = "N")]
    trees: Option<usize>,
    /// Leaf checks per query (approximate strategy).
    #[arg(long, value_name = "N")]
    checks: Option<usize>,
    /// Search only reference descriptors with the query's discriminator
    /// (approximate strategy).
    #[arg(long, action = ArgAction::SetTrue)]
    partition_by_discriminator: bool,
    /// Output format for results.
    #[arg(long, value_enum)]
    output_format: Option<OutputFormat>,
    /// Log verbosity level.
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
    /// Log format (text/json).
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum StrategyArg {
    Exact,
    Approximate,
}

impl From<StrategyArg> for MatchStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Exact => MatchStrategy::Exact,
            StrategyArg::Approximate => MatchStrategy::Approximate,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("reference descriptor file is required but was not provided")]
    ReferenceNotProvided,
    #[error("input file not found: {0}")]
    InputMissing(PathBuf),
    #[error("input path is not a file: {0}")]
    InputNotFile(PathBuf),
    #[error("failed to load config file {path}: {source}")]
    ConfigLoad { path: PathBuf, source: ConfigError },
    #[error("{0}")]
    ConfigInvalid(ConfigError),
    #[error(transparent)]
    DescriptorFile(#[from] DescriptorFileError),
    #[error("matching failed: {0}")]
    Matching(#[from] FeatureError),
    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write results: {0}")]
    OutputWrite(#[from] std::io::Error),
}

impl CliError {
    fn exit_status(&self) -> u8 {
        match self {
            CliError::ReferenceNotProvided
            | CliError::InputMissing(_)
            | CliError::InputNotFile(_)
            | CliError::ConfigLoad { .. }
            | CliError::ConfigInvalid(_)
            | CliError::DescriptorFile(_) => 1,
            CliError::Matching(_) | CliError::Serialize(_) | CliError::OutputWrite(_) => 2,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            CliError::ReferenceNotProvided
            | CliError::InputMissing(_)
            | CliError::InputNotFile(_)
            | CliError::DescriptorFile(_) => "InputError",
            CliError::ConfigLoad { .. } | CliError::ConfigInvalid(_) => "ConfigError",
            CliError::Matching(_) => "MatchError",
            CliError::Serialize(_) | CliError::OutputWrite(_) => "OutputError",
        }
    }

    fn component(&self) -> &'static str {
        match self {
            CliError::ReferenceNotProvided | CliError::InputMissing(_) | CliError::InputNotFile(_) => "cli",
            CliError::ConfigLoad { .. } | CliError::ConfigInvalid(_) => "config",
            CliError::DescriptorFile(_) | CliError::Serialize(_) | CliError::OutputWrite(_) => "io",
            CliError::Matching(_) => "features",
        }
    }

    fn suggestion(&self) -> &'static str {
        match self {
            CliError::ReferenceNotProvided => "Pass --reference <descriptor-file>.",
            CliError::InputMissing(_) => "Verify the input path and ensure the file exists.",
            CliError::InputNotFile(_) => "Provide a descriptor file path (not a directory).",
            CliError::ConfigLoad { .. } => "Use a .yaml, .yml or .toml file whose fields match the schema.",
            CliError::ConfigInvalid(_) => "Check the ratio is in (0, 1] and counts are at least 1.",
            CliError::DescriptorFile(_) => {
                "Descriptor files are JSON with length, descriptors, discriminators and positions."
            }
            CliError::Matching(_) => "Ensure reference and query descriptors have the same length.",
            CliError::Serialize(_) | CliError::OutputWrite(_) => "Check that stdout is writable.",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorInfo {
    error_type: String,
    root_cause: String,
    component: String,
    suggestion: String,
}

#[derive(Debug, Serialize)]
struct Diagnostics {
    os: String,
    arch: String,
    rustmatch_version: String,
    cwd: String,
    reference: Option<String>,
    config: Option<String>,
}

/// One displayed capture
#[derive(Debug, Serialize)]
struct CaptureReport {
    frame_index: usize,
    query: Option<String>,
    query_count: usize,
    match_count: usize,
    processing_time_ms: f64,
    matches: Vec<MatchMarker>,
}

#[derive(Debug, Serialize)]
struct MatchReport {
    reference: String,
    reference_count: usize,
    reference_load_ms: f64,
    strategy: String,
    captures: Vec<CaptureReport>,
    skipped: usize,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct ResultsJson {
    status: String,
    processing_time_ms: u128,
    report: Option<MatchReport>,
    error: Option<ErrorInfo>,
    diagnostics: Diagnostics,
}

pub fn run() -> ExitCode {
    let start = Instant::now();
    let cli = CliArgs::parse();

    init_logger(&resolve_log_level(&cli), cli.log_format.unwrap_or_default());
    let output_format = cli.output_format.unwrap_or_default();

    let report = match execute(&cli) {
        Ok(report) => report,
        Err(err) => return handle_error(&err, start, &cli, output_format),
    };

    let results = ResultsJson {
        status: "success".to_string(),
        processing_time_ms: start.elapsed().as_millis(),
        report: Some(report),
        error: None,
        diagnostics: build_diagnostics(&cli),
    };

    if let Err(err) = write_results(&results, output_format) {
        return handle_error(&err, start, &cli, output_format);
    }

    ExitCode::SUCCESS
}

fn execute(cli: &CliArgs) -> Result<MatchReport, CliError> {
    let mut config = load_config(cli)?;
    for override_entry in apply_overrides(&mut config, cli) {
        debug!("CLI override: {}", override_entry);
    }
    config.validate().map_err(CliError::ConfigInvalid)?;

    let reference_path = cli.reference.clone().ok_or(CliError::ReferenceNotProvided)?;
    ensure_file(&reference_path)?;
    for query in &cli.query {
        ensure_file(query)?;
    }

    let load_started = Instant::now();
    let reference = load_descriptor_set(&reference_path)?;
    let reference_load_ms = load_started.elapsed().as_secs_f64() * 1000.0;
    info!(
        "Reference descriptors: {} from {} (loaded in {:.2} ms)",
        reference.len(),
        reference_path.display(),
        reference_load_ms
    );

    let queries = cli
        .query
        .iter()
        .map(|path| load_descriptor_set(path))
        .collect::<Result<Vec<_>, _>>()?;

    let reference_count = reference.len();
    let strategy = config.matcher.strategy;
    let events = ScriptedEvents::captures(queries.len(), config.session.capture_key, config.session.quit_key);
    let mut session = CaptureSession::new(
        config,
        reference,
        events,
        PrecomputedExtractor::new(queries),
        MatchRecorder::default(),
    )?;

    let summary = session.run();
    let captures = summary
        .cycles
        .iter()
        .zip(session.renderer().frames())
        .map(|(cycle, markers)| CaptureReport {
            frame_index: cycle.frame_index,
            query: cli.query.get(cycle.frame_index).map(|path| path.display().to_string()),
            query_count: cycle.query_count,
            match_count: cycle.matches.len(),
            processing_time_ms: cycle.elapsed.as_secs_f64() * 1000.0,
            matches: markers.clone(),
        })
        .collect();

    Ok(MatchReport {
        reference: reference_path.display().to_string(),
        reference_count,
        reference_load_ms,
        strategy: strategy.as_str().to_string(),
        captures,
        skipped: summary.skipped,
        failed: summary.failed,
    })
}

fn load_config(cli: &CliArgs) -> Result<MatchConfig, CliError> {
    match &cli.config {
        Some(path) => ConfigLoader::load(path).map_err(|source| CliError::ConfigLoad {
            path: path.clone(),
            source,
        }),
        None => Ok(MatchConfig::default()),
    }
}

fn ensure_file(path: &Path) -> Result<(), CliError> {
    if !path.exists() {
        return Err(CliError::InputMissing(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(CliError::InputNotFile(path.to_path_buf()));
    }
    Ok(())
}

fn resolve_log_level(cli: &CliArgs) -> String {
    if let Some(level) = cli.log_level {
        return level.as_str().to_string();
    }

    if let Ok(level) = std::env::var("RUST_LOG") {
        if !level.trim().is_empty() {
            return level;
        }
    }

    "info".to_string()
}

fn init_logger(level: &str, format: LogFormat) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(log::LevelFilter::Info);
    builder.parse_filters(level);
    builder.format(move |buf, record| {
        let module = record.module_path().unwrap_or(record.target());
        match format {
            LogFormat::Json => {
                let payload = json!({
                    "timestamp": buf.timestamp_millis().to_string(),
                    "level": record.level().to_string(),
                    "target": module,
                    "message": record.args().to_string(),
                });
                writeln!(buf, "{}", payload)
            }
            LogFormat::Text => {
                writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    buf.timestamp_millis(),
                    record.level(),
                    module,
                    record.args()
                )
            }
        }
    });

    if let Err(err) = builder.try_init() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

fn apply_overrides(config: &mut MatchConfig, cli: &CliArgs) -> Vec<String> {
    let mut overrides = Vec::new();
    let matcher = &mut config.matcher;

    if let Some(strategy) = cli.strategy.map(MatchStrategy::from) {
        if matcher.strategy != strategy {
            overrides.push(format!("matcher.strategy = {}", strategy.as_str()));
        }
        matcher.strategy = strategy;
    }

    if let Some(ratio) = cli.ratio {
        if matcher.ratio != ratio {
            overrides.push(format!("matcher.ratio = {}", ratio));
        }
        matcher.ratio = ratio;
    }

    if let Some(trees) = cli.trees {
        if matcher.tree_count != trees {
            overrides.push(format!("matcher.tree_count = {}", trees));
        }
        matcher.tree_count = trees;
    }

    if let Some(checks) = cli.checks {
        if matcher.search_budget != checks {
            overrides.push(format!("matcher.search_budget = {}", checks));
        }
        matcher.search_budget = checks;
    }

    if cli.partition_by_discriminator && !matcher.partition_by_discriminator {
        overrides.push("matcher.partition_by_discriminator = true".to_string());
        matcher.partition_by_discriminator = true;
    }

    overrides
}

fn write_results(results: &ResultsJson, format: OutputFormat) -> Result<(), CliError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Json => {
            let payload = serde_json::to_string_pretty(results)?;
            writeln!(out, "{}", payload)?;
        }
        OutputFormat::Text => write_text_summary(&mut out, results)?,
    }
    out.flush()?;
    Ok(())
}

fn write_text_summary<W: Write>(out: &mut W, results: &ResultsJson) -> std::io::Result<()> {
    writeln!(out, "rustmatch results")?;
    writeln!(out, "Status: {}", results.status)?;
    if let Some(report) = &results.report {
        writeln!(
            out,
            "Reference: {} ({} descriptors, loaded in {:.2} ms)",
            report.reference, report.reference_count, report.reference_load_ms
        )?;
        writeln!(out, "Strategy: {}", report.strategy)?;
        for capture in &report.captures {
            writeln!(
                out,
                "Capture {}: object descriptors: {}   matches: {}   process time(ms): {:.2}",
                capture.frame_index, capture.query_count, capture.match_count, capture.processing_time_ms
            )?;
            for marker in &capture.matches {
                writeln!(
                    out,
                    "  ({:.1}, {:.1}) -> ({:.1}, {:.1})",
                    marker.query_position.0,
                    marker.query_position.1,
                    marker.reference_position.0,
                    marker.reference_position.1
                )?;
            }
        }
        writeln!(out, "Skipped captures: {}", report.skipped)?;
        writeln!(out, "Failed captures: {}", report.failed)?;
    }
    if let Some(error) = &results.error {
        writeln!(out, "Error: {} ({})", error.root_cause, error.error_type)?;
    }
    writeln!(out, "Processing time (ms): {}", results.processing_time_ms)
}

fn build_diagnostics(cli: &CliArgs) -> Diagnostics {
    Diagnostics {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        rustmatch_version: env!("CARGO_PKG_VERSION").to_string(),
        cwd: std::env::current_dir()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|_| "<unavailable>".to_string()),
        reference: cli.reference.as_ref().map(|path| path.display().to_string()),
        config: cli.config.as_ref().map(|path| path.display().to_string()),
    }
}

fn handle_error(err: &CliError, start: Instant, cli: &CliArgs, output_format: OutputFormat) -> ExitCode {
    let diagnostics = build_diagnostics(cli);
    let error_info = ErrorInfo {
        error_type: err.error_type().to_string(),
        root_cause: err.to_string(),
        component: err.component().to_string(),
        suggestion: err.suggestion().to_string(),
    };

    error!(
        "{}: {} (component: {})",
        error_info.error_type, error_info.root_cause, error_info.component
    );

    eprintln!("Error: {}", error_info.error_type);
    eprintln!("Component: {}", error_info.component);
    eprintln!("Cause: {}", error_info.root_cause);
    eprintln!("Suggestion: {}", error_info.suggestion);
    eprintln!(
        "Diagnostics: os={}, arch={}, cwd={}",
        diagnostics.os, diagnostics.arch, diagnostics.cwd
    );

    let results = ResultsJson {
        status: "error".to_string(),
        processing_time_ms: start.elapsed().as_millis(),
        report: None,
        error: Some(error_info),
        diagnostics,
    };

    if output_format == OutputFormat::Json {
        if let Err(write_err) = write_results(&results, output_format) {
            eprintln!("Failed to write error report: {}", write_err);
        }
    }

    ExitCode::from(err.exit_status())
}
