//! permprobe CLI: run the permission prompt matrix against a target executable.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes
#![allow(clippy::fn_params_excessive_bools)] // CLI flags are naturally bools

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use miette::{IntoDiagnostic, Result};
use permprobe::artifacts::ArtifactsWriterConfig;
use permprobe::config::load_config_file;
use permprobe::matrix::{Matrix, MatrixOptions};
use permprobe::model::{HarnessConfig, MatrixReport, PermissionType, ResponseScenario};
use permprobe::runner::{ErrorCode, RunnerError};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod progress;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "PERMPROBE_LOG";

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Debug, Parser)]
#[command(
    name = "permprobe",
    version,
    about = "Drive a permission-prompting CLI through PTYs and verify every prompt interaction"
)]
struct Cli {
    /// Control color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    /// Log progress and raise the default log level to info
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Case selection shared by `run` and `list`.
#[derive(Debug, clap::Args)]
struct Selection {
    #[arg(long, help = "Harness config file (JSON, or YAML by .yaml/.yml extension)")]
    config: Option<PathBuf>,
    #[arg(long = "permission", help = "Only run these permission types (repeatable)")]
    permissions: Vec<PermissionType>,
    #[arg(long = "scenario", help = "Only run these response scenarios (repeatable)")]
    scenarios: Vec<ResponseScenario>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the scenario matrix against a target executable
    Run {
        #[arg(long, help = "Absolute path to the target executable")]
        exe: PathBuf,
        #[command(flatten)]
        selection: Selection,
        #[arg(long, help = "Per-case capture deadline in milliseconds")]
        timeout_ms: Option<u64>,
        #[arg(long, help = "Poll interval of the capture loop in milliseconds")]
        poll_ms: Option<u64>,
        #[arg(long, help = "Skip the preauthorized warm-up run")]
        no_warm_up: bool,
        #[arg(long, help = "Stop after the first case that does not pass")]
        fail_fast: bool,
        #[arg(long, help = "Write per-case captures and the report to this directory")]
        artifacts: Option<PathBuf>,
        #[arg(long, help = "Overwrite existing artifacts directory")]
        overwrite: bool,
        #[arg(long, help = "Print the matrix report as JSON on stdout")]
        json: bool,
    },
    /// Print the selected cases without running anything
    List {
        #[command(flatten)]
        selection: Selection,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum, help = "Shell to generate completions for")]
        shell: Shell,
    },
}

/// Resolve the color flag against `NO_COLOR` and stderr capabilities.
fn use_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            // Respect NO_COLOR environment variable
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    }
}

/// Configure miette's graphical reporting based on color mode
fn configure_diagnostics(color: bool) {
    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(color)
                .unicode(color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set
}

/// Log to stderr, filtered by `PERMPROBE_LOG` (default `warn`, `info` with --verbose).
fn init_tracing(verbose: bool, color: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(color)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let color = use_color(cli.color);
    configure_diagnostics(color);
    init_tracing(cli.verbose, color);
    match cli.command {
        Commands::Run {
            exe,
            selection,
            timeout_ms,
            poll_ms,
            no_warm_up,
            fail_fast,
            artifacts,
            overwrite,
            json,
        } => {
            let overrides = RunOverrides {
                timeout_ms,
                poll_ms,
                no_warm_up,
                fail_fast,
            };
            let artifacts = artifacts.map(|dir| ArtifactsWriterConfig { dir, overwrite });
            cmd_run(&exe, &selection, &overrides, artifacts, json, cli.verbose, color)
        }
        Commands::List { selection, json } => cmd_list(&selection, json),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

struct RunOverrides {
    timeout_ms: Option<u64>,
    poll_ms: Option<u64>,
    no_warm_up: bool,
    fail_fast: bool,
}

/// Handle the run command.
fn cmd_run(
    exe: &std::path::Path,
    selection: &Selection,
    overrides: &RunOverrides,
    artifacts: Option<ArtifactsWriterConfig>,
    json: bool,
    verbose: bool,
    color: bool,
) -> Result<()> {
    if !exe.is_absolute() {
        return emit_error(json, &RunnerError::cli_invalid_arg("--exe must be an absolute path"));
    }
    let mut config = match resolve_config(selection) {
        Ok(config) => config,
        Err(err) => return emit_error(json, &err),
    };
    if let Some(timeout_ms) = overrides.timeout_ms {
        config.capture.timeout_ms = timeout_ms;
    }
    if let Some(poll_ms) = overrides.poll_ms {
        config.capture.poll_interval_ms = poll_ms;
    }
    if overrides.no_warm_up {
        config.warm_up = false;
    }
    if overrides.fail_fast {
        config.fail_fast = true;
    }

    let matrix = match Matrix::new(exe.to_string_lossy(), config) {
        Ok(matrix) => matrix,
        Err(err) => return emit_error(json, &err),
    };
    tracing::debug!(
        cases = matrix.cases().len(),
        warm_up = matrix.config().warm_up,
        fail_fast = matrix.config().fail_fast,
        "resolved harness config"
    );
    let options = MatrixOptions {
        artifacts,
        progress: Some(Box::new(progress::CaseLines::new(json, color, verbose))),
    };
    match matrix.run(options) {
        Ok(report) => emit_report(json, &report),
        Err(err) => emit_error(json, &err),
    }
}

/// Handle the list command.
fn cmd_list(selection: &Selection, json: bool) -> Result<()> {
    let config = match resolve_config(selection) {
        Ok(config) => config,
        Err(err) => return emit_error(json, &err),
    };
    let cases = permprobe::model::build_matrix(&config.permissions, &config.scenarios);
    if json {
        let listing: Vec<serde_json::Value> = cases
            .iter()
            .map(|case| {
                serde_json::json!({
                    "name": case.name,
                    "args": case.args(&config.entry, &config.selector_prefix),
                    "input": String::from_utf8_lossy(&case.input()),
                    "expect": case.expect,
                })
            })
            .collect();
        let payload = serde_json::to_string_pretty(&listing).into_diagnostic()?;
        println!("{payload}");
        return Ok(());
    }
    for case in &cases {
        let args = case.args(&config.entry, &config.selector_prefix).join(" ");
        let input = String::from_utf8_lossy(&case.input()).escape_debug().to_string();
        let expect = &case.expect;
        println!(
            "{}  [{args}]  input=\"{input}\"  exit={} prompt={} first_check_failed={} denied={}",
            case.name, expect.exit_code, expect.prompt, expect.first_check_failed, expect.denied
        );
    }
    println!("{} cases", cases.len());
    Ok(())
}

/// Handle the completions command.
fn cmd_completions(shell: Shell) {
    generate(shell, &mut Cli::command(), "permprobe", &mut io::stdout());
}

// =============================================================================
// Helpers
// =============================================================================

/// Load the config file (or defaults) and apply the selection flags.
fn resolve_config(selection: &Selection) -> Result<HarnessConfig, RunnerError> {
    let mut config = match &selection.config {
        Some(path) => load_config_file(path)?,
        None => HarnessConfig::default(),
    };
    if !selection.permissions.is_empty() {
        config.permissions = dedup(&selection.permissions);
    }
    if !selection.scenarios.is_empty() {
        config.scenarios = dedup(&selection.scenarios);
    }
    Ok(config)
}

/// Keep the first occurrence of each value, in order.
fn dedup<T: PartialEq + Copy>(values: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(value) {
            out.push(*value);
        }
    }
    out
}

fn emit_report(json: bool, report: &MatrixReport) -> Result<()> {
    if json {
        let payload = serde_json::to_string(report).into_diagnostic()?;
        println!("{payload}");
    } else {
        println!();
        println!(
            "{} passed; {} failed; {} timed out; {} errored; {} skipped",
            report.passed, report.failed, report.timed_out, report.errored, report.skipped
        );
    }
    if report.success() {
        return Ok(());
    }
    std::process::exit(exit_code_for_report(report));
}

/// Exit status for a run with at least one non-passing case.
fn exit_code_for_report(report: &MatrixReport) -> i32 {
    report
        .cases
        .iter()
        .find_map(|case| case.error.as_ref())
        .and_then(|error| ErrorCode::parse(&error.code))
        .map_or(1, ErrorCode::exit_code)
}

fn emit_error(json: bool, err: &RunnerError) -> Result<()> {
    if json {
        let payload = serde_json::to_string(&err.to_error_info()).into_diagnostic()?;
        println!("{payload}");
    } else {
        eprintln!("error: {err}");
        if err.code == ErrorCode::Pty {
            eprintln!(
                "warning: PTY support appears unavailable; this is common in minimal containers"
            );
        }
    }
    std::process::exit(err.exit_code());
}
