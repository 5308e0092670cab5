use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("BUSTAP_BUILD_COMMIT"),
    ", ",
    env!("BUSTAP_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "bustap")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Replay scripted bus traffic through the capture engine and report the record stream.",
    long_about = None,
    after_help = "Examples:\n  bustap script replay capture.json -o report.json\n  bustap script replay capture.json --stdout --pretty\n  bustap script replay capture.json -o report.json --strict"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operations on replay scripts (offline-first).
    Script {
        #[command(subcommand)]
        command: ScriptCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ScriptCommands {
    /// Replay a capture script and generate a versioned JSON report.
    #[command(
        after_help = "Examples:\n  bustap script replay capture.json -o report.json\n  bustap script replay capture.json --stdout\n  bustap script replay capture.json -o report.json --mem-depth 8192"
    )]
    Replay {
        /// Path to a replay script (.json)
        input: PathBuf,

        /// Output report path (JSON)
        #[arg(short = 'o', long, required_unless_present = "stdout")]
        report: Option<PathBuf>,

        /// Write JSON report to stdout
        #[arg(long, conflicts_with = "report")]
        stdout: bool,

        /// Pretty-print JSON output
        #[arg(long, conflicts_with = "compact")]
        pretty: bool,

        /// Compact JSON output (default)
        #[arg(long)]
        compact: bool,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,

        /// Exit with a non-zero code if the replay overran
        #[arg(long)]
        strict: bool,

        /// List dropped records after the replay
        #[arg(long)]
        list_drops: bool,

        /// Override the script's output ring buffer depth (bytes, power of two)
        #[arg(long)]
        mem_depth: Option<usize>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Script { command } => match command {
            ScriptCommands::Replay {
                input,
                report,
                stdout,
                pretty,
                compact,
                quiet,
                strict,
                list_drops,
                mem_depth,
            } => cmd_script_replay(
                input, report, stdout, pretty, compact, quiet, strict, list_drops, mem_depth,
            ),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(err.to_string(), None)
    }
}

fn cmd_script_replay(
    input: PathBuf,
    report: Option<PathBuf>,
    stdout: bool,
    pretty: bool,
    compact: bool,
    quiet: bool,
    strict: bool,
    list_drops: bool,
    mem_depth: Option<usize>,
) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&input)?;
    validate_input_file(&resolved_input)?;
    let input_abs = fs::canonicalize(&resolved_input)
        .with_context(|| format!("Failed to resolve input path: {}", resolved_input.display()))?;
    let report = if stdout {
        None
    } else {
        Some(report.ok_or_else(|| {
            CliError::new(
                "missing output path",
                Some("use -o/--report or --stdout".to_string()),
            )
        })?)
    };

    if let Some(report_path) = report.as_ref() {
        ensure_report_differs_from_input(report_path, &input_abs)?;
    }

    let script_json = fs::read_to_string(&resolved_input)
        .with_context(|| format!("Failed to read script: {}", resolved_input.display()))?;
    let mut script: bustap_core::ReplayScript = serde_json::from_str(&script_json)
        .map_err(|err| {
            CliError::new(
                format!("invalid replay script '{}': {}", resolved_input.display(), err),
                Some("expected JSON with a \"sessions\" array of hex byte strings".to_string()),
            )
        })?;
    if mem_depth.is_some() {
        script.mem_depth = mem_depth;
    }

    let rep = bustap_core::run_replay(&script).map_err(|err| {
        CliError::new(
            format!("replay failed: {err}"),
            match err {
                bustap_core::ReplayError::Config(_) => {
                    Some("mem_depth must be a power of two (e.g. 4096, 8192)".to_string())
                }
                bustap_core::ReplayError::InvalidHex { .. } => {
                    Some("session bytes must be an even-length hex string".to_string())
                }
                _ => None,
            },
        )
    })?;
    let json = serialize_report(&rep, pretty, compact)?;

    if stdout {
        print!("{}", json);
        if list_drops && !quiet {
            print_drops(&rep);
        }
        if strict && rep.stats.overrun {
            return Err(strict_overrun_error());
        }
        return Ok(());
    }

    let report = report.expect("report required when not using stdout");
    if let Some(parent) = report.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }

    fs::write(&report, json)
        .with_context(|| format!("Failed to write report: {}", report.display()))?;

    if list_drops && !quiet {
        print_drops(&rep);
    }
    if !quiet {
        eprintln!("OK: report written -> {}", report.display());
    }
    if strict && rep.stats.overrun {
        return Err(strict_overrun_error());
    }
    Ok(())
}

fn strict_overrun_error() -> CliError {
    CliError::new(
        "overrun detected during replay",
        Some("the consumer fell behind; raise --mem-depth or drain more often".to_string()),
    )
}

fn ensure_report_differs_from_input(
    report_path: &PathBuf,
    input_abs: &PathBuf,
) -> Result<(), CliError> {
    let report_abs = report_path
        .parent()
        .map(|parent| {
            if parent.as_os_str().is_empty() {
                fs::canonicalize(".")
            } else {
                fs::canonicalize(parent)
            }
        })
        .transpose()
        .with_context(|| format!("Failed to resolve output path: {}", report_path.display()))?;
    if let Some(report_dir) = report_abs {
        let report_target = report_dir.join(
            report_path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid report path"))?,
        );
        if &report_target == input_abs {
            return Err(CliError::new(
                format!(
                    "report path must differ from input: {}",
                    report_path.display()
                ),
                Some("choose a different output path".to_string()),
            ));
        }
    }
    Ok(())
}

fn serialize_report(
    rep: &bustap_core::CaptureReport,
    pretty: bool,
    compact: bool,
) -> Result<String, CliError> {
    if pretty && compact {
        return Err(CliError::new(
            "cannot use --pretty and --compact together",
            Some("choose one output format".to_string()),
        ));
    }
    if pretty {
        serde_json::to_string_pretty(rep)
            .context("JSON serialization failed")
            .map_err(Into::into)
    } else {
        serde_json::to_string(rep)
            .context("JSON serialization failed")
            .map_err(Into::into)
    }
}

fn print_drops(rep: &bustap_core::CaptureReport) {
    eprintln!("Dropped records:");
    for (index, record) in rep.records.iter().enumerate() {
        if record.kind == "overrun" {
            eprintln!("  record {} replaced by overrun marker", index);
        }
    }
}

fn validate_input_file(input: &PathBuf) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .json replay script".to_string()),
        ));
    }
    if !input.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("use a .json replay script".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "json" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .json replay script".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &PathBuf) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.clone());
    }

    let mut matches = Vec::new();
    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    if matches.is_empty() {
        return Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern; expected a .json script".to_string()),
        ));
    }
    if matches.len() > 1 {
        return Err(CliError::new(
            format!(
                "multiple files match pattern '{}' ({} matches)",
                pattern,
                matches.len()
            ),
            Some("pass a single script, or run once per file".to_string()),
        ));
    }

    Ok(matches.remove(0))
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
