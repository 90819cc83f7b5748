//! # CLI
//!
//! ```text
//! conformance run <suite.json> [--config <file>] [--skip <pattern>]...
//!                 [--format text|json] [--report <file>] [--serial]
//!                 [--specs <selection>] [--json-logs] [--log-level <level>]
//! ```
//!
//! Exit codes: `0` every case passed or was skipped, `1` at least one case
//! failed, `2` the command line, configuration or suite file is unusable.

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::error::Error;
use crate::storage::{load_config, load_suite, save_report};
use crate::testing::{CaseStatus, RunMode, RunReport, Runner, Suite};

pub const EXIT_PASSED: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "conformance")]
#[command(version, about = "HTTP conformance testing", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a JSON suite file
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Suite file
    pub suite: PathBuf,

    /// JSON config file
    #[arg(short, long, env = "CONFORMANCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip cases whose full name matches; repeatable
    #[arg(long = "skip", value_name = "PATTERN")]
    pub skips: Vec<String>,

    /// Report format on stdout
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Run one case at a time
    #[arg(long)]
    pub serial: bool,

    /// Spec selection such as `path-gateway,-subdomain-gateway`
    #[arg(long, value_name = "SELECTION")]
    pub specs: Option<String>,
}

impl Cli {
    pub fn into_config(self) -> CliConfig {
        let Commands::Run(run) = self.command;
        CliConfig {
            suite_path: run.suite,
            config_path: run.config,
            skips: run.skips,
            output_format: run.format,
            report_path: run.report,
            mode: if run.serial { RunMode::Serial } else { RunMode::Parallel },
            specs: run.specs,
            json_logs: self.json_logs,
            log_level: self.log_level,
        }
    }
}

/// What a `run` needs, once the command line is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub suite_path: PathBuf,
    pub config_path: Option<PathBuf>,
    pub skips: Vec<String>,
    pub output_format: OutputFormat,
    pub report_path: Option<PathBuf>,
    pub mode: RunMode,
    pub specs: Option<String>,
    pub json_logs: bool,
    pub log_level: String,
}

/// Output format for CLI reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Resolve the run configuration: file, then environment, then the flags.
pub fn resolve_config<F>(cli: &CliConfig, lookup: F) -> Result<Config, Error>
where
    F: Fn(&str) -> Option<String>,
{
    let base = match &cli.config_path {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let mut config = base.with_env(lookup)?;
    config.skips.extend(cli.skips.iter().cloned());
    if let Some(specs) = &cli.specs {
        config.specs = specs.clone();
    }
    config.validate()?;
    Ok(config)
}

pub fn load(cli: &CliConfig) -> Result<Suite, Error> {
    Ok(load_suite(&cli.suite_path)?.into_suite()?)
}

pub async fn execute(cli: &CliConfig, config: &Config, suite: &Suite) -> Result<RunReport, Error> {
    let runner = Runner::new(config)?.mode(cli.mode);
    let report = runner.run_suite(suite).await;
    if let Some(path) = &cli.report_path {
        save_report(path, &report)?;
    }
    Ok(report)
}

pub fn render(report: &RunReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .unwrap_or_else(|err| format!("{{\"error\": \"failed to serialize report: {err}\"}}")),
        OutputFormat::Text => render_text(report),
    }
}

fn render_text(report: &RunReport) -> String {
    let mut out = String::new();

    for result in &report.results {
        match &result.status {
            CaseStatus::Passed => {
                let _ = writeln!(out, "PASS {} ({}ms)", result.name, result.duration_ms);
            }
            CaseStatus::Skipped(reason) => {
                let _ = writeln!(out, "SKIP {}: {reason}", result.name);
            }
            CaseStatus::Failed => {
                let _ = writeln!(out, "FAIL {} ({}ms)", result.name, result.duration_ms);
                for assertion in result.assertions.iter().filter(|a| !a.passed()) {
                    let _ = writeln!(out, "  {}: {}", assertion.name, assertion.outcome.message());
                }
            }
        }
    }

    for result in report.results.iter().filter(|r| r.failed()) {
        for failure in &result.reports {
            let _ = write!(out, "{failure}");
        }
    }

    let _ = writeln!(
        out,
        "\n{} cases: {} passed, {} failed, {} skipped ({}ms)",
        report.total, report.passed, report.failed, report.skipped, report.duration_ms
    );
    out
}

pub fn exit_code(report: &RunReport) -> i32 {
    if report.success() {
        EXIT_PASSED
    } else {
        EXIT_FAILED
    }
}
