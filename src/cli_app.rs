//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use stagecheck::core::config::Config;
use stagecheck::core::errors::HarnessError;
use stagecheck::harness::orchestrator::{RunObserver, RunOptions, TestHarnessOrchestrator};
use stagecheck::harness::report::{SuiteOutcome, SuiteReport, TestcaseVerdict};
use stagecheck::logger::jsonl::{JsonlConfig, JsonlWriter};
use stagecheck::runtime::executor::{ClusterCredentials, ContainerExecutor};
use stagecheck::runtime::prerequisites::ToolchainPreflight;
use stagecheck::runtime::provision::{DockerProvisioner, ImageRef};
use stagecheck::suite::fixtures::{Testcase, TestcaseSelection};
use stagecheck::suite::location::TestSuiteLocation;

/// Contract tests for containerized pipeline-stage images.
#[derive(Debug, Parser)]
#[command(
    name = "stagecheck",
    author,
    version,
    about = "Run fixture-driven contract tests against pipeline-stage images",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Stream build and container output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (failures only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Build a stage image and run its testcases.
    Run(RunArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Suite location: LIFECYCLE/ACTION/PIPELINE-NAME/CONTAINER-NAME.
    #[arg(value_name = "LOCATION")]
    location: String,
    /// Comma-separated testcase names to run (default: all).
    #[arg(short, long, value_name = "NAMES")]
    testcases: Option<String>,
    /// Command to run in the container instead of its entrypoint.
    #[arg(short, long, value_name = "COMMAND")]
    command: Option<String>,
    /// kind cluster to load the image into; also mounts the kubeconfig.
    #[arg(short, long, value_name = "NAME")]
    kind_cluster: Option<String>,
    /// Per-testcase container deadline in seconds (0 disables).
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,
    /// Also write the suite report as pretty JSON to this path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
}

#[derive(Debug, Clone, Args, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// The suite ran and at least one testcase failed.
    #[error("{0}")]
    Failed(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Failed(_) => 4,
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(err: HarnessError) -> Self {
        if err.is_usage() {
            Self::User(err.to_string())
        } else if matches!(err, HarnessError::Serialization { .. }) {
            Self::Internal(err.to_string())
        } else {
            Self::Runtime(err.to_string())
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run(args) => run_suite(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// `--kind-cluster ""` means no cluster, same as omitting the flag.
fn requested_cluster(args: &RunArgs) -> Option<String> {
    args.kind_cluster
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn run_suite(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(secs) = args.timeout {
        config.runtime.timeout_secs = secs;
    }

    let location: TestSuiteLocation = args.location.parse()?;
    let options = RunOptions {
        selection: TestcaseSelection::parse(args.testcases.as_deref())?,
        cluster: requested_cluster(args),
    };

    let stream = cli.verbose && mode == OutputMode::Human;
    let preflight = ToolchainPreflight::new(&config.runtime);
    let provisioner = DockerProvisioner::new(
        config.runtime.container_binary.clone(),
        config.runtime.kind_binary.clone(),
        stream,
    );
    let credentials = options.cluster.as_ref().map(|_| ClusterCredentials {
        host_path: config.runtime.kubeconfig.clone(),
        container_path: config.runtime.container_kubeconfig.display().to_string(),
    });
    let executor = ContainerExecutor::new(config.runtime.container_binary.clone())
        .with_timeout(config.runtime.timeout())
        .with_credentials(credentials)
        .with_command(args.command.clone())
        .with_streaming(stream);

    let mut orchestrator = TestHarnessOrchestrator::new(&preflight, &provisioner, &executor, &config);
    if let Some(path) = config.paths.activity_log() {
        orchestrator = orchestrator.with_activity_log(JsonlWriter::open(JsonlConfig::at(path)));
    }

    let mut console = ConsoleObserver {
        mode,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };
    if mode == OutputMode::Human && !cli.quiet {
        println!("{} {}", "Testing".bold(), location);
    }
    let report = orchestrator.run(&location, &options, &mut console)?;

    if let Some(path) = &args.report {
        report.write_to(path)?;
    }

    match mode {
        OutputMode::Human => print_summary(&report, cli.quiet),
        OutputMode::Json => {
            let mut payload = report.to_json()?;
            if let Some(map) = payload.as_object_mut() {
                map.insert("command".into(), Value::from("run"));
            }
            write_json_line(&payload)?;
        }
    }

    match report.outcome() {
        SuiteOutcome::Passed => Ok(()),
        SuiteOutcome::Empty => {
            eprintln!(
                "{} no testcases found under {}",
                "warning:".yellow().bold(),
                location.fixture_root(&config.paths.workflows_root).display()
            );
            Ok(())
        }
        SuiteOutcome::Failed => Err(CliError::Failed(format!(
            "{} of {} testcase(s) failed",
            report.failed_count(),
            report.verdicts.len()
        ))),
    }
}

/// Prints one line per testcase as it completes.
struct ConsoleObserver {
    mode: OutputMode,
    quiet: bool,
    verbose: bool,
}

impl RunObserver for ConsoleObserver {
    fn image_ready(&mut self, image: &ImageRef) {
        if self.mode == OutputMode::Human && self.verbose {
            println!("  image {image}");
        }
    }

    fn testcase_started(&mut self, testcase: &Testcase) {
        if self.mode == OutputMode::Human && self.verbose {
            println!("  running {}", testcase.name);
        }
    }

    fn testcase_finished(&mut self, verdict: &TestcaseVerdict) {
        if self.mode != OutputMode::Human {
            return;
        }
        if verdict.passed {
            if !self.quiet {
                println!(
                    "✅ {} {}",
                    verdict.testcase.green(),
                    format!("({} ms)", verdict.duration_ms).dimmed()
                );
            }
            return;
        }
        let stage = verdict.stage.map(|s| s.to_string()).unwrap_or_default();
        println!("❌ {} [{stage}]", verdict.testcase.red().bold());
        if let Some(cause) = &verdict.cause {
            println!("   {cause}");
        }
        if let Some(ws) = &verdict.workspace {
            println!("   workspace: {}", ws.display());
        }
    }
}

fn print_summary(report: &SuiteReport, quiet: bool) {
    if quiet && report.failed_count() == 0 {
        return;
    }
    let passed = format!("{} passed", report.passed_count());
    let failed = format!("{} failed", report.failed_count());
    let failed = if report.failed_count() > 0 {
        failed.red().bold()
    } else {
        failed.normal()
    };
    println!("\n{}, {failed} ({})", passed.green(), report.image);
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => println!("{}", config.to_toml()?),
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");
    let git_sha = option_env!("GIT_SHA").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("stagecheck {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
                println!("git_sha: {git_sha}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "stagecheck",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                    "git_sha": git_sha,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("STAGECHECK_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
