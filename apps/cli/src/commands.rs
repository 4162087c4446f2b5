//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use siteadvisor_core::{Pipeline, ProgressReporter};
use siteadvisor_shared::{
    AppConfig, ProgressEntry, ResearchReport, init_config, load_config, load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteAdvisor: research how ranking pages structure a topic.
#[derive(Parser)]
#[command(
    name = "siteadvisor",
    version,
    about = "Turn a seed topic into a structural content analysis and recommendation.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.siteadvisor/siteadvisor.toml.
    #[arg(long, global = true, env = "SITEADVISOR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full research pipeline for a topic.
    Run(RunArgs),

    /// Only plan candidate terms for a topic and print the plan.
    Plan(PlanArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of `siteadvisor run`.
#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    /// Seed topic, e.g. "ball bearing".
    pub topic: String,

    /// Site profile as inline JSON, or `@path` to a JSON file.
    #[arg(long)]
    pub profile: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Candidate terms carried past planning.
    #[arg(long)]
    pub max_terms: Option<usize>,

    /// Sources kept per term.
    #[arg(long)]
    pub max_sources: Option<usize>,

    /// Documents analyzed per term.
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Concurrent lookups/fetches within a stage.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Wall-clock budget for the run, in seconds.
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Allow fetching localhost and private-network hosts.
    #[arg(long)]
    pub allow_private_hosts: bool,
}

impl RunArgs {
    /// Apply flag overrides on top of the loaded config.
    fn apply(&self, config: &mut AppConfig) {
        let limits = &mut config.limits;
        if let Some(n) = self.max_terms {
            limits.max_terms = n;
        }
        if let Some(n) = self.max_sources {
            limits.max_sources_per_term = n;
        }
        if let Some(n) = self.max_pages {
            limits.max_pages_per_term = n;
        }
        if let Some(n) = self.concurrency {
            limits.concurrency = n;
        }
        if self.deadline.is_some() {
            limits.run_deadline_secs = self.deadline;
        }
        if self.allow_private_hosts {
            config.fetch.allow_private_hosts = true;
        }
    }
}

/// Arguments of `siteadvisor plan`.
#[derive(Args, Debug)]
pub(crate) struct PlanArgs {
    /// Seed topic, e.g. "ball bearing".
    pub topic: String,

    /// Site profile as inline JSON, or `@path` to a JSON file.
    #[arg(long)]
    pub profile: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Where and how JSON results are written.
#[derive(Args, Debug)]
pub(crate) struct OutputArgs {
    /// Write the result to this file instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Emit compact JSON instead of pretty-printed.
    #[arg(long)]
    pub compact: bool,
}

impl OutputArgs {
    /// Serialize `value` to stdout or to `--out`.
    fn emit(&self, value: &impl Serialize) -> Result<()> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };

        match &self.out {
            Some(path) => {
                std::fs::write(path, json)
                    .wrap_err_with(|| format!("cannot write output to {}", path.display()))?;
                eprintln!("Written to: {}", path.display());
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "siteadvisor=info",
        1 => "siteadvisor=debug",
        _ => "siteadvisor=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout carries only the report.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(cli.config.as_deref(), &args).await,
        Command::Plan(args) => cmd_plan(cli.config.as_deref(), &args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Parse `--profile`: inline JSON or `@file`.
fn parse_profile(raw: &str) -> Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(file) => std::fs::read_to_string(file)
            .wrap_err_with(|| format!("cannot read profile file '{file}'"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).wrap_err("profile is not valid JSON")
}

fn non_empty_topic(raw: &str) -> Result<&str> {
    let topic = raw.trim();
    if topic.is_empty() {
        return Err(eyre!("topic must not be empty"));
    }
    Ok(topic)
}

async fn cmd_run(config_path: Option<&Path>, args: &RunArgs) -> Result<()> {
    let topic = non_empty_topic(&args.topic)?;

    let mut config = resolve_config(config_path)?;
    args.apply(&mut config);

    let profile = args.profile.as_deref().map(parse_profile).transpose()?;
    let pipeline = Pipeline::from_config(&config)?;

    info!(topic, limits = ?pipeline.limits(), "running research pipeline");

    let reporter = CliProgress::new();
    let report = pipeline.run(topic, profile.as_ref(), &reporter).await;

    args.output.emit(&report)
}

async fn cmd_plan(config_path: Option<&Path>, args: &PlanArgs) -> Result<()> {
    let topic = non_empty_topic(&args.topic)?;
    let config = resolve_config(config_path)?;
    let profile = args.profile.as_deref().map(parse_profile).transpose()?;
    let pipeline = Pipeline::from_config(&config)?;

    info!(topic, "planning candidate terms");
    let plan = pipeline.plan_only(topic, profile.as_ref()).await;

    args.output.emit(&plan)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn entry(&self, entry: &ProgressEntry) {
        self.spinner
            .set_message(format!("[{}] {}", entry.stage, entry.message));
    }

    fn document_fetched(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetching [{current}/{total}] {url}"));
    }

    fn done(&self, report: &ResearchReport) {
        self.spinner.finish_and_clear();
        eprintln!(
            "Run {} finished in {:.1}s: {} terms analyzed, {} term strategies",
            report.run_id,
            report.elapsed_ms as f64 / 1000.0,
            report.analysis.len(),
            report.strategy.term_strategies.len(),
        );
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
