//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result, eyre};
use gazette_core::{
    DiagnosticsReport, Pipeline, PipelineState, ProgressReporter, RunReport, SourceStatus,
};
use gazette_render::TemplateRenderer;
use gazette_shared::{
    AppConfig, FormatTag, NewsletterHeader, PersistConfig, PersistedArtifact, RetrievalOutcome,
    SourceId, init_config, load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Gazette: parallel research digest generator.
#[derive(Parser)]
#[command(
    name = "gazette",
    version,
    about = "Query research sources in parallel and publish one deduplicated newsletter.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.gazette/gazette.toml).
    #[arg(long, env = "GAZETTE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Introspection output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum GraphFormat {
    Text,
    Mermaid,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run every source, assemble the newsletter, and write the artifacts.
    Run {
        /// Output directory (overrides `output.root`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Formats to write, comma-separated (overrides `output.formats`).
        #[arg(short, long, value_delimiter = ',')]
        format: Vec<FormatTag>,
    },

    /// Probe every configured source without writing anything.
    Check {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the pipeline state machine without running it.
    Graph {
        #[arg(long, default_value = "text")]
        format: GraphFormat,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default config file to ~/.gazette/gazette.toml.
    Init,
    /// Print the effective configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "gazette=info",
        1 => "gazette=debug",
        _ => "gazette=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run { out, format } => cmd_run(config_path, out, format).await,
        Command::Check { json } => cmd_check(config_path, json).await,
        Command::Graph { format } => cmd_graph(&format),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

fn load(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    config.validate()?;
    Ok(config)
}

fn build_pipeline(config: &AppConfig, out: Option<PathBuf>, formats: Vec<FormatTag>) -> Result<Pipeline> {
    let sources = gazette_sources::bind_sources(config)?;

    let mut persist = PersistConfig::from(config);
    if let Some(out) = out {
        persist.output_root = out;
    }
    if !formats.is_empty() {
        persist.formats = formats;
    }

    let mut renderer = TemplateRenderer::new();
    if let Some(tagline) = &config.header.tagline {
        renderer = renderer.with_tagline(tagline.clone());
    }

    Ok(Pipeline::new(
        sources,
        Arc::new(renderer),
        persist,
        NewsletterHeader::from(&config.header),
    )?)
}

/// Cancellation token tripped by Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, out: Option<PathBuf>, formats: Vec<FormatTag>) -> Result<()> {
    let config = load(config_path)?;
    let pipeline = build_pipeline(&config, out, formats)?;

    info!(sources = pipeline.sources().len(), "generating newsletter");

    let cancel = cancel_on_ctrl_c();
    let reporter = CliProgress::new();
    let report = pipeline.run(&cancel, &reporter).await;

    print_run_summary(&report);

    match report.error() {
        Some(err) => Err(Report::new(err).wrap_err(format!("run {} failed", report.run_id))),
        None => Ok(()),
    }
}

fn print_run_summary(report: &RunReport) {
    println!();
    match report.final_state {
        PipelineState::Done if report.is_partial() => println!("  Newsletter generated (partial)"),
        PipelineState::Done => println!("  Newsletter generated successfully!"),
        _ => println!("  Newsletter generation failed"),
    }
    println!("  Run:     {}", report.run_id);
    for source in &report.sources {
        match &source.status {
            SourceStatus::Ok { items } => println!(
                "  Source:  {:<10} {items} items ({:.1}s)",
                source.source.as_str(),
                source.elapsed.as_secs_f64()
            ),
            SourceStatus::Failed { kind, detail } => println!(
                "  Source:  {:<10} FAILED {kind}: {detail}",
                source.source.as_str()
            ),
        }
    }
    if let Some(coverage) = &report.coverage {
        println!("  Items:   {}", report.total_items);
        if coverage.duplicates_dropped > 0 {
            println!("  Dupes:   {} dropped", coverage.duplicates_dropped);
        }
    }
    for artifact in &report.artifacts {
        println!("  Wrote:   {} ({} bytes)", artifact.path.display(), artifact.size_bytes());
    }
    for failure in &report.format_failures {
        println!("  Lost:    {} ({} stage): {}", failure.format, failure.stage, failure.error);
    }
    if let Some(failure) = report.failure {
        println!("  Reason:  {failure}");
    }
    println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

async fn cmd_check(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = load(config_path)?;
    let pipeline = build_pipeline(&config, None, Vec::new())?;

    let cancel = cancel_on_ctrl_c();
    let reporter = CliProgress::new();
    reporter.spinner.set_message("Probing sources");
    let report = pipeline
        .diagnose(config.diagnostics.deadline(), &cancel, &reporter)
        .await;
    reporter.spinner.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_check_summary(&report);
    }

    if report.healthy() {
        Ok(())
    } else if report.cancelled {
        Err(eyre!("diagnostics cancelled"))
    } else {
        Err(eyre!(
            "{} of {} sources failed",
            report.failed_count(),
            report.entries.len()
        ))
    }
}

fn print_check_summary(report: &DiagnosticsReport) {
    println!();
    for entry in &report.entries {
        let summary = &entry.summary;
        match &summary.status {
            SourceStatus::Ok { items } => println!(
                "  ✓ {:<10} {:<28} ok, {items} items in {:.1}s",
                summary.source.as_str(),
                entry.label,
                summary.elapsed.as_secs_f64()
            ),
            SourceStatus::Failed { kind, detail } => println!(
                "  ✗ {:<10} {:<28} {kind}: {detail}",
                summary.source.as_str(),
                entry.label
            ),
        }
    }
    println!();
}

fn cmd_graph(format: &GraphFormat) -> Result<()> {
    let shape = Pipeline::describe();
    match format {
        GraphFormat::Text => print!("{shape}"),
        GraphFormat::Mermaid => print!("{}", shape.to_mermaid()),
        GraphFormat::Json => println!("{}", serde_json::to_string_pretty(&shape)?),
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn state(&self, state: PipelineState) {
        let message = match state {
            PipelineState::Idle => "Starting",
            PipelineState::Joining => "Querying sources",
            PipelineState::Assembling => "Assembling newsletter",
            PipelineState::Persisting => "Writing artifacts",
            PipelineState::Done => "Done",
            PipelineState::Failed => "Failed",
        };
        self.spinner.set_message(message);
    }

    fn branch_settled(&self, source: &SourceId, outcome: &RetrievalOutcome, settled: usize, total: usize) {
        let line = match outcome {
            RetrievalOutcome::Success(items) => {
                format!("  [{settled}/{total}] {source}: {} items", items.len())
            }
            RetrievalOutcome::Failure { kind, .. } => {
                format!("  [{settled}/{total}] {source}: failed ({kind})")
            }
        };
        self.spinner.println(line);
    }

    fn artifact_written(&self, artifact: &PersistedArtifact) {
        self.spinner
            .set_message(format!("Wrote {}", artifact.path.display()));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
