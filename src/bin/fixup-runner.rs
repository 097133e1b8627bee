//! # Fixup Runner
//!
//! Command-line entry point: loads configuration and (optionally) the object
//! catalog, then runs the remediation tasks found in a task directory.

use anyhow::Context;
use clap::Parser;
use schema_fixup::config::{ConfigManager, ExecutionMode, LogFormat, OrderingMode};
use schema_fixup::dependency::{Classifier, DependencyGraph, SupportState, TargetSnapshot};
use schema_fixup::logging::{init_structured_logging, log_classification};
use schema_fixup::models::ObjectCatalog;
use schema_fixup::orchestration::{FixupOrchestrator, ProcessSqlClient, RunOptions};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fixup-runner")]
#[command(about = "Execute schema remediation tasks in dependency order")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Task directory (one subdirectory per object type)
    #[arg(short, long)]
    task_dir: PathBuf,

    /// TOML configuration file (default: FIXUP_CONFIG_PATH)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Object catalog JSON used for screening, ordering, and grants
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Retry missing-object and timeout failures in further rounds
    #[arg(long)]
    iterative: bool,

    /// Maximum rounds in iterative mode
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Alphabetical order, one task at a time
    #[arg(long, conflicts_with = "view_chain")]
    flat: bool,

    /// Only view-family tasks, ordered by the full reference chain
    #[arg(long)]
    view_chain: bool,

    /// Print the planned order without executing
    #[arg(long)]
    dry_run: bool,

    /// Skip tasks whose object already exists on the target
    #[arg(long)]
    idempotent: bool,

    /// Keep successful task files in place
    #[arg(long)]
    no_archive: bool,

    /// Write the run summary as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Worker pool size
    #[arg(long)]
    max_workers: Option<usize>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!(error = %e, "Fixup run aborted");
            eprintln!("error: {e:#}");
            process::exit(2);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = ConfigManager::load_unvalidated(cli.config.as_deref())
        .context("loading configuration")?
        .into_config();

    if cli.iterative {
        config.execution.mode = ExecutionMode::Iterative;
    }
    if let Some(rounds) = cli.max_rounds {
        config.execution.max_rounds = rounds;
    }
    if cli.flat {
        config.execution.ordering = OrderingMode::Flat;
    }
    if cli.idempotent {
        config.execution.idempotent = true;
    }
    if cli.no_archive {
        config.execution.archive_done = false;
    }
    if let Some(workers) = cli.max_workers {
        config.execution.max_workers = workers;
    }
    if cli.json_logs {
        config.logging.format = LogFormat::Json;
    }
    match cli.verbose {
        0 => {}
        1 => config.logging.level = Some("info".to_string()),
        2 => config.logging.level = Some("debug".to_string()),
        _ => config.logging.level = Some("trace".to_string()),
    }
    config.validate().context("validating configuration")?;
    init_structured_logging(&config.logging);

    let client = Arc::new(ProcessSqlClient::new(config.client.clone()));
    let excluded = config.classification.excluded_types.clone();
    let mut orchestrator = FixupOrchestrator::new(config, client);

    if let Some(path) = &cli.catalog {
        let catalog = ObjectCatalog::from_path(path)?;
        let graph = DependencyGraph::from_catalog(&catalog)?;
        let report = Classifier::new(excluded).classify(
            &graph,
            &catalog.blacklist,
            &TargetSnapshot::from_catalog(&catalog),
        );
        for (key, result) in report.iter() {
            if matches!(result.state, SupportState::Unsupported | SupportState::Blocked) {
                log_classification(
                    &key.to_string(),
                    &result.state.to_string(),
                    &result.reason_code,
                    result.root_cause.as_ref().map(ToString::to_string).as_deref(),
                );
            }
        }
        info!(
            objects = report.len(),
            missing = report.count(SupportState::Missing),
            unsupported = report.count(SupportState::Unsupported),
            blocked = report.count(SupportState::Blocked),
            conflicts = report.conflicts().len(),
            "Catalog classified"
        );
        orchestrator = orchestrator.with_catalog(graph, report);
    }

    let options = RunOptions {
        dry_run: cli.dry_run,
        view_chain: cli.view_chain,
    };
    let summary = orchestrator.run(&cli.task_dir, options).await?;

    print!("{}", summary.render());
    if let Some(path) = &cli.report {
        summary
            .write_report(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }
    Ok(summary.exit_code())
}
