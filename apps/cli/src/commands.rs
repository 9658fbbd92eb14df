//! CLI definition, tracing setup, and the composition root.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use quarry_core::{CommandBridge, CycleReport, Orchestrator, Services};
use quarry_shared::load_config_from;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Quarry: collect, unify and enrich software-project data.
#[derive(Parser)]
#[command(
    name = "quarry",
    version,
    about = "Orchestrate collection, identity unification and enrichment over a project catalog.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Path to the TOML settings file.
    #[arg(short, long, env = "QUARRY_CONFIG")]
    pub config: PathBuf,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "quarry=info",
        1 => "quarry=debug",
        _ => "quarry=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Load the settings, wire the bridge collaborator, and run one cycle.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config_from(&cli.config)
        .wrap_err_with(|| format!("failed to load settings from {}", cli.config.display()))?;

    info!(
        config = %cli.config.display(),
        projects = config.catalog.projects().len(),
        bridge = %config.bridge.command,
        "settings loaded"
    );

    let bridge = CommandBridge::new(&config.bridge);
    let orchestrator = Orchestrator::new(Services::from_shared(Arc::new(bridge)));

    let report = orchestrator
        .run(Arc::new(config))
        .await
        .wrap_err("orchestration cycle aborted")?;

    summarize(&report);
    Ok(())
}

fn summarize(report: &CycleReport) {
    for phase in &report.phases {
        let outcome = phase.outcome();
        info!(
            phase = %phase.phase,
            lanes = phase.lanes.len(),
            succeeded = outcome.succeeded,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "phase summary"
        );
    }
    info!(
        cycle = %report.cycle_id,
        started_at = %report.started_at,
        duration_ms = report.duration.as_millis() as u64,
        "cycle complete"
    );
}
