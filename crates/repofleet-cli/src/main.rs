//! Repofleet - fleet-wide batch source mutation CLI
//!
//! Reads a TOML run configuration and a repository list, then drives the
//! per-repository mutation pipeline: clone, branch, replace, commit, push,
//! pull request. Individual repository failures are recorded in the outcome
//! ledger and never stop the run; only pre-loop configuration or
//! authentication problems exit non-zero.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use repofleet_core::{AuthContext, FleetOrchestrator, RunConfig};

#[derive(Parser)]
#[command(name = "repofleet")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Apply text replacements across a fleet of repositories", long_about = None)]
struct Cli {
    /// Path to the run configuration file
    #[arg(short, long, default_value = "./fleet.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// API/git token; overrides the token in the config file
    #[arg(long, env = "REPOFLEET_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("REPOFLEET_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!(config = %cli.config.display(), "loading configuration");
    let mut config = RunConfig::parse_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(token) = cli.token {
        config.auth.token = Some(token);
    }
    config.validate().context("validating configuration")?;

    let repos = config.load_repo_list().context("reading repo list")?;
    info!(
        repos = repos.len(),
        branch = %config.branch_name,
        base_url = %config.base_url,
        rules = config.replacements.len(),
        create_pr = config.pr.create,
        "configuration loaded"
    );

    let auth = AuthContext::acquire(&config.auth, &config.base_url, &config.work_dir)
        .context("acquiring credentials")?;

    let ledger_path = config.ledger_path.clone();
    let orchestrator =
        FleetOrchestrator::new(config, auth).context("building orchestrator")?;
    let report = orchestrator.run(&repos).await;

    report
        .ledger
        .write_to(&ledger_path)
        .with_context(|| format!("writing ledger to {}", ledger_path.display()))?;

    let summary = report.ledger.summary();
    let duration = report.finished_at - report.started_at;
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        duration_secs = duration.num_seconds(),
        ledger = %ledger_path.display(),
        "fleet run complete"
    );
    if summary.failed > 0 {
        warn!(
            failed = summary.failed,
            "some repositories failed; see the ledger for details"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    // Per-repository failures live in the ledger and still exit 0; only
    // fatal pre-loop errors reach this branch.
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = format!("{e:#}"), "fatal");
            ExitCode::FAILURE
        }
    }
}
