//! GridSweep controller: runs a grid-search campaign over remote machines
//! and reports every trial plus the best one.

mod cli;
mod credentials;
mod logging;
mod render;

use anyhow::Context;
use clap::Parser;
use gs_optimizer::{Evaluator, GridScheduler, GridSearch};
use gs_remote::{RemoteTrialExecutor, SshConfig, SshSession};
use gs_types::{CampaignError, ConfigError, GsError, HyperparameterSpace, SpaceError};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::credentials::TerminalPrompt;

const EXIT_FAILURE: u8 = 1;
const EXIT_INVALID_INPUT: u8 = 2;
const EXIT_POOL_EXHAUSTED: u8 = 3;
const EXIT_NO_VALID_TRIALS: u8 = 4;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_level());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let grid = load_grid(&cli.space)?;

    let credentials = credentials::acquire(
        &cli.username,
        cli.password.clone(),
        cli.no_password,
        &TerminalPrompt,
    )?;
    let experiment = Arc::new(cli.experiment_builder(credentials).build()?);

    info!(
        trials = grid.total(),
        machines = experiment.machines().len(),
        workload = %experiment.workload().display(),
        metric = experiment.metric_key(),
        direction = %experiment.direction(),
        "starting campaign"
    );
    if experiment.trial_timeout().is_none() {
        warn!("no trial timeout set; a hung workload will stall the campaign");
    }

    let session = SshSession::new(SshConfig::from_credentials(
        experiment.credentials(),
        cli.connect_timeout(),
    ));
    let executor = RemoteTrialExecutor::new(session, Arc::clone(&experiment));
    let outcome = GridScheduler::new(executor, experiment.machines().to_vec())
        .run(grid)
        .await?;

    let evaluator = Evaluator::new(experiment.direction());
    let summary = evaluator.summarize(&outcome.results);
    render::write_report(&mut std::io::stdout().lock(), cli.format, &outcome, &summary)?;

    if summary.best.is_none() {
        return Err(CampaignError::NoValidTrials {
            attempted: summary.total,
        }
        .into());
    }
    Ok(())
}

fn load_grid(path: &Path) -> anyhow::Result<GridSearch> {
    let space = HyperparameterSpace::from_json_file(path)
        .with_context(|| format!("loading hyperparameter space from {}", path.display()))?;
    Ok(GridSearch::new(space)?)
}

fn exit_code(err: &anyhow::Error) -> u8 {
    let campaign = err.downcast_ref::<CampaignError>().or_else(|| match err.downcast_ref::<GsError>() {
        Some(GsError::Campaign(e)) => Some(e),
        _ => None,
    });
    match campaign {
        Some(CampaignError::PoolExhausted { .. }) => return EXIT_POOL_EXHAUSTED,
        Some(CampaignError::NoValidTrials { .. }) => return EXIT_NO_VALID_TRIALS,
        None => {}
    }

    if err.downcast_ref::<GsError>().is_some()
        || err.downcast_ref::<SpaceError>().is_some()
        || err.downcast_ref::<ConfigError>().is_some()
    {
        EXIT_INVALID_INPUT
    } else {
        EXIT_FAILURE
    }
}
