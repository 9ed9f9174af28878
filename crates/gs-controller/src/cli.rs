//! Command-line flags.

use clap::builder::{PossibleValue, PossibleValuesParser, TypedValueParser};
use clap::{Parser, ValueEnum};
use gs_types::{Architecture, Credentials, ExperimentConfig, ExperimentConfigBuilder, ObjectiveDirection, Parallelism};
use std::path::PathBuf;
use std::time::Duration;

/// Grid-search hyperparameter optimization across a pool of remote machines
#[derive(Parser, Debug)]
#[command(name = "gridsweep", version, about, long_about = None)]
pub struct Cli {
    /// Username for SSH to remote machines
    #[arg(long)]
    pub username: String,

    /// Password for SSH to remote machines (prompted for when omitted)
    #[arg(long, env = "GRIDSWEEP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Use key-based SSH authentication and never ask for a password
    #[arg(long)]
    pub no_password: bool,

    /// All remote machines to utilize
    #[arg(long, required = true, num_args = 1..)]
    pub machines: Vec<String>,

    /// Virtualenv directory on the remote machines
    #[arg(long)]
    pub venv: Option<PathBuf>,

    /// Training program to run for each trial
    #[arg(long, alias = "dnn")]
    pub workload: PathBuf,

    /// JSON file defining the hyperparameter space
    #[arg(long, alias = "dnn-hyperparameter-space")]
    pub space: PathBuf,

    /// Path to dataset (if applicable)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Model architecture
    #[arg(long, default_value = "resnet", value_parser = architecture_parser())]
    pub arch: Architecture,

    /// Training parallelism strategy
    #[arg(long, default_value = "dp", value_parser = parallelism_parser())]
    pub parallelism: Parallelism,

    /// Number of total epochs to run per trial
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub epochs: i64,

    /// Key of the metric to extract from the workload's JSON report
    #[arg(long, alias = "dnn-metric-key")]
    pub metric_key: String,

    /// Whether to maximize or minimize the metric
    #[arg(long, alias = "dnn-metric-objective", value_parser = objective_parser())]
    pub objective: ObjectiveDirection,

    /// Per-trial timeout in seconds (waits indefinitely when omitted)
    #[arg(long, value_name = "SECS")]
    pub trial_timeout: Option<u64>,

    /// SSH connection timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Output format for the campaign report
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Print all logging statements
    #[arg(long)]
    pub verbose: bool,

    /// Print all debugging statements
    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

fn architecture_parser() -> impl TypedValueParser<Value = Architecture> {
    PossibleValuesParser::new(Architecture::ALL.map(|a| PossibleValue::new(a.as_str())))
        .try_map(|s| s.parse::<Architecture>())
}

fn parallelism_parser() -> impl TypedValueParser<Value = Parallelism> {
    PossibleValuesParser::new(Parallelism::ALL.map(|p| {
        let value = PossibleValue::new(p.as_str());
        if p.long_name() == p.as_str() {
            value
        } else {
            value.alias(p.long_name())
        }
    }))
    .try_map(|s| s.parse::<Parallelism>())
}

fn objective_parser() -> impl TypedValueParser<Value = ObjectiveDirection> {
    PossibleValuesParser::new([
        PossibleValue::new("max").alias("maximize"),
        PossibleValue::new("min").alias("minimize"),
    ])
    .try_map(|s| s.parse::<ObjectiveDirection>())
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Campaign settings from the flags; validation happens in `build()`.
    pub fn experiment_builder(&self, credentials: Credentials) -> ExperimentConfigBuilder {
        let mut builder = ExperimentConfig::builder(&self.workload, &self.metric_key)
            .with_architecture(self.arch)
            .with_parallelism(self.parallelism)
            .with_epochs(self.epochs)
            .with_direction(self.objective)
            .with_machines(self.machines.iter().cloned())
            .with_credentials(credentials);
        if let Some(venv) = &self.venv {
            builder = builder.with_venv(venv);
        }
        if let Some(data) = &self.data {
            builder = builder.with_dataset(data);
        }
        if let Some(secs) = self.trial_timeout {
            builder = builder.with_trial_timeout(Duration::from_secs(secs));
        }
        builder
    }
}
