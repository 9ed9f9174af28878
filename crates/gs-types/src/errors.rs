use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Main error type for the GridSweep system
#[derive(Error, Debug)]
pub enum GsError {
    #[error("Invalid hyperparameter space: {0}")]
    Space(#[from] SpaceError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Campaign failed: {0}")]
    Campaign(#[from] CampaignError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Hyperparameter space errors, raised before anything is dispatched
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("axis '{axis}' has no candidate values")]
    EmptyAxis { axis: String },

    #[error("axis '{axis}' is declared more than once")]
    DuplicateAxis { axis: String },

    #[error("axis '{axis}' has an unsupported candidate {value}: only numbers, strings and booleans are allowed")]
    UnsupportedValue { axis: String, value: String },

    #[error("axis '{axis}' must map to an array of candidate values")]
    NotAnArray { axis: String },

    #[error("grid definition must be a JSON object mapping axis names to candidate arrays")]
    NotAnObject,

    #[error("grid has more combinations than can be enumerated")]
    TooLarge,
}

/// Campaign settings that fail validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unsupported architecture '{value}' (expected one of: {expected})")]
    UnsupportedArchitecture { value: String, expected: String },

    #[error("unsupported parallelism strategy '{value}' (expected one of: {expected})")]
    UnsupportedParallelism { value: String, expected: String },

    #[error("unsupported objective '{value}' (expected max or min)")]
    UnsupportedObjective { value: String },

    #[error("architecture {architecture} cannot be trained with {parallelism} parallelism")]
    UnsupportedCombination {
        architecture: String,
        parallelism: String,
    },

    #[error("epoch count must be positive, got {epochs}")]
    NonPositiveEpochs { epochs: i64 },

    #[error("metric key must not be empty")]
    EmptyMetricKey,

    #[error("workload path must not be empty")]
    EmptyWorkload,

    #[error("username must not be empty")]
    EmptyUsername,

    #[error("machine list must not be empty")]
    NoMachines,

    #[error("machine '{host}' is listed more than once")]
    DuplicateMachine { host: String },

    #[error("trial timeout must be greater than zero")]
    ZeroTimeout,
}

/// A remote session could not be established to `host`.
///
/// Never fatal on its own: the scheduler drops the machine and carries on.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("machine {host} is unreachable: {message}")]
pub struct MachineUnreachable {
    pub host: String,
    pub message: String,
}

impl MachineUnreachable {
    pub fn new(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            message: message.into(),
        }
    }
}

/// Why a dispatched trial did not produce a metric. Recorded on the
/// [`crate::TrialResult`], not propagated.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrialFailure {
    #[error("workload exited with status {}", .exit_code.map_or_else(|| "unknown (terminated by signal)".to_string(), |c| c.to_string()))]
    RemoteExecution { exit_code: Option<i32> },

    #[error("workload did not finish within {after:?}")]
    TimedOut { after: Duration },

    #[error("could not parse workload report: {message}")]
    ResultParse { message: String },

    #[error("trial executor panicked: {message}")]
    ExecutorPanicked { message: String },
}

/// Campaign-level failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CampaignError {
    #[error("no usable machines remain while {pending} trial(s) are still queued")]
    PoolExhausted { pending: usize },

    #[error("none of the {attempted} trial(s) succeeded")]
    NoValidTrials { attempted: usize },
}

/// Result type alias for GridSweep operations
pub type GsResult<T> = Result<T, GsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SpaceError::EmptyAxis {
            axis: "lr".to_string(),
        };
        assert!(error.to_string().contains("lr"));
        assert!(error.to_string().contains("no candidate values"));

        let exhausted = CampaignError::PoolExhausted { pending: 3 };
        assert!(exhausted.to_string().contains('3'));
    }

    #[test]
    fn test_error_conversion() {
        let config_error = ConfigError::NoMachines;
        let gs_error: GsError = config_error.into();

        match gs_error {
            GsError::Config(ConfigError::NoMachines) => (),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_trial_failure_display() {
        let failed = TrialFailure::RemoteExecution { exit_code: Some(1) };
        assert_eq!(failed.to_string(), "workload exited with status 1");

        let killed = TrialFailure::RemoteExecution { exit_code: None };
        assert!(killed.to_string().contains("signal"));

        let timed_out = TrialFailure::TimedOut {
            after: Duration::from_secs(5),
        };
        assert!(timed_out.to_string().contains("5s"));
    }
}
