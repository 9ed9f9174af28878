//! Trial outcome records and machine bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::TrialFailure;
use crate::space::TrialConfig;

/// Unique campaign identifier.
pub type CampaignId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrialStatus {
    Succeeded,
    Failed,
    TimedOut,
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::TimedOut => f.write_str("timed-out"),
        }
    }
}

/// Outcome of one dispatched trial. The metric is present iff the trial
/// succeeded; build through [`TrialResult::succeeded`] or
/// [`TrialResult::failed`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    /// Position of the config in enumeration order (0-indexed).
    pub trial_number: usize,
    pub config: TrialConfig,
    pub machine: String,
    pub status: TrialStatus,
    pub metric: Option<f64>,
    /// Full structured report emitted by the workload, when one was parsed.
    pub report: Option<serde_json::Value>,
    pub failure: Option<TrialFailure>,
    pub elapsed: Duration,
    /// Raw combined output of the remote command.
    pub output: String,
    pub finished_at: DateTime<Utc>,
}

impl TrialResult {
    pub fn succeeded(
        trial_number: usize,
        config: TrialConfig,
        machine: impl Into<String>,
        metric: f64,
        report: serde_json::Value,
        elapsed: Duration,
        output: String,
    ) -> Self {
        Self {
            trial_id: Uuid::new_v4(),
            trial_number,
            config,
            machine: machine.into(),
            status: TrialStatus::Succeeded,
            metric: Some(metric),
            report: Some(report),
            failure: None,
            elapsed,
            output,
            finished_at: Utc::now(),
        }
    }

    /// A trial that produced no metric. `TimedOut` failures get the
    /// timed-out status, everything else is failed.
    pub fn failed(
        trial_number: usize,
        config: TrialConfig,
        machine: impl Into<String>,
        failure: TrialFailure,
        elapsed: Duration,
        output: String,
    ) -> Self {
        let status = match failure {
            TrialFailure::TimedOut { .. } => TrialStatus::TimedOut,
            _ => TrialStatus::Failed,
        };
        Self {
            trial_id: Uuid::new_v4(),
            trial_number,
            config,
            machine: machine.into(),
            status,
            metric: None,
            report: None,
            failure: Some(failure),
            elapsed,
            output,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TrialStatus::Succeeded
    }
}

impl fmt::Display for TrialResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trial #{} on {} [{}]: {}",
            self.trial_number, self.machine, self.config, self.status
        )?;
        if let Some(metric) = self.metric {
            write!(f, ", metric={metric}")?;
        }
        if let Some(failure) = &self.failure {
            write!(f, " ({failure})")?;
        }
        write!(f, " in {:.1}s", self.elapsed.as_secs_f64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Idle,
    Busy,
    Unreachable,
}

/// A remote host in the pool and its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Machine {
    pub host: String,
    pub state: MachineState,
    pub trials_run: usize,
}

impl Machine {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            state: MachineState::Idle,
            trials_run: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == MachineState::Idle
    }

    pub fn is_usable(&self) -> bool {
        self.state != MachineState::Unreachable
    }
}
