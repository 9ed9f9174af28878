//! Grid search scheduler: dispatches enumerated trials across a bounded pool
//! of machines and collects one result per trial.
//!
//! The scheduler loop is the only code that touches the machine table and the
//! result collection. Trials run as spawned tasks; their completions are
//! funnelled back through a single [`JoinSet`], so two trials finishing at
//! the same time never race on a machine's state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gs_types::{
    CampaignError, CampaignId, Machine, MachineState, MachineUnreachable, TrialConfig,
    TrialFailure, TrialResult, TrialStatus,
};
use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// One trial bound to one machine.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialAssignment {
    /// Position of the config in enumeration order.
    pub trial_number: usize,
    pub config: TrialConfig,
    pub machine: String,
}

/// Runs a single trial on a single machine.
///
/// Anything that goes wrong with the trial itself (nonzero exit, timeout,
/// unparsable report) must come back as a failed [`TrialResult`]. `Err` is
/// reserved for a machine that could not be reached at all; the trial is
/// then considered not to have run.
#[async_trait]
pub trait TrialExecutor: Send + Sync + 'static {
    async fn execute(&self, assignment: TrialAssignment) -> Result<TrialResult, MachineUnreachable>;
}

/// Events recorded by the scheduler for callers and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    TrialDispatched {
        trial_number: usize,
        machine: String,
    },
    TrialCompleted {
        trial_number: usize,
        machine: String,
        status: TrialStatus,
    },
    MachineDropped {
        machine: String,
        reason: String,
    },
    TrialRequeued {
        trial_number: usize,
    },
}

/// Everything a finished campaign produced.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignOutcome {
    pub campaign_id: CampaignId,
    /// One result per enumerated config, sorted by trial number.
    pub results: Vec<TrialResult>,
    pub events: Vec<SchedulerEvent>,
    pub machines: Vec<Machine>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CampaignOutcome {
    /// Hosts removed from the pool during the campaign.
    pub fn dropped_machines(&self) -> impl Iterator<Item = &str> {
        self.machines
            .iter()
            .filter(|m| m.state == MachineState::Unreachable)
            .map(|m| m.host.as_str())
    }
}

struct Completion {
    machine: usize,
    trial_number: usize,
    config: TrialConfig,
    elapsed: Duration,
    outcome: Result<Result<TrialResult, MachineUnreachable>, JoinError>,
}

/// Bounded-concurrency grid scheduler. One in-flight trial per machine.
pub struct GridScheduler<E: TrialExecutor> {
    campaign_id: CampaignId,
    executor: Arc<E>,
    machines: Vec<Machine>,
    events: Vec<SchedulerEvent>,
}

impl<E: TrialExecutor> GridScheduler<E> {
    pub fn new<I, S>(executor: E, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_shared_executor(Arc::new(executor), hosts)
    }

    pub fn with_shared_executor<I, S>(executor: Arc<E>, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            campaign_id: Uuid::new_v4(),
            executor,
            machines: hosts.into_iter().map(Machine::new).collect(),
            events: Vec::new(),
        }
    }

    pub fn campaign_id(&self) -> CampaignId {
        self.campaign_id
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    /// Run every config exactly once and wait for all of them.
    ///
    /// Fails with [`CampaignError::PoolExhausted`] if every machine became
    /// unreachable while configs were still queued.
    pub async fn run<I>(self, configs: I) -> Result<CampaignOutcome, CampaignError>
    where
        I: IntoIterator<Item = TrialConfig>,
    {
        let span = info_span!("campaign", id = %self.campaign_id);
        self.run_campaign(configs.into_iter().enumerate().collect())
            .instrument(span)
            .await
    }

    async fn run_campaign(
        mut self,
        mut queue: VecDeque<(usize, TrialConfig)>,
    ) -> Result<CampaignOutcome, CampaignError> {
        let started_at = Utc::now();
        let total = queue.len();
        let mut results = Vec::with_capacity(total);
        let mut in_flight: JoinSet<Completion> = JoinSet::new();

        info!(trials = total, machines = self.machines.len(), "campaign started");

        loop {
            self.dispatch_idle(&mut queue, &mut in_flight);

            if in_flight.is_empty() {
                if queue.is_empty() {
                    break;
                }
                error!(pending = queue.len(), "no usable machines left");
                return Err(CampaignError::PoolExhausted {
                    pending: queue.len(),
                });
            }

            let completion = match in_flight.join_next().await {
                Some(Ok(completion)) => completion,
                // Supervisor tasks only await their trial; a failure here is a bug.
                Some(Err(err)) => std::panic::resume_unwind(err.into_panic()),
                None => continue,
            };

            if let Some(result) = self.complete(completion, &mut queue) {
                results.push(result);
            }
        }

        results.sort_by_key(|r| r.trial_number);
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            trials = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "campaign finished"
        );

        Ok(CampaignOutcome {
            campaign_id: self.campaign_id,
            results,
            events: self.events,
            machines: self.machines,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn dispatch_idle(
        &mut self,
        queue: &mut VecDeque<(usize, TrialConfig)>,
        in_flight: &mut JoinSet<Completion>,
    ) {
        for index in 0..self.machines.len() {
            if !self.machines[index].is_idle() {
                continue;
            }
            let Some((trial_number, config)) = queue.pop_front() else {
                break;
            };

            let machine = &mut self.machines[index];
            machine.state = MachineState::Busy;
            let host = machine.host.clone();

            debug!(trial = trial_number, host = %host, config = %config, "dispatching trial");
            self.events.push(SchedulerEvent::TrialDispatched {
                trial_number,
                machine: host.clone(),
            });

            let executor = Arc::clone(&self.executor);
            let assignment = TrialAssignment {
                trial_number,
                config: config.clone(),
                machine: host.clone(),
            };
            let trial_span = info_span!("trial", number = trial_number, host = %host);

            in_flight.spawn(
                async move {
                    let started = Instant::now();
                    let outcome = tokio::spawn(
                        async move { executor.execute(assignment).await }.in_current_span(),
                    )
                    .await;
                    Completion {
                        machine: index,
                        trial_number,
                        config,
                        elapsed: started.elapsed(),
                        outcome,
                    }
                }
                .instrument(trial_span),
            );
        }
    }

    /// Apply one completion to the machine table. Returns the trial's result,
    /// or `None` if the trial went back on the queue.
    fn complete(
        &mut self,
        completion: Completion,
        queue: &mut VecDeque<(usize, TrialConfig)>,
    ) -> Option<TrialResult> {
        let Completion {
            machine,
            trial_number,
            config,
            elapsed,
            outcome,
        } = completion;
        let host = self.machines[machine].host.clone();

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(unreachable)) => {
                self.machines[machine].state = MachineState::Unreachable;
                let remaining = self.machines.iter().filter(|m| m.is_usable()).count();
                warn!(
                    host = %host,
                    error = %unreachable.message,
                    remaining,
                    "machine unreachable, dropping it from the pool"
                );
                self.events.push(SchedulerEvent::MachineDropped {
                    machine: host,
                    reason: unreachable.message,
                });
                self.events.push(SchedulerEvent::TrialRequeued { trial_number });
                // The trial never started; put it back where it was.
                queue.push_front((trial_number, config));
                return None;
            }
            Err(err) => {
                let message = panic_message(err);
                error!(trial = trial_number, host = %host, %message, "trial executor panicked");
                TrialResult::failed(
                    trial_number,
                    config,
                    host.clone(),
                    TrialFailure::ExecutorPanicked { message },
                    elapsed,
                    String::new(),
                )
            }
        };

        let slot = &mut self.machines[machine];
        slot.state = MachineState::Idle;
        slot.trials_run += 1;

        match result.metric {
            Some(metric) => info!(trial = trial_number, host = %host, metric, "trial succeeded"),
            None => warn!(
                trial = trial_number,
                host = %host,
                status = %result.status,
                failure = ?result.failure,
                "trial did not succeed"
            ),
        }
        self.events.push(SchedulerEvent::TrialCompleted {
            trial_number,
            machine: host,
            status: result.status,
        });

        Some(result)
    }
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "trial task was cancelled".to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
