//! Remote trial executor: one trial, one machine, one [`TrialResult`].

use async_trait::async_trait;
use gs_optimizer::{TrialAssignment, TrialExecutor};
use gs_types::{ExperimentConfig, MachineUnreachable, TrialFailure, TrialResult};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::invocation::WorkloadInvocation;
use crate::report::parse_report;
use crate::session::{OutputBuffer, RemoteSession};

/// Runs trials through a [`RemoteSession`]. Has no retry logic; failures of
/// the workload are reported as failed results.
pub struct RemoteTrialExecutor<S: RemoteSession> {
    session: S,
    experiment: Arc<ExperimentConfig>,
}

impl<S: RemoteSession> RemoteTrialExecutor<S> {
    pub fn new(session: S, experiment: Arc<ExperimentConfig>) -> Self {
        Self {
            session,
            experiment,
        }
    }

    pub fn experiment(&self) -> &ExperimentConfig {
        &self.experiment
    }
}

#[async_trait]
impl<S: RemoteSession + 'static> TrialExecutor for RemoteTrialExecutor<S> {
    async fn execute(&self, assignment: TrialAssignment) -> Result<TrialResult, MachineUnreachable> {
        let TrialAssignment {
            trial_number,
            config,
            machine,
        } = assignment;

        let command = WorkloadInvocation::build(&config, &self.experiment).to_command_line();
        debug!(%command, "launching workload");

        let progress = OutputBuffer::new();
        let started = Instant::now();
        let run = self.session.run(&machine, &command, &progress);
        let output = match self.experiment.trial_timeout() {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(output) => output?,
                Err(_) => {
                    warn!(timeout = ?limit, "trial timed out, session terminated");
                    return Ok(TrialResult::failed(
                        trial_number,
                        config,
                        machine,
                        TrialFailure::TimedOut { after: limit },
                        started.elapsed(),
                        progress.snapshot(),
                    ));
                }
            },
            None => run.await?,
        };
        let elapsed = started.elapsed();

        if !output.success() {
            return Ok(TrialResult::failed(
                trial_number,
                config,
                machine,
                TrialFailure::RemoteExecution {
                    exit_code: output.exit_code,
                },
                elapsed,
                output.output,
            ));
        }

        Ok(
            match parse_report(&output.output, self.experiment.metric_key()) {
                Ok((metric, report)) => TrialResult::succeeded(
                    trial_number,
                    config,
                    machine,
                    metric,
                    report,
                    elapsed,
                    output.output,
                ),
                Err(failure) => {
                    TrialResult::failed(trial_number, config, machine, failure, elapsed, output.output)
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CommandOutput;
    use gs_optimizer::{Evaluator, GridScheduler, GridSearch};
    use gs_types::{
        Credentials, HyperparameterSpace, ObjectiveDirection, ParameterValue, TrialConfig,
        TrialStatus,
    };
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Fake remote side: answers each command with a canned reply keyed on
    /// the `--lr` value it carries.
    #[derive(Default)]
    struct StubSession {
        replies: HashMap<String, CommandOutput>,
        delay: Duration,
        unreachable: Vec<String>,
        commands: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl RemoteSession for StubSession {
        async fn run(
            &self,
            host: &str,
            command: &str,
            progress: &OutputBuffer,
        ) -> Result<CommandOutput, MachineUnreachable> {
            if self.unreachable.iter().any(|h| h == host) {
                return Err(MachineUnreachable::new(host, "No route to host"));
            }
            self.commands
                .lock()
                .push((host.to_string(), command.to_string()));

            let reply = self
                .replies
                .iter()
                .find(|(lr, _)| command.contains(&format!("--lr {lr} ")))
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| CommandOutput::new("unexpected command", Some(2)));
            // Output shows up before the command finishes.
            progress.push_str(&reply.output);
            tokio::time::sleep(self.delay).await;
            Ok(reply)
        }
    }

    fn experiment(direction: ObjectiveDirection, timeout: Option<Duration>) -> Arc<ExperimentConfig> {
        let mut builder = ExperimentConfig::builder("/opt/models/MNIST/train.py", "accuracy")
            .with_machines(["gpu1", "gpu2"])
            .with_credentials(Credentials::new("trainer", None))
            .with_direction(direction);
        if let Some(timeout) = timeout {
            builder = builder.with_trial_timeout(timeout);
        }
        Arc::new(builder.build().unwrap())
    }

    fn assignment(lr: f64) -> TrialAssignment {
        TrialAssignment {
            trial_number: 0,
            config: TrialConfig::from_pairs([
                ("lr", ParameterValue::Float(lr)),
                ("batch_size", ParameterValue::Int(32)),
            ]),
            machine: "gpu1".into(),
        }
    }

    fn ok(json: &str) -> CommandOutput {
        CommandOutput::new(format!("Train Epoch: 1\n{json}\n"), Some(0))
    }

    #[tokio::test]
    async fn test_successful_trial_extracts_metric() {
        let session = StubSession {
            replies: HashMap::from([("0.1".into(), ok(r#"{"accuracy": 0.97, "runtime": 12.0}"#))]),
            ..StubSession::default()
        };
        let executor = RemoteTrialExecutor::new(session, experiment(ObjectiveDirection::Maximize, None));

        let result = executor.execute(assignment(0.1)).await.unwrap();
        assert_eq!(result.status, TrialStatus::Succeeded);
        assert_eq!(result.metric, Some(0.97));
        assert_eq!(result.report.unwrap()["runtime"], 12.0);
        assert!(result.output.contains("Train Epoch"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed_without_parsing() {
        let session = StubSession {
            replies: HashMap::from([(
                "0.1".into(),
                CommandOutput::new("{\"accuracy\": 0.99}\nCUDA out of memory", Some(1)),
            )]),
            ..StubSession::default()
        };
        let executor = RemoteTrialExecutor::new(session, experiment(ObjectiveDirection::Maximize, None));

        let result = executor.execute(assignment(0.1)).await.unwrap();
        assert_eq!(result.status, TrialStatus::Failed);
        assert_eq!(result.metric, None);
        assert_eq!(
            result.failure,
            Some(TrialFailure::RemoteExecution { exit_code: Some(1) })
        );
        assert!(result.output.contains("out of memory"));
    }

    #[tokio::test]
    async fn test_missing_metric_key_is_parse_failure() {
        let session = StubSession {
            replies: HashMap::from([("0.1".into(), ok(r#"{"runtime": 12.0}"#))]),
            ..StubSession::default()
        };
        let executor = RemoteTrialExecutor::new(session, experiment(ObjectiveDirection::Maximize, None));

        let result = executor.execute(assignment(0.1)).await.unwrap();
        assert_eq!(result.status, TrialStatus::Failed);
        assert!(matches!(result.failure, Some(TrialFailure::ResultParse { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_trial_times_out() {
        let session = StubSession {
            replies: HashMap::from([("0.1".into(), ok(r#"{"accuracy": 0.9}"#))]),
            delay: Duration::from_secs(120),
            ..StubSession::default()
        };
        let executor = RemoteTrialExecutor::new(
            session,
            experiment(ObjectiveDirection::Maximize, Some(Duration::from_secs(30))),
        );

        let result = executor.execute(assignment(0.1)).await.unwrap();
        assert_eq!(result.status, TrialStatus::TimedOut);
        assert_eq!(
            result.failure,
            Some(TrialFailure::TimedOut {
                after: Duration::from_secs(30)
            })
        );
        assert!(result.elapsed >= Duration::from_secs(30));
        assert!(result.output.contains("Train Epoch: 1"));
    }

    #[tokio::test]
    async fn test_unreachable_host_propagates() {
        let session = StubSession {
            unreachable: vec!["gpu1".into()],
            ..StubSession::default()
        };
        let executor = RemoteTrialExecutor::new(session, experiment(ObjectiveDirection::Maximize, None));

        let err = executor.execute(assignment(0.1)).await.unwrap_err();
        assert_eq!(err.host, "gpu1");
    }

    fn campaign_session() -> StubSession {
        StubSession {
            replies: HashMap::from([
                ("0.1".into(), ok(r#"{"accuracy": 0.90}"#)),
                ("0.01".into(), ok(r#"{"accuracy": 0.92}"#)),
                ("0.001".into(), ok(r#"{"accuracy": 0.88}"#)),
                ("0.002".into(), ok(r#"{"accuracy": 0.95}"#)),
                ("0.5".into(), ok(r#"{"runtime": 3.0}"#)),
            ]),
            delay: Duration::from_millis(5),
            ..StubSession::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_campaign_end_to_end() {
        let space = HyperparameterSpace::new()
            .add_axis("lr", [0.1, 0.01, 0.001, 0.002, 0.5])
            .add_axis("batch_size", [32]);
        let configs = GridSearch::new(space).unwrap();

        let session = Arc::new(campaign_session());
        let experiment = experiment(ObjectiveDirection::Maximize, Some(Duration::from_secs(60)));
        let executor = RemoteTrialExecutor::new(Arc::clone(&session), Arc::clone(&experiment));
        let outcome = GridScheduler::new(executor, experiment.machines().to_vec())
            .run(configs)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 5);
        let broken = &outcome.results[4];
        assert_eq!(broken.status, TrialStatus::Failed);
        assert!(matches!(broken.failure, Some(TrialFailure::ResultParse { .. })));

        let best = Evaluator::new(ObjectiveDirection::Maximize)
            .best(&outcome.results)
            .unwrap();
        assert_eq!(best.metric, Some(0.95));
        let best = Evaluator::new(ObjectiveDirection::Minimize)
            .best(&outcome.results)
            .unwrap();
        assert_eq!(best.metric, Some(0.88));

        let commands = session.commands.lock();
        assert_eq!(commands.len(), 5);
        assert!(commands.iter().any(|(host, _)| host == "gpu1"));
        assert!(commands.iter().any(|(host, _)| host == "gpu2"));
    }
}
