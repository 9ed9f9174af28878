//! Best-of selection over completed trials.

use gs_types::{CampaignError, ObjectiveDirection, TrialResult, TrialStatus};
use serde::Serialize;

/// Picks the best successful trial for an objective direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluator {
    direction: ObjectiveDirection,
}

impl Evaluator {
    pub fn new(direction: ObjectiveDirection) -> Self {
        Self { direction }
    }

    pub fn direction(&self) -> ObjectiveDirection {
        self.direction
    }

    /// Return the succeeded trial with the best metric. Equal metrics go to
    /// the trial enumerated first, whatever order the results arrive in.
    pub fn best<'a>(&self, results: &'a [TrialResult]) -> Result<&'a TrialResult, CampaignError> {
        let mut best: Option<(&TrialResult, f64)> = None;

        for result in results {
            let metric = match (result.status, result.metric) {
                (TrialStatus::Succeeded, Some(m)) if !m.is_nan() => m,
                _ => continue,
            };

            let replace = match best {
                None => true,
                Some((incumbent, incumbent_metric)) => {
                    self.direction.improves(metric, incumbent_metric)
                        || (metric == incumbent_metric
                            && result.trial_number < incumbent.trial_number)
                }
            };
            if replace {
                best = Some((result, metric));
            }
        }

        best.map(|(result, _)| result)
            .ok_or(CampaignError::NoValidTrials {
                attempted: results.len(),
            })
    }

    /// Outcome counts plus the best trial, if any succeeded.
    pub fn summarize(&self, results: &[TrialResult]) -> CampaignSummary {
        let count = |status: TrialStatus| results.iter().filter(|r| r.status == status).count();

        CampaignSummary {
            direction: self.direction,
            total: results.len(),
            succeeded: count(TrialStatus::Succeeded),
            failed: count(TrialStatus::Failed),
            timed_out: count(TrialStatus::TimedOut),
            best: self.best(results).ok().cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignSummary {
    pub direction: ObjectiveDirection,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub best: Option<TrialResult>,
}
