//! Campaign report on stdout.

use gs_optimizer::{CampaignOutcome, CampaignSummary, SchedulerEvent};
use gs_types::{CampaignId, TrialResult};
use serde::Serialize;
use std::io::Write;

use crate::cli::OutputFormat;

#[derive(Serialize)]
struct CampaignReport<'a> {
    campaign_id: CampaignId,
    started_at: String,
    finished_at: String,
    summary: &'a CampaignSummary,
    dropped_machines: Vec<DroppedMachine<'a>>,
    results: &'a [TrialResult],
    events: &'a [SchedulerEvent],
}

#[derive(Debug, PartialEq, Serialize)]
struct DroppedMachine<'a> {
    host: &'a str,
    reason: &'a str,
}

fn dropped_machines(outcome: &CampaignOutcome) -> Vec<DroppedMachine<'_>> {
    outcome
        .events
        .iter()
        .filter_map(|event| match event {
            SchedulerEvent::MachineDropped { machine, reason } => Some(DroppedMachine {
                host: machine,
                reason,
            }),
            _ => None,
        })
        .collect()
}

pub fn write_report<W: Write>(
    out: &mut W,
    format: OutputFormat,
    outcome: &CampaignOutcome,
    summary: &CampaignSummary,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => write_text(out, outcome, summary),
        OutputFormat::Json => write_json(out, outcome, summary),
    }
}

fn write_text<W: Write>(
    out: &mut W,
    outcome: &CampaignOutcome,
    summary: &CampaignSummary,
) -> anyhow::Result<()> {
    writeln!(out, "All Trial Results:")?;
    for result in &outcome.results {
        writeln!(out, "  {result}")?;
    }
    writeln!(
        out,
        "{} trials: {} succeeded, {} failed, {} timed out (objective: {})",
        summary.total, summary.succeeded, summary.failed, summary.timed_out, summary.direction
    )?;

    let dropped = dropped_machines(outcome);
    if !dropped.is_empty() {
        writeln!(out, "Dropped machines:")?;
        for machine in &dropped {
            writeln!(out, "  {}: {}", machine.host, machine.reason)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "Best Trial Result:")?;
    match &summary.best {
        Some(best) => writeln!(out, "  {best}")?,
        None => writeln!(out, "  none, no trial produced a metric")?,
    }
    Ok(())
}

fn write_json<W: Write>(
    out: &mut W,
    outcome: &CampaignOutcome,
    summary: &CampaignSummary,
) -> anyhow::Result<()> {
    let report = CampaignReport {
        campaign_id: outcome.campaign_id,
        started_at: outcome.started_at.to_rfc3339(),
        finished_at: outcome.finished_at.to_rfc3339(),
        summary,
        dropped_machines: dropped_machines(outcome),
        results: &outcome.results,
        events: &outcome.events,
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gs_optimizer::Evaluator;
    use gs_types::{Machine, MachineState, ObjectiveDirection, ParameterValue, TrialConfig, TrialFailure};
    use std::time::Duration;
    use uuid::Uuid;

    fn config(lr: f64) -> TrialConfig {
        TrialConfig::from_pairs([("lr", ParameterValue::Float(lr))])
    }

    fn outcome() -> CampaignOutcome {
        let mut gpu2 = Machine::new("gpu2");
        gpu2.state = MachineState::Unreachable;
        CampaignOutcome {
            campaign_id: Uuid::nil(),
            results: vec![
                TrialResult::succeeded(
                    0,
                    config(0.1),
                    "gpu1",
                    0.91,
                    serde_json::json!({ "accuracy": 0.91 }),
                    Duration::from_secs(12),
                    String::new(),
                ),
                TrialResult::failed(
                    1,
                    config(0.5),
                    "gpu1",
                    TrialFailure::RemoteExecution { exit_code: Some(1) },
                    Duration::from_secs(2),
                    "Traceback".into(),
                ),
            ],
            events: vec![SchedulerEvent::MachineDropped {
                machine: "gpu2".into(),
                reason: "Connection refused".into(),
            }],
            machines: vec![Machine::new("gpu1"), gpu2],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    fn render(format: OutputFormat, direction: ObjectiveDirection, outcome: &CampaignOutcome) -> String {
        let summary = Evaluator::new(direction).summarize(&outcome.results);
        let mut buf = Vec::new();
        write_report(&mut buf, format, outcome, &summary).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_text_lists_every_trial_then_the_best() {
        let text = render(OutputFormat::Text, ObjectiveDirection::Maximize, &outcome());

        let all = text.find("All Trial Results:").unwrap();
        let best = text.find("Best Trial Result:").unwrap();
        assert!(all < best);
        assert!(text.contains("trial #0 on gpu1 [lr=0.1]: succeeded, metric=0.91"));
        assert!(text.contains("trial #1 on gpu1 [lr=0.5]: failed"));
        assert!(text.contains("2 trials: 1 succeeded, 1 failed, 0 timed out (objective: maximize)"));
        assert!(text.contains("  gpu2: Connection refused"));
        assert!(text[best..].contains("trial #0"));
    }

    #[test]
    fn test_text_without_a_best_trial() {
        let mut outcome = outcome();
        outcome.results.remove(0);
        outcome.events.clear();
        let text = render(OutputFormat::Text, ObjectiveDirection::Minimize, &outcome);

        assert!(text.contains("none, no trial produced a metric"));
        assert!(!text.contains("Dropped machines"));
    }

    #[test]
    fn test_json_report_is_structured() {
        let json = render(OutputFormat::Json, ObjectiveDirection::Maximize, &outcome());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["summary"]["total"], 2);
        assert_eq!(value["summary"]["best"]["trial_number"], 0);
        assert_eq!(value["results"].as_array().unwrap().len(), 2);
        assert_eq!(value["results"][0]["config"]["lr"], 0.1);
        assert_eq!(value["dropped_machines"][0]["host"], "gpu2");
        assert_eq!(value["events"][0]["event"], "machine_dropped");
    }
}
