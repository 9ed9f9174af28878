//! Trailing metrics report parsing.

use gs_types::TrialFailure;
use serde_json::{Map, Value};

/// Find the last line of `output` that is a JSON object and read
/// `metric_key` from it as a number.
///
/// Returns the metric together with the whole report object.
pub fn parse_report(output: &str, metric_key: &str) -> Result<(f64, Value), TrialFailure> {
    let report = output
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{') && line.ends_with('}'))
        .find_map(|line| serde_json::from_str::<Map<String, Value>>(line).ok())
        .ok_or_else(|| TrialFailure::ResultParse {
            message: "no JSON report found in workload output".to_string(),
        })?;

    let metric = match report.get(metric_key) {
        Some(value) => value.as_f64().ok_or_else(|| TrialFailure::ResultParse {
            message: format!("metric '{metric_key}' is not a number: {value}"),
        })?,
        None => {
            return Err(TrialFailure::ResultParse {
                message: format!("report has no '{metric_key}' key"),
            })
        }
    };

    Ok((metric, Value::Object(report)))
}
