//! JSON summary of a finished (or fatally stopped) run.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::result::{CaseTally, TestRunResult};
use crate::session::RunOutcome;

/// Persisted summary, written after the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: bool,
    pub totals: TestRunResult,
    pub cases: Vec<CaseSummary>,
    pub skipped: Vec<String>,
    /// Message of the fatal condition that stopped the run, if any.
    pub fatal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseSummary {
    pub name: String,
    #[serde(flatten)]
    pub tally: CaseTally,
}

impl RunSummary {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            passed: outcome.result.passed(),
            totals: outcome.result.clone(),
            cases: outcome
                .cases
                .iter()
                .map(|case| CaseSummary {
                    name: case.name.clone(),
                    tally: case.tally.clone(),
                })
                .collect(),
            skipped: outcome.skipped.clone(),
            fatal: None,
        }
    }

    /// Summary of a run stopped by a fatal condition.
    pub fn fatal(outcome: &RunOutcome, message: String) -> Self {
        Self {
            passed: false,
            fatal: Some(message),
            ..Self::from_outcome(outcome)
        }
    }
}

pub fn load_summary(path: &Path) -> Result<RunSummary> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read summary {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse summary {}", path.display()))
}

/// Atomically write the summary to disk (temp file + rename).
pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    debug!(path = %path.display(), passed = summary.passed, "writing run summary");
    let mut buf = serde_json::to_string_pretty(summary).context("serialize summary json")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CaseOutcome;

    fn outcome() -> RunOutcome {
        let tally = CaseTally {
            cycles: 3,
            failed: true,
            aborted: false,
            passed_assertions: 4,
            failed_assertions: 1,
        };
        let mut result = TestRunResult::default();
        result.add_case(&tally);
        RunOutcome {
            result,
            cases: vec![CaseOutcome {
                name: "math".to_string(),
                tally,
            }],
            skipped: vec!["slow".to_string()],
        }
    }

    #[test]
    fn summary_round_trips_through_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out").join("summary.json");
        let summary = RunSummary::from_outcome(&outcome());

        write_summary(&path, &summary).expect("write");
        assert_eq!(load_summary(&path).expect("load"), summary);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn case_tally_is_flattened_into_the_case_entry() {
        let summary = RunSummary::from_outcome(&outcome());
        let value = serde_json::to_value(&summary).expect("json");
        assert_eq!(value["passed"], false);
        assert_eq!(value["cases"][0]["name"], "math");
        assert_eq!(value["cases"][0]["cycles"], 3);
        assert_eq!(value["totals"]["failed_cases"], 1);
        assert_eq!(value["skipped"][0], "slow");
    }

    #[test]
    fn fatal_summary_never_passes() {
        let mut outcome = outcome();
        outcome.result = TestRunResult::default();
        outcome.cases.clear();
        let summary = RunSummary::fatal(&outcome, "panicked: x".to_string());
        assert!(!summary.passed);
        assert_eq!(summary.fatal.as_deref(), Some("panicked: x"));
    }
}
