//! Test-only helpers: a reporter that records every event as a short line.

use std::sync::{Arc, Mutex};

use crate::core::result::{CaseTally, TestCaseResult, TestRunResult};
use crate::core::types::{SectionInfo, TestCaseInfo};
use crate::report::TestReport;

/// Records reporter events as strings such as `"section_start A"`.
///
/// Clones share one event log, so a test can hand a clone to a session and
/// keep its own handle for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingReport {
    events: Arc<Mutex<Vec<String>>>,
    properties: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap_or_else(|err| err.into_inner()).clone()
    }

    /// Events whose first word is `kind`.
    pub fn events_of(&self, kind: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|event| event.split_whitespace().next() == Some(kind))
            .collect()
    }

    /// Names of sections entered, in order, across all cycles.
    pub fn sections_started(&self) -> Vec<String> {
        self.events_of("section_start")
            .into_iter()
            .filter_map(|event| event.split_once(' ').map(|(_, name)| name.to_string()))
            .collect()
    }

    pub fn properties(&self) -> Vec<(String, String)> {
        self.properties
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    fn push(&self, event: String) {
        self.events
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(event);
    }
}

impl TestReport for RecordingReport {
    fn set_property(&mut self, key: &str, value: &str) {
        self.properties
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push((key.to_string(), value.to_string()));
    }

    fn report_test_cases(&mut self, infos: &[TestCaseInfo]) {
        let names: Vec<&str> = infos.iter().map(|info| info.name.as_str()).collect();
        self.push(format!("cases {}", names.join(",")));
    }

    fn report_case_skip(&mut self, info: &TestCaseInfo) {
        self.push(format!("case_skip {}", info.name));
    }

    fn report_case_start(&mut self, info: &TestCaseInfo) {
        self.push(format!("case_start {}", info.name));
    }

    fn report_cycle_start(&mut self, info: &TestCaseInfo, cycle: u32) {
        self.push(format!("cycle_start {} {cycle}", info.name));
    }

    fn report_section_skip(&mut self, info: &SectionInfo) {
        self.push(format!("section_skip {}", info.name));
    }

    fn report_section_start(&mut self, info: &SectionInfo) {
        self.push(format!("section_start {}", info.name));
    }

    fn report_section_end(&mut self, info: &SectionInfo, _result: &TestCaseResult) {
        self.push(format!("section_end {}", info.name));
    }

    fn report_cycle_end(&mut self, info: &TestCaseInfo, result: &TestCaseResult) {
        self.push(format!(
            "cycle_end {} failed={}",
            info.name,
            result.is_failed()
        ));
    }

    fn report_case_end(&mut self, info: &TestCaseInfo, tally: &CaseTally) {
        self.push(format!(
            "case_end {} cycles={} failed={}",
            info.name, tally.cycles, tally.failed
        ));
    }

    fn report_log_now(&mut self, _result: &TestCaseResult) {
        self.push("log_now".to_string());
    }

    fn report_run(&mut self, _infos: &[TestCaseInfo], result: &TestRunResult) {
        self.push(format!(
            "run passed={} failed={}",
            result.passed_cases, result.failed_cases
        ));
    }
}
