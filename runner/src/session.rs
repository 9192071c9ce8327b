//! An explicit test session: registry, filters, reporter, and options.
//!
//! The session is the only place that walks the registry. It checks each
//! case against the filters, hands matching cases to the driver one at a time,
//! and folds their tallies into a [`TestRunResult`].

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::core::filter::NameFilter;
use crate::core::result::{CaseTally, TestRunResult};
use crate::core::types::TestCaseInfo;
use crate::driver::{self, DriverOptions, FatalCondition};
use crate::registry::{Registry, RunOrder};
use crate::report::TestReport;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionOptions {
    pub order: RunOrder,
    /// Seed for [`RunOrder::Random`]; entropy when unset.
    pub seed: Option<u64>,
    pub driver: DriverOptions,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("pre-init hooks must run before any test case")]
    PreInitPending,
    /// The run stopped early; `outcome` holds what ran up to and including
    /// the case that raised the condition.
    #[error("{source}")]
    Fatal {
        outcome: Box<RunOutcome>,
        source: FatalCondition,
    },
}

/// Tally of one case, keyed by name, as it ran in this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseOutcome {
    pub name: String,
    #[serde(flatten)]
    pub tally: CaseTally,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub result: TestRunResult,
    pub cases: Vec<CaseOutcome>,
    /// Cases excluded by the filters.
    pub skipped: Vec<String>,
}

pub struct TestSession {
    registry: Registry,
    filter: NameFilter,
    reporter: Box<dyn TestReport>,
    options: SessionOptions,
    pre_init_completed: bool,
}

impl TestSession {
    pub fn new(registry: Registry, reporter: Box<dyn TestReport>) -> Self {
        Self::with_options(registry, reporter, SessionOptions::default())
    }

    pub fn with_options(
        registry: Registry,
        reporter: Box<dyn TestReport>,
        options: SessionOptions,
    ) -> Self {
        Self {
            registry,
            filter: NameFilter::new(),
            reporter,
            options,
            pre_init_completed: false,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Add comma-separated name filters. Case and section names are both
    /// checked against them.
    pub fn add_filter(&mut self, csv: &str) {
        self.filter.add(csv);
    }

    pub fn set_property(&mut self, key: &str, value: &str) {
        self.reporter.set_property(key, value);
    }

    /// True when no filter is set or `name` shares a prefix with one of them.
    pub fn matches(&self, name: &str) -> bool {
        self.filter.is_empty() || self.filter.matches(name)
    }

    /// Run every registered pre-init hook once. Later calls are no-ops.
    pub fn run_pre_inits(&mut self) {
        if self.pre_init_completed {
            return;
        }
        debug!("running pre-init hooks");
        self.registry.run_pre_inits();
        self.pre_init_completed = true;
    }

    /// Report the cases that match the filters, in run order, without
    /// running them.
    pub fn list(&mut self) -> Vec<TestCaseInfo> {
        let infos: Vec<TestCaseInfo> = self
            .registry
            .ordered(self.options.order, self.options.seed)
            .into_iter()
            .map(|index| self.registry.info(index).clone())
            .filter(|info| self.matches(&info.name))
            .collect();
        self.reporter.report_test_cases(&infos);
        infos
    }

    /// Run every matching case and report the totals.
    ///
    /// A fatal condition stops the run after the case that raised it; the
    /// totals accumulated so far are still reported.
    #[instrument(skip_all, fields(cases = self.registry.len()))]
    pub fn run_all(&mut self) -> Result<RunOutcome, SessionError> {
        if !self.pre_init_completed {
            return Err(SessionError::PreInitPending);
        }

        let order = self.registry.ordered(self.options.order, self.options.seed);
        let mut outcome = RunOutcome::default();
        let mut ran = Vec::new();

        for index in order {
            let info = self.registry.info(index).clone();
            if !self.matches(&info.name) {
                self.reporter.report_case_skip(&info);
                outcome.skipped.push(info.name);
                continue;
            }

            let case = self.registry.case_mut(index);
            match driver::run_test_case(
                case,
                self.reporter.as_mut(),
                &self.filter,
                &self.options.driver,
            ) {
                Ok(tally) => {
                    outcome.result.add_case(&tally);
                    outcome.cases.push(CaseOutcome {
                        name: info.name.clone(),
                        tally,
                    });
                    ran.push(info);
                }
                Err(fatal) => {
                    outcome.result.add_case(&fatal.tally);
                    outcome.cases.push(CaseOutcome {
                        name: info.name.clone(),
                        tally: fatal.tally.clone(),
                    });
                    ran.push(info);
                    self.reporter.report_run(&ran, &outcome.result);
                    return Err(SessionError::Fatal {
                        outcome: Box::new(outcome),
                        source: fatal,
                    });
                }
            }
        }

        info!(
            passed = outcome.result.passed_cases,
            failed = outcome.result.failed_cases,
            skipped = outcome.skipped.len(),
            "test run finished"
        );
        self.reporter.report_run(&ran, &outcome.result);
        Ok(outcome)
    }

    /// Consume the session and hand back its registry.
    pub fn shutdown(self) -> Registry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingReport;

    fn session(report: &RecordingReport) -> TestSession {
        let mut registry = Registry::new();
        registry
            .register("beta", |t| t.section("only", |_| Ok(())))
            .register("alpha", |t| {
                t.check(false, "nope");
                Ok(())
            });
        TestSession::new(registry, Box::new(report.clone()))
    }

    #[test]
    fn run_all_requires_pre_init() {
        let report = RecordingReport::new();
        let mut session = session(&report);
        assert!(matches!(
            session.run_all(),
            Err(SessionError::PreInitPending)
        ));
        assert!(report.events().is_empty());
    }

    #[test]
    fn run_all_runs_cases_in_name_order() {
        let report = RecordingReport::new();
        let mut session = session(&report);
        session.run_pre_inits();
        let outcome = session.run_all().expect("run");

        assert_eq!(outcome.result.passed_cases, 1);
        assert_eq!(outcome.result.failed_cases, 1);
        assert!(!outcome.result.passed());
        assert_eq!(report.events_of("case_start"), vec![
            "case_start alpha",
            "case_start beta"
        ]);
        assert_eq!(report.events().last().map(String::as_str), Some(
            "run passed=1 failed=1"
        ));
    }

    #[test]
    fn filtered_cases_are_reported_as_skipped() {
        let report = RecordingReport::new();
        let mut session = session(&report);
        session.add_filter("BETA");
        session.run_pre_inits();
        let outcome = session.run_all().expect("run");

        assert_eq!(outcome.skipped, vec!["alpha"]);
        assert_eq!(report.events_of("case_skip"), vec!["case_skip alpha"]);
        assert_eq!(outcome.result.passed_cases, 1);
    }

    #[test]
    fn list_reports_matching_cases_without_running_them() {
        let report = RecordingReport::new();
        let mut session = session(&report);
        session.add_filter("al");
        let infos = session.list();
        assert_eq!(infos, vec![TestCaseInfo::new("alpha")]);
        assert_eq!(report.events(), vec!["cases alpha"]);
    }

    #[test]
    fn fatal_condition_stops_the_run_after_reporting_totals() {
        let report = RecordingReport::new();
        let mut registry = Registry::new();
        registry
            .register("a", |t| Err(t.fatal("stop")))
            .register("b", |_| Ok(()));
        let mut session = TestSession::new(registry, Box::new(report.clone()));
        session.run_pre_inits();

        let err = session.run_all().expect_err("fatal");
        let SessionError::Fatal { outcome, source } = err else {
            panic!("expected a fatal condition");
        };
        assert_eq!(source.case, "a");
        assert_eq!(outcome.result.failed_cases, 1);
        assert_eq!(outcome.cases.len(), 1);
        assert!(report.events_of("case_start").iter().all(|e| e != "case_start b"));
        assert_eq!(report.events().last().map(String::as_str), Some(
            "run passed=0 failed=1"
        ));
    }
}
