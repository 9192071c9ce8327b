//! Reporter interface fired by the session and driver.
//!
//! Events arrive in a fixed order per test case:
//!
//! ```text
//! case_start
//!   cycle_start (section_start | section_skip | section_end)* cycle_end   -- once per cycle
//! case_end
//! ```
//!
//! `report_log_now` may fire at any point while a cycle runs. `report_run`
//! fires once, after the last case (or after a fatal condition).

use crate::core::result::{CaseTally, TestCaseResult, TestRunResult};
use crate::core::types::{SectionInfo, TestCaseInfo};

pub trait TestReport {
    /// Free-form reporter settings (`verbose` is understood by the console reporter).
    fn set_property(&mut self, _key: &str, _value: &str) {}

    /// Enumerate cases without running them.
    fn report_test_cases(&mut self, infos: &[TestCaseInfo]);

    /// A case was excluded by the name filter.
    fn report_case_skip(&mut self, info: &TestCaseInfo);

    fn report_case_start(&mut self, info: &TestCaseInfo);

    /// `cycle` is 1-based.
    fn report_cycle_start(&mut self, info: &TestCaseInfo, cycle: u32);

    fn report_section_skip(&mut self, info: &SectionInfo);

    fn report_section_start(&mut self, info: &SectionInfo);

    fn report_section_end(&mut self, info: &SectionInfo, result: &TestCaseResult);

    fn report_cycle_end(&mut self, info: &TestCaseInfo, result: &TestCaseResult);

    fn report_case_end(&mut self, info: &TestCaseInfo, tally: &CaseTally);

    /// Snapshot of the running cycle, requested by the test body.
    fn report_log_now(&mut self, result: &TestCaseResult);

    fn report_run(&mut self, infos: &[TestCaseInfo], result: &TestRunResult);
}
