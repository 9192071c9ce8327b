//! Line-oriented console reporter.
//!
//! Each line starts with a two-character status marker followed by the dotted
//! path of the case and its open sections:
//!
//! ```text
//! ? running (overwritten by the next line, verbose only)
//! + passed
//! ! failed
//! !! aborted
//! . skipped (verbose only)
//! ```
//!
//! Log entries recorded since the previous report are printed below the
//! status line, indented by four spaces.

use std::fmt;
use std::io::{self, Write};

use tracing::warn;

use crate::core::result::{CaseTally, LogEntry, Severity, TestCaseResult, TestRunResult};
use crate::core::types::{SectionInfo, TestCaseInfo};
use crate::report::TestReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Running,
    Failed,
    Passed,
    Aborted,
    Skipped,
}

impl Status {
    fn marker(self) -> &'static str {
        match self {
            Status::Running => "? ",
            Status::Failed => "! ",
            Status::Passed => "+ ",
            Status::Aborted => "!!",
            Status::Skipped => ". ",
        }
    }

    fn is_transient(self) -> bool {
        matches!(self, Status::Running | Status::Skipped)
    }
}

pub struct ConsoleReport<W: Write> {
    out: W,
    verbose: bool,
    /// Case name followed by the currently open sections.
    names: Vec<String>,
    write_failed: bool,
}

impl ConsoleReport<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            verbose: true,
            names: Vec::new(),
            write_failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, args: fmt::Arguments<'_>) {
        if let Err(err) = self.out.write_fmt(args) {
            // Warn once; later write errors are dropped.
            if !self.write_failed {
                warn!(%err, "console reporter failed to write");
                self.write_failed = true;
            }
        }
    }

    fn print_status(&mut self, status: Status) {
        if !self.verbose && status.is_transient() {
            return;
        }
        let path = self.names.join(".");
        let end = if status == Status::Running { "\r" } else { "\n" };
        self.emit(format_args!("{}{path}{end}", status.marker()));
        if status == Status::Running {
            let _ = self.out.flush();
        }
    }

    /// Print the status line and any logs recorded since the last report.
    /// With `completed` unset, a result with nothing new still prints the
    /// running line so the user sees where the body currently is.
    fn print_result(&mut self, result: &TestCaseResult, completed: bool) {
        let (logs, reportable) = result.take_logs();
        if reportable {
            let status = if !result.is_failed() {
                Status::Passed
            } else if result.is_aborting() {
                Status::Aborted
            } else {
                Status::Failed
            };
            self.print_status(status);
            for entry in &logs {
                self.print_log(entry);
            }
        } else if !completed {
            self.print_status(Status::Running);
        }
    }

    fn print_log(&mut self, entry: &LogEntry) {
        match entry.severity {
            Severity::Info | Severity::Error | Severity::InfoExprRaw | Severity::ErrorExprRaw => {
                self.emit(format_args!("    {}\n", entry.text));
            }
            Severity::Warning => self.emit(format_args!("    warning: {}\n", entry.text)),
            Severity::InfoExprExpanded | Severity::ErrorExprExpanded => {
                self.emit(format_args!("      with expansion: {}\n", entry.text));
            }
        }
    }
}

impl<W: Write> TestReport for ConsoleReport<W> {
    fn set_property(&mut self, key: &str, value: &str) {
        if key == "verbose" {
            self.verbose = value == "true";
        }
    }

    fn report_test_cases(&mut self, infos: &[TestCaseInfo]) {
        self.emit(format_args!("testcases: ({})\n", infos.len()));
        for info in infos {
            self.emit(format_args!("  {}\n", info.name));
        }
    }

    fn report_case_skip(&mut self, info: &TestCaseInfo) {
        self.names = vec![info.name.clone()];
        self.print_status(Status::Skipped);
        self.names.clear();
    }

    fn report_case_start(&mut self, info: &TestCaseInfo) {
        self.names = vec![info.name.clone()];
        self.print_status(Status::Running);
    }

    fn report_cycle_start(&mut self, info: &TestCaseInfo, _cycle: u32) {
        self.names = vec![info.name.clone()];
    }

    fn report_section_skip(&mut self, info: &SectionInfo) {
        self.names.push(info.name.clone());
        self.print_status(Status::Skipped);
        self.names.pop();
    }

    fn report_section_start(&mut self, info: &SectionInfo) {
        self.names.push(info.name.clone());
        self.print_status(Status::Running);
    }

    fn report_section_end(&mut self, _info: &SectionInfo, result: &TestCaseResult) {
        self.print_result(result, true);
        self.names.pop();
    }

    fn report_cycle_end(&mut self, _info: &TestCaseInfo, result: &TestCaseResult) {
        self.print_result(result, true);
    }

    fn report_case_end(&mut self, info: &TestCaseInfo, tally: &CaseTally) {
        if self.verbose {
            let status = if tally.failed { "FAILED" } else { "passed" };
            self.emit(format_args!(
                "  {}: {status} after {} cycle(s)\n",
                info.name, tally.cycles
            ));
        }
        self.names.clear();
    }

    fn report_log_now(&mut self, result: &TestCaseResult) {
        self.print_result(result, false);
    }

    fn report_run(&mut self, infos: &[TestCaseInfo], result: &TestRunResult) {
        let verdict = if result.passed() { "PASSED" } else { "FAILED" };
        self.emit(format_args!("\nSummary: {verdict}\n"));
        self.emit(format_args!("  Test groups:       {}\n", infos.len()));
        self.emit(format_args!("  Failed tests:      {}\n", result.failed_cases));
        self.emit(format_args!("  Passed tests:      {}\n", result.passed_cases));
        self.emit(format_args!("  Failed assertions: {}\n", result.failed_assertions));
        self.emit(format_args!("  Passed assertions: {}\n", result.passed_assertions));
        self.emit(format_args!("  Cycles:            {}\n", result.cycles));
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ExprCapture;

    fn output(report: ConsoleReport<Vec<u8>>) -> String {
        String::from_utf8(report.into_inner()).expect("utf8")
    }

    #[test]
    fn failed_section_prints_marker_path_and_logs() {
        let mut report = ConsoleReport::new(Vec::new());
        report.set_property("verbose", "false");
        let case = TestCaseInfo::new("math");
        let result = TestCaseResult::new();

        report.report_case_start(&case);
        report.report_cycle_start(&case, 1);
        report.report_section_start(&SectionInfo::new("add"));
        result.log_fail();
        result.log_detail(&ExprCapture::new("1 + 1 == 3", "2 == 3").into(), true);
        report.report_section_end(&SectionInfo::new("add"), &result);
        report.report_cycle_end(&case, &result);

        assert_eq!(
            output(report),
            "! math.add\n    1 + 1 == 3\n      with expansion: 2 == 3\n"
        );
    }

    #[test]
    fn aborted_result_uses_double_marker() {
        let mut report = ConsoleReport::new(Vec::new());
        report.set_property("verbose", "false");
        let case = TestCaseInfo::new("io");
        let result = TestCaseResult::new();
        result.log_fail();
        result.log_abort();
        result.log_message(Severity::Error, "disk gone");

        report.report_cycle_start(&case, 1);
        report.report_cycle_end(&case, &result);

        assert_eq!(output(report), "!!io\n    disk gone\n");
    }

    #[test]
    fn verbose_mode_shows_running_and_skipped_lines() {
        let mut report = ConsoleReport::new(Vec::new());
        let case = TestCaseInfo::new("math");
        report.report_case_skip(&TestCaseInfo::new("slow"));
        report.report_case_start(&case);
        report.report_cycle_start(&case, 1);
        report.report_section_skip(&SectionInfo::new("big"));

        assert_eq!(output(report), ". slow\n? math\r. math.big\n");
    }

    #[test]
    fn quiet_passing_run_prints_only_the_summary() {
        let mut report = ConsoleReport::new(Vec::new());
        report.set_property("verbose", "false");
        let case = TestCaseInfo::new("math");
        let result = TestCaseResult::new();

        report.report_case_start(&case);
        report.report_cycle_start(&case, 1);
        report.report_cycle_end(&case, &result);
        report.report_case_end(&case, &CaseTally::default());
        let mut totals = TestRunResult::default();
        totals.add_case(&CaseTally {
            cycles: 1,
            ..CaseTally::default()
        });
        report.report_run(&[case], &totals);

        let text = output(report);
        assert!(text.starts_with("\nSummary: PASSED\n"), "{text}");
        assert!(text.contains("  Passed tests:      1\n"));
    }

    #[test]
    fn test_case_listing() {
        let mut report = ConsoleReport::new(Vec::new());
        report.report_test_cases(&[TestCaseInfo::new("a"), TestCaseInfo::new("b")]);
        assert_eq!(output(report), "testcases: (2)\n  a\n  b\n");
    }
}
