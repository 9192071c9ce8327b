//! Per-cycle scoreboard and whole-run tallies.
//!
//! [`TestCaseResult`] is the only structure in the engine that may be touched
//! from several threads at once: worker threads spawned by a test body record
//! outcomes through it while the primary thread keeps running the body.
//! Everything else here is owned by the driver.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::types::Detail;

/// Severity of a log entry recorded during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    InfoExprRaw,
    InfoExprExpanded,
    Warning,
    Error,
    ErrorExprRaw,
    ErrorExprExpanded,
}

impl Severity {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Severity::Error | Severity::ErrorExprRaw | Severity::ErrorExprExpanded
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub severity: Severity,
    pub text: String,
}

/// Result of one cycle of a test case.
///
/// The fail counter packs `2 * failures + abort_bit` into one word so "any
/// failure" and "is aborting" come from a single load.
#[derive(Debug, Default)]
pub struct TestCaseResult {
    has_new: AtomicBool,
    fails: AtomicU32,
    successes: AtomicU32,
    logs: Mutex<Vec<LogEntry>>,
}

impl TestCaseResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_fail(&self) {
        self.has_new.store(true, Ordering::Relaxed);
        self.fails.fetch_add(2, Ordering::Relaxed);
    }

    /// Set the sticky abort bit. Counts as a failure for `is_failed`.
    pub fn log_abort(&self) {
        self.has_new.store(true, Ordering::Relaxed);
        self.fails.fetch_or(1, Ordering::Relaxed);
    }

    pub fn log_success(&self) {
        self.has_new.store(true, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_failed(&self) -> bool {
        self.fails.load(Ordering::Relaxed) > 0
    }

    pub fn is_aborting(&self) -> bool {
        self.fails.load(Ordering::Relaxed) & 1 == 1
    }

    pub fn fail_count(&self) -> u32 {
        self.fails.load(Ordering::Relaxed) / 2
    }

    pub fn success_count(&self) -> u32 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn log_message(&self, severity: Severity, text: impl Into<String>) {
        let entry = LogEntry {
            severity,
            text: text.into(),
        };
        // A poisoned lock only means another thread panicked mid-push; the
        // buffer itself is still a valid Vec.
        let mut logs = self.logs.lock().unwrap_or_else(|err| err.into_inner());
        logs.push(entry);
    }

    /// Append `detail` using the info or error family of severities.
    pub fn log_detail(&self, detail: &Detail, error: bool) {
        match detail {
            Detail::Message(text) => {
                if !text.is_empty() {
                    let severity = if error { Severity::Error } else { Severity::Info };
                    self.log_message(severity, text.as_str());
                }
            }
            Detail::Expressions(exprs) => {
                let (raw, expanded) = if error {
                    (Severity::ErrorExprRaw, Severity::ErrorExprExpanded)
                } else {
                    (Severity::InfoExprRaw, Severity::InfoExprExpanded)
                };
                for expr in exprs {
                    self.log_message(raw, expr.raw.as_str());
                    self.log_message(expanded, expr.expanded.as_str());
                }
            }
        }
    }

    /// Drain the log buffer.
    ///
    /// Returns the drained entries and whether anything new happened since
    /// the previous drain (counter updates included).
    pub fn take_logs(&self) -> (Vec<LogEntry>, bool) {
        let taken = {
            let mut logs = self.logs.lock().unwrap_or_else(|err| err.into_inner());
            std::mem::take(&mut *logs)
        };
        let had_new = self.has_new.swap(false, Ordering::Relaxed);
        let reportable = had_new || !taken.is_empty();
        (taken, reportable)
    }

    /// Cheap poll used by live reporters before taking the log lock.
    pub fn has_new(&self) -> bool {
        self.has_new.load(Ordering::Relaxed)
    }
}

/// Accumulated outcome of every cycle of one test case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseTally {
    pub cycles: u32,
    pub failed: bool,
    pub aborted: bool,
    pub passed_assertions: u32,
    pub failed_assertions: u32,
}

impl CaseTally {
    /// Fold one finished cycle into the tally.
    pub fn add_cycle(&mut self, result: &TestCaseResult) {
        self.cycles += 1;
        self.passed_assertions += result.success_count();
        self.failed_assertions += result.fail_count();
        self.failed |= result.is_failed();
        self.aborted |= result.is_aborting();
    }
}

/// Whole-run summary. Owned by the session; never shared across threads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunResult {
    pub passed_cases: u32,
    pub failed_cases: u32,
    pub passed_assertions: u32,
    pub failed_assertions: u32,
    pub cycles: u32,
}

impl TestRunResult {
    pub fn add_case(&mut self, tally: &CaseTally) {
        self.cycles += tally.cycles;
        self.passed_assertions += tally.passed_assertions;
        if tally.failed {
            self.failed_cases += 1;
            self.failed_assertions += tally.failed_assertions;
        } else {
            self.passed_cases += 1;
        }
    }

    pub fn passed(&self) -> bool {
        self.failed_cases == 0
    }
}
