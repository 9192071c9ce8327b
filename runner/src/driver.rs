//! Cycle loop for a single test case.
//!
//! The body is invoked from the top once per cycle until the test case's
//! tracker node reports `CompletedSuccessfully`, or until an abort reaches
//! the case level without any section absorbing it. The number of cycles
//! equals the number of leaf paths through the body's sections, plus one for
//! each failed block whose siblings have to be revisited.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::context::{TestContext, panic_message};
use crate::core::filter::NameFilter;
use crate::core::result::{CaseTally, Severity, TestCaseResult};
use crate::core::tracker::{CycleState, TrackerContext, TrackerError};
use crate::core::types::TestCaseInfo;
use crate::registry::TestCase;
use crate::report::TestReport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    /// A panic escaping the body ends the whole run instead of just the cycle.
    pub panic_is_fatal: bool,
    /// Upper bound on cycles per case; exceeding it means the body's
    /// sections are not stable from one cycle to the next.
    pub max_cycles: u32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            panic_is_fatal: true,
            max_cycles: 10_000,
        }
    }
}

/// Unrecoverable condition raised while running a test case.
#[derive(Debug, Error)]
#[error("fatal condition in test case `{case}`: {kind}")]
pub struct FatalCondition {
    pub case: String,
    /// Cycles completed before the condition, the fatal one included.
    pub tally: CaseTally,
    #[source]
    pub kind: FatalKind,
}

#[derive(Debug, Error)]
pub enum FatalKind {
    #[error("{0}")]
    Requested(String),
    #[error("panicked: {0}")]
    Panic(String),
    #[error("exceeded {0} cycles without completing")]
    CycleLimit(u32),
    #[error(transparent)]
    Internal(#[from] TrackerError),
}

enum CycleEnd {
    Again,
    Done,
}

/// Run every cycle of `case` and return its accumulated tally.
#[instrument(skip_all, fields(case = %case.info().name))]
pub fn run_test_case(
    case: &mut dyn TestCase,
    reporter: &mut dyn TestReport,
    filter: &NameFilter,
    options: &DriverOptions,
) -> Result<CaseTally, FatalCondition> {
    let info = case.info().clone();
    let mut tracker = TrackerContext::new();
    let mut tally = CaseTally::default();

    reporter.report_case_start(&info);
    case.set_up();
    tracker.start_run();

    let outcome = loop {
        match run_cycle(case, &info, &mut tracker, reporter, filter, options, &mut tally) {
            Ok(CycleEnd::Again) => {}
            Ok(CycleEnd::Done) => break Ok(()),
            Err(kind) => break Err(kind),
        }
    };

    case.tear_down();
    tracker.end_run();

    if let Err(kind) = outcome {
        warn!(cycles = tally.cycles, %kind, "test case hit a fatal condition");
        tally.failed = true;
        return Err(FatalCondition {
            case: info.name,
            tally,
            kind,
        });
    }

    debug!(
        cycles = tally.cycles,
        failed = tally.failed,
        "test case finished"
    );
    reporter.report_case_end(&info, &tally);
    Ok(tally)
}

fn run_cycle(
    case: &mut dyn TestCase,
    info: &TestCaseInfo,
    tracker: &mut TrackerContext,
    reporter: &mut dyn TestReport,
    filter: &NameFilter,
    options: &DriverOptions,
    tally: &mut CaseTally,
) -> Result<CycleEnd, FatalKind> {
    if tally.cycles >= options.max_cycles {
        return Err(FatalKind::CycleLimit(options.max_cycles));
    }

    tracker.start_cycle()?;
    let result = Arc::new(TestCaseResult::new());
    let case_node = tracker.acquire_section(&info.name)?.node;
    let cycle = tally.cycles + 1;
    reporter.report_cycle_start(info, cycle);
    trace!(cycle, "cycle started");

    let mut t = TestContext::new(tracker, reporter, filter, Arc::clone(&result));
    let invoked = panic::catch_unwind(AssertUnwindSafe(|| case.invoke(&mut t)));

    let (aborted, panicked) = match invoked {
        Ok(outcome) => (outcome.is_err(), None),
        Err(payload) => {
            let message = panic_message(&*payload);
            result.log_fail();
            result.log_abort();
            result.log_message(Severity::Error, format!("panicked: {message}"));
            t.unwind_active(0, true)?;
            (true, Some(message))
        }
    };
    let finish = t.finish();
    if let Some(err) = finish.internal {
        reporter.report_cycle_end(info, &result);
        tally.add_cycle(&result);
        return Err(err.into());
    }

    // An abort no section absorbed fails the case itself and ends the run of
    // this case; an absorbed one only failed that section.
    let case_level_abort = (aborted || result.is_aborting()) && !finish.absorbed_abort;
    if case_level_abort {
        tracker.fail(case_node)?;
    } else {
        tracker.close(case_node)?;
    }

    reporter.report_cycle_end(info, &result);
    tally.add_cycle(&result);
    trace!(cycle, tree = %tracker.render_tree(), "cycle finished");

    if let Some(message) = finish.fatal {
        reporter.report_log_now(&result);
        return Err(FatalKind::Requested(message));
    }
    if let Some(message) = panicked
        && options.panic_is_fatal
    {
        reporter.report_log_now(&result);
        return Err(FatalKind::Panic(message));
    }

    match tracker.state(case_node) {
        CycleState::CompletedSuccessfully | CycleState::Failed => Ok(CycleEnd::Done),
        _ => Ok(CycleEnd::Again),
    }
}
