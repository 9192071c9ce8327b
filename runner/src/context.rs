//! The handle a test body receives on every cycle.
//!
//! [`TestContext`] is where the tracker tree meets user code: sections and
//! index loops acquire their tracker nodes through it, and assertions land on
//! the cycle's [`TestCaseResult`]. An abort travels back to the driver as
//! `Err(Abort)`, so bodies propagate it with `?` and every enclosing section
//! guard sees it on the way out.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, trace};

use crate::core::filter::NameFilter;
use crate::core::result::{Severity, TestCaseResult};
use crate::core::tracker::{NodeId, TrackerContext, TrackerError};
use crate::core::types::{Abort, Detail, Outcome, SectionInfo};
use crate::report::TestReport;

/// What the driver needs to know once the body of a cycle has returned.
#[derive(Debug, Default)]
pub(crate) struct CycleFinish {
    /// A section guard failed its node for this cycle's abort.
    pub absorbed_abort: bool,
    pub fatal: Option<String>,
    pub internal: Option<TrackerError>,
}

pub struct TestContext<'a> {
    tracker: &'a mut TrackerContext,
    reporter: &'a mut dyn TestReport,
    filter: &'a NameFilter,
    result: Arc<TestCaseResult>,
    /// Sections entered through guards and not yet ended, innermost last.
    active: Vec<(NodeId, SectionInfo)>,
    absorbed_abort: bool,
    fatal: Option<String>,
    internal: Option<TrackerError>,
}

impl<'a> TestContext<'a> {
    pub(crate) fn new(
        tracker: &'a mut TrackerContext,
        reporter: &'a mut dyn TestReport,
        filter: &'a NameFilter,
        result: Arc<TestCaseResult>,
    ) -> Self {
        Self {
            tracker,
            reporter,
            filter,
            result,
            active: Vec::new(),
            absorbed_abort: false,
            fatal: None,
            internal: None,
        }
    }

    pub(crate) fn finish(self) -> CycleFinish {
        CycleFinish {
            absorbed_abort: self.absorbed_abort,
            fatal: self.fatal,
            internal: self.internal,
        }
    }

    // ---- blocks ----------------------------------------------------------

    /// Run `body` as the named section if this cycle is meant to enter it.
    ///
    /// Sections that were already explored (or that this cycle cannot reach
    /// any more) return `Ok(())` without calling `body`.
    pub fn section<F>(&mut self, name: &str, body: F) -> Outcome
    where
        F: FnOnce(&mut Self) -> Outcome,
    {
        let info = SectionInfo::new(name);
        let Some(node) = self.start_section(&info)? else {
            return Ok(());
        };
        let outcome = body(self);
        self.end_section(node, &info, outcome)
    }

    /// A section whose body must panic. A panic is recorded as a success; a
    /// body that returns normally is recorded as a failure.
    pub fn section_should_panic<F>(&mut self, name: &str, body: F) -> Outcome
    where
        F: FnOnce(&mut Self) -> Outcome,
    {
        self.section(name, |t| {
            let depth = t.active.len();
            match panic::catch_unwind(AssertUnwindSafe(|| body(&mut *t))) {
                Ok(outcome) => {
                    outcome?;
                    t.record_failure("a panic was required");
                    Ok(())
                }
                Err(payload) => {
                    if let Err(err) = t.unwind_active(depth, false) {
                        return Err(t.internal_error(err));
                    }
                    t.record_success(format!("panicked as required: {}", panic_message(&*payload)));
                    Ok(())
                }
            }
        })
    }

    /// Acquire a bounded repeat of `size` ordinals.
    ///
    /// Returns the ordinal this cycle explores, or `None` when the loop is not
    /// entered. The loop stays open until the enclosing section ends, and each
    /// ordinal gets its own set of nested sections.
    pub fn ordinal(&mut self, name: &str, size: usize) -> Outcome<Option<usize>> {
        let acquired = match self.tracker.acquire_index(name, size) {
            Ok(acquired) => acquired,
            Err(err) => return Err(self.internal_error(err)),
        };
        if !acquired.entered {
            return Ok(None);
        }
        let index = self.tracker.index_of(acquired.node);
        trace!(loop_name = name, ?index, size, "index loop entered");
        Ok(index)
    }

    /// Like [`ordinal`](Self::ordinal), yielding the value at this cycle's ordinal.
    pub fn each<'v, T>(&mut self, name: &str, values: &'v [T]) -> Outcome<Option<&'v T>> {
        Ok(self
            .ordinal(name, values.len())?
            .and_then(|index| values.get(index)))
    }

    fn start_section(&mut self, info: &SectionInfo) -> Outcome<Option<NodeId>> {
        let acquired = match self.tracker.acquire_section(&info.name) {
            Ok(acquired) => acquired,
            Err(err) => return Err(self.internal_error(err)),
        };
        if !acquired.entered {
            return Ok(None);
        }

        let node = acquired.node;
        if !self.filter.is_empty() && !self.filter.matches(&self.tracker.full_name(node)) {
            self.reporter.report_section_skip(info);
            if let Err(err) = self.tracker.skip(node) {
                return Err(self.internal_error(err));
            }
            return Ok(None);
        }

        self.active.push((node, info.clone()));
        self.reporter.report_section_start(info);
        Ok(Some(node))
    }

    fn end_section(&mut self, node: NodeId, info: &SectionInfo, outcome: Outcome) -> Outcome {
        self.active.pop();
        if self.internal.is_some() {
            return Err(Abort);
        }

        let transition = match outcome {
            Ok(()) => self.tracker.close(node),
            Err(Abort) if !self.absorbed_abort => {
                self.absorbed_abort = true;
                self.tracker.fail(node)
            }
            Err(Abort) => self.tracker.close(node),
        };
        if let Err(err) = transition {
            return Err(self.internal_error(err));
        }

        self.reporter.report_section_end(info, &self.result);
        outcome
    }

    /// End every active section above `keep` after a panic skipped their
    /// guards. With `fail_innermost` the innermost one fails like an abort
    /// (unless a guard already failed a node this cycle); the rest close.
    pub(crate) fn unwind_active(
        &mut self,
        keep: usize,
        fail_innermost: bool,
    ) -> Result<(), TrackerError> {
        let mut first = true;
        while self.active.len() > keep {
            let Some((node, info)) = self.active.pop() else {
                break;
            };
            if first && fail_innermost && !self.absorbed_abort {
                self.absorbed_abort = true;
                self.tracker.fail(node)?;
            } else {
                self.tracker.close(node)?;
            }
            first = false;
            self.reporter.report_section_end(&info, &self.result);
        }
        Ok(())
    }

    fn internal_error(&mut self, err: TrackerError) -> Abort {
        error!(%err, "tracker invariant violated");
        self.result.log_abort();
        self.result
            .log_message(Severity::Error, format!("internal error: {err}"));
        if self.internal.is_none() {
            self.internal = Some(err);
        }
        Abort
    }

    // ---- assertions ------------------------------------------------------

    pub fn log(&self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.result.log_message(Severity::Info, text);
        }
    }

    pub fn warn(&self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.result.log_message(Severity::Warning, text);
        }
    }

    pub fn record_success(&self, detail: impl Into<Detail>) {
        self.result.log_success();
        self.result.log_detail(&detail.into(), false);
    }

    pub fn record_failure(&self, detail: impl Into<Detail>) {
        self.result.log_fail();
        self.result.log_detail(&detail.into(), true);
    }

    /// Record a failure that ends the cycle. Propagate the returned value
    /// with `Err(..)?` or `return Err(..)`.
    pub fn record_abort(&self, detail: impl Into<Detail>) -> Abort {
        record_abort_on(&self.result, detail.into())
    }

    /// Non-fatal check: records the outcome and reports it back.
    pub fn check(&self, condition: bool, detail: impl Into<Detail>) -> bool {
        if condition {
            self.result.log_success();
        } else {
            self.record_failure(detail);
        }
        condition
    }

    /// Fatal check: on failure the cycle aborts.
    pub fn require(&self, condition: bool, detail: impl Into<Detail>) -> Outcome {
        if condition {
            self.result.log_success();
            Ok(())
        } else {
            Err(self.record_abort(detail))
        }
    }

    /// Abort if any thread has recorded an abort on this cycle.
    pub fn checkpoint(&self) -> Outcome {
        if self.result.is_aborting() {
            Err(Abort)
        } else {
            Ok(())
        }
    }

    pub fn is_failed(&self) -> bool {
        self.result.is_failed()
    }

    pub fn is_aborting(&self) -> bool {
        self.result.is_aborting()
    }

    /// Push the logs recorded so far to the reporter.
    pub fn report_now(&mut self) {
        self.reporter.report_log_now(&self.result);
    }

    /// Stop the whole run after this cycle unwinds. No further test case runs.
    pub fn fatal(&mut self, message: impl Into<String>) -> Abort {
        let message = message.into();
        self.result.log_abort();
        self.result.log_message(Severity::Error, message.as_str());
        if self.fatal.is_none() {
            self.fatal = Some(message);
        }
        Abort
    }

    /// Handle for recording outcomes from worker threads.
    pub fn recorder(&self) -> Recorder {
        Recorder {
            result: Arc::clone(&self.result),
        }
    }
}

/// Thread-safe recording handle for the running cycle.
///
/// Workers cannot unwind the primary thread; an abort recorded here sets the
/// sticky abort flag, which the body observes through
/// [`TestContext::checkpoint`] and the driver observes when the cycle ends.
#[derive(Debug, Clone)]
pub struct Recorder {
    result: Arc<TestCaseResult>,
}

impl Recorder {
    pub fn log(&self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.result.log_message(Severity::Info, text);
        }
    }

    pub fn record_success(&self, detail: impl Into<Detail>) {
        self.result.log_success();
        self.result.log_detail(&detail.into(), false);
    }

    pub fn record_failure(&self, detail: impl Into<Detail>) {
        self.result.log_fail();
        self.result.log_detail(&detail.into(), true);
    }

    pub fn record_abort(&self, detail: impl Into<Detail>) -> Abort {
        record_abort_on(&self.result, detail.into())
    }

    pub fn check(&self, condition: bool, detail: impl Into<Detail>) -> bool {
        if condition {
            self.result.log_success();
        } else {
            self.record_failure(detail);
        }
        condition
    }
}

/// Only the first abort of a cycle is logged; later ones are already part
/// of the same unwind.
fn record_abort_on(result: &TestCaseResult, detail: Detail) -> Abort {
    if result.is_aborting() {
        return Abort;
    }
    result.log_fail();
    result.log_abort();
    result.log_detail(&detail, true);
    Abort
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Non-fatal boolean check that captures the expression text.
#[macro_export]
macro_rules! check {
    ($t:expr, $cond:expr $(,)?) => {{
        let value: bool = $cond;
        if value {
            $t.record_success($crate::Detail::none());
        } else {
            $t.record_failure($crate::ExprCapture::new(
                stringify!($cond),
                format!("{}", value),
            ));
        }
        value
    }};
}

/// Fatal boolean check; evaluates to an [`Outcome`](crate::Outcome) to be used with `?`.
#[macro_export]
macro_rules! require {
    ($t:expr, $cond:expr $(,)?) => {{
        let value: bool = $cond;
        if value {
            $t.record_success($crate::Detail::none());
            ::std::result::Result::<(), $crate::Abort>::Ok(())
        } else {
            ::std::result::Result::<(), $crate::Abort>::Err($t.record_abort(
                $crate::ExprCapture::new(stringify!($cond), format!("{}", value)),
            ))
        }
    }};
}

/// Non-fatal equality check rendering both operands with `Debug`.
#[macro_export]
macro_rules! check_eq {
    ($t:expr, $left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left, right) => {
                if *left == *right {
                    $t.record_success($crate::Detail::none());
                    true
                } else {
                    $t.record_failure($crate::ExprCapture::new(
                        concat!(stringify!($left), " == ", stringify!($right)),
                        format!("{:?} == {:?}", left, right),
                    ));
                    false
                }
            }
        }
    }};
}

/// Fatal equality check; evaluates to an [`Outcome`](crate::Outcome).
#[macro_export]
macro_rules! require_eq {
    ($t:expr, $left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left, right) => {
                if *left == *right {
                    $t.record_success($crate::Detail::none());
                    ::std::result::Result::<(), $crate::Abort>::Ok(())
                } else {
                    ::std::result::Result::<(), $crate::Abort>::Err($t.record_abort(
                        $crate::ExprCapture::new(
                            concat!(stringify!($left), " == ", stringify!($right)),
                            format!("{:?} == {:?}", left, right),
                        ),
                    ))
                }
            }
        }
    }};
}
