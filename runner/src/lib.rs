//! Section-exploring unit-test engine.
//!
//! A test body declares named sections and index loops inline. The engine
//! runs the body once per cycle and enters exactly one untried leaf path per
//! cycle, so every combination of sections runs in isolation while the code
//! around them is shared. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (the tracker tree, the result
//!   scoreboard, name filters). No I/O, fully testable in isolation.
//! - **[`io`]**: Side effects (configuration files, console output, JSON
//!   summaries).
//!
//! Orchestration modules ([`context`], [`driver`], [`session`]) connect test
//! bodies to the tracker tree and to a [`TestReport`].

pub mod context;
pub mod core;
pub mod driver;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod registry;
pub mod report;
pub mod selftest;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::context::{Recorder, TestContext};
pub use crate::core::filter::NameFilter;
pub use crate::core::result::{CaseTally, TestCaseResult, TestRunResult};
pub use crate::core::types::{Abort, Detail, ExprCapture, Outcome, SectionInfo, TestCaseInfo};
pub use crate::driver::{DriverOptions, FatalCondition, FatalKind, run_test_case};
pub use crate::registry::{Registry, RunOrder, TestCase};
pub use crate::report::TestReport;
pub use crate::session::{RunOutcome, SessionError, SessionOptions, TestSession};
