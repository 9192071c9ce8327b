//! Shared types passed between test bodies, the driver, and reporters.
//!
//! These types carry no behavior beyond formatting. They must stay cheap to
//! clone because reporters receive them on every section transition.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a registered test case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestCaseInfo {
    pub name: String,
}

impl TestCaseInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Identity of a section (or index loop) as seen by reporters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionInfo {
    pub name: String,
}

impl SectionInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Marker returned through `Err` when an assertion aborts the current cycle.
///
/// It carries no payload: the failure text has already been recorded on the
/// cycle's result by the time an `Abort` exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abort;

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("test cycle aborted")
    }
}

/// Result of a test body or guarded block: `Ok` continues, `Err(Abort)` unwinds.
pub type Outcome<T = ()> = Result<T, Abort>;

/// One captured expression: the source text and its evaluated rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprCapture {
    pub raw: String,
    pub expanded: String,
}

impl ExprCapture {
    pub fn new(raw: impl Into<String>, expanded: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            expanded: expanded.into(),
        }
    }
}

/// Payload attached to a success, failure, or abort record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detail {
    Message(String),
    Expressions(Vec<ExprCapture>),
}

impl Detail {
    pub fn none() -> Self {
        Detail::Message(String::new())
    }
}

impl From<&str> for Detail {
    fn from(value: &str) -> Self {
        Detail::Message(value.to_string())
    }
}

impl From<String> for Detail {
    fn from(value: String) -> Self {
        Detail::Message(value)
    }
}

impl From<ExprCapture> for Detail {
    fn from(value: ExprCapture) -> Self {
        Detail::Expressions(vec![value])
    }
}
