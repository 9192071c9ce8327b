//! Stable exit codes for the `sectrun` binary.

/// Every selected test case passed (or `list` succeeded).
pub const OK: i32 = 0;
/// At least one test case failed.
pub const FAILED: i32 = 1;
/// Invalid configuration or command-line input.
pub const INVALID: i32 = 2;
/// A fatal condition stopped the run early.
pub const FATAL: i32 = 3;
