//! Deterministic logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. The tracker tree, the
//! scoreboard, and the filters operate on in-memory data only and are tested
//! in isolation.

pub mod filter;
pub mod result;
pub mod tracker;
pub mod types;
