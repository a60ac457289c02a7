//! Deterministic, pure logic for the refresh pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod candidates;
pub mod diagnostics;
pub mod exclusions;
pub mod manifest;
pub mod types;
