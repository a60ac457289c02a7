//! Refresh a local metadata snapshot of a remote org.
//!
//! The refresher builds a manifest naming every metadata type the org reports,
//! retrieves it, and whenever the retriever rejects types its registry does not
//! know, excludes them and tries again. The architecture keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (manifest text, failure classification,
//!   exclusion bookkeeping). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (platform CLI, HTTP, filesystem, git)
//!   behind traits so tests can script them.
//!
//! Orchestration modules ([`discovery`], [`retrieve`], [`refresh`]) coordinate
//! core logic with I/O to implement the CLI.

pub mod core;
pub mod discovery;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod refresh;
pub mod retrieve;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
