//! Stable exit codes for the refresher CLI.

/// The snapshot was refreshed (a failed optional commit still counts).
pub const OK: i32 = 0;
/// Any fatal condition: bad arguments, setup/discovery failure, or a retrieve loop
/// that ended aborted or out of attempts.
pub const FAILURE: i32 = 1;
