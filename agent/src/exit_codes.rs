//! Stable exit codes for `agent` CLI commands.

/// Command succeeded; for `run`, every step of every plan completed.
pub const OK: i32 = 0;
/// Invalid plan/config, or an infrastructure error (model transport, logs).
pub const INVALID: i32 = 1;
/// A step declared `step_status = 'failed'`.
pub const FAILED: i32 = 2;
/// A step ran out of iterations without an accepted final answer.
pub const EXHAUSTED: i32 = 3;
