//! Stable exit codes for tollgate commands.

/// Every run passed.
pub const OK: i32 = 0;
/// A task failed, a precondition was not met, or the run was cancelled.
pub const FAILED: i32 = 1;
