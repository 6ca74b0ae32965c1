//! Quality-gate and delivery task orchestrator.
//!
//! tollgate discovers which ecosystems a repository contains, runs their
//! lint/format/build/test tools one after another, and fails any tool that
//! errors or leaves the git working tree changed. Delivery (tagging, releases,
//! images) only runs after a clean quality gate whose version is newer than
//! the remote trunk's.
//!
//! - **[`core`]**: Pure, deterministic logic (versions, snapshots, reports).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (processes, git, config files).
//! - **[`task`]**: The [`task::Task`] trait and every concrete task.
//!
//! [`run`] drives one sequential run; [`pipeline`] chains runs into the `ci`
//! and `deliver` commands.

pub mod console;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod run;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
