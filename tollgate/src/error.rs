//! Error taxonomy shared by the orchestrator and task adapters.
//!
//! Task adapters return `anyhow::Result`; when the failure belongs to one of
//! these kinds the adapter wraps a [`GateError`] so the orchestrator can
//! classify it with `downcast_ref`.

use std::time::Duration;

use thiserror::Error;

use crate::core::report::{FailureRecord, duration_string};

#[derive(Debug, Error)]
pub enum GateError {
    /// A subprocess exited non-zero.
    #[error("running '{command}': {status}, with output:\n{output}")]
    ExternalTool {
        command: String,
        status: String,
        output: String,
    },

    /// The working tree changed while a task ran. The paths themselves are
    /// listed from the task's diff.
    #[error(
        "files changed during task ({} changed, {} created)",
        .changed.len(),
        .created.len()
    )]
    UnexpectedMutation {
        changed: Vec<String>,
        created: Vec<String>,
    },

    #[error("malformed or unmatchable semantic version (got: '{0}')")]
    MalformedVersion(String),

    #[error("could not understand semantic version (got: '{raw}', converted to: '{converted}')")]
    InvalidVersion { raw: String, converted: String },

    #[error(
        "version on this branch ({local}) has not been incremented from the version on '{branch}' ({trunk})"
    )]
    VersionNotIncremented {
        local: String,
        trunk: String,
        branch: String,
    },

    /// Environment or harness failure outside the per-task loop. Always fatal.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("{} task(s) failed ({}): {}", failures.len(), duration_string(*elapsed), render_pairs(failures))]
    TasksFailed {
        failures: Vec<FailureRecord>,
        elapsed: Duration,
    },
}

impl GateError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    /// True when `err` (or anything in its chain) is a cancellation.
    pub fn is_cancelled(err: &anyhow::Error) -> bool {
        err.chain()
            .any(|cause| matches!(cause.downcast_ref::<GateError>(), Some(GateError::Cancelled)))
    }
}

fn render_pairs(failures: &[FailureRecord]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn tasks_failed_lists_every_pair() {
        let err = GateError::TasksFailed {
            failures: vec![
                FailureRecord::new("Go", "Lint (revive)"),
                FailureRecord::new("YAML", "Format (yamlfmt)"),
            ],
            elapsed: Duration::from_millis(1500),
        };
        let msg = err.to_string();
        assert!(msg.contains("Go :: Lint (revive)"));
        assert!(msg.contains("YAML :: Format (yamlfmt)"));
        assert!(msg.contains("t: 1.500s"));
    }

    #[test]
    fn detects_cancellation_through_context() {
        let err = Err::<(), _>(GateError::Cancelled)
            .context("run git status")
            .unwrap_err();
        assert!(GateError::is_cancelled(&err));

        let other = anyhow::anyhow!("boom");
        assert!(!GateError::is_cancelled(&other));
    }
}
