//! Failure records, run reports, and the text layout used to print them.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::snapshot::SnapshotDiff;
use crate::error::GateError;

/// Which pipeline a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Ci,
    Deliver,
}

impl RunKind {
    pub fn label(self) -> &'static str {
        match self {
            RunKind::Ci => "CI",
            RunKind::Deliver => "Delivery",
        }
    }

    /// Only quality-gate runs treat working-tree changes as failures. Delivery
    /// tasks produce build artifacts by definition.
    pub fn enforces_clean_tree(self) -> bool {
        matches!(self, RunKind::Ci)
    }
}

/// A task attributed with a failure. Rendered as `group :: task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub group: String,
    pub task: String,
}

impl FailureRecord {
    pub fn new(group: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            task: task.into(),
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :: {}", self.group, self.task)
    }
}

/// Outcome of one reporting task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    pub group: String,
    pub task: String,
    pub passed: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    pub diff: SnapshotDiff,
}

/// Final summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub tasks: Vec<TaskResult>,
    pub failures: Vec<FailureRecord>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Convert into the run-level error when any task failed.
    pub fn into_result(self) -> Result<RunReport, GateError> {
        if self.succeeded() {
            return Ok(self);
        }
        Err(GateError::TasksFailed {
            failures: self.failures,
            elapsed: self.elapsed,
        })
    }
}

/// `t: 1.234s`, the elapsed-time suffix used on every status line.
pub fn duration_string(elapsed: Duration) -> String {
    format!("t: {:.3}s", elapsed.as_secs_f64())
}

pub fn run_banner(kind: RunKind) -> String {
    let inner = format!("@ Run: {} @", kind.label());
    let edge = "@".repeat(inner.len());
    format!("{edge}\n{inner}\n{edge}")
}

pub fn group_banner(group: &str, width: usize) -> String {
    let padding = "=".repeat(width.saturating_sub(group.len()) / 2 + 1);
    let edge = "=".repeat(24);
    format!("{edge}{padding} {group} {padding}{edge}")
}

/// Task line prefix, padded so status columns line up. No trailing newline.
pub fn task_label(task: &str, width: usize) -> String {
    let dots = ".".repeat(width.saturating_sub(task.len()));
    format!("> {task} {dots}............")
}

pub fn failure_summary(failures: &[FailureRecord], elapsed: Duration) -> String {
    let rule = "=".repeat(65);
    let mut out = format!(
        "{rule}\nThe following tasks failed and/or caused a git diff: ({})\n",
        duration_string(elapsed)
    );
    for failure in failures {
        out.push_str(&format!("- {failure}\n"));
    }
    out.push_str(&rule);
    out
}
