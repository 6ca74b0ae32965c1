//! The Task capability and the ordered groups a run executes.

pub mod catalog;
pub mod command;
pub mod deliver;
pub mod version_gate;

use std::path::Path;

use anyhow::Result;

use crate::io::cancel::CancelToken;
use crate::io::config::GateConfig;
use crate::io::git::Git;
use crate::io::provisioner::Provisioner;

/// Everything a task may touch, built once per invocation.
pub struct TaskContext<'a> {
    pub root: &'a Path,
    pub config: &'a GateConfig,
    pub provisioner: &'a dyn Provisioner,
    pub cancel: &'a CancelToken,
}

impl TaskContext<'_> {
    /// Git bound to the repository root and this run's cancel token.
    pub fn git(&self) -> Git {
        Git::new(self.root, self.cancel.clone()).with_output_limit(self.config.output_limit_bytes)
    }
}

/// One step of a run.
///
/// `post` is always called after `exec`, whatever `exec` returned, and must
/// release anything `exec` left behind.
pub trait Task {
    /// Banner text. Empty marks a placeholder that is neither printed nor
    /// reported.
    fn info_text(&self) -> &str;

    fn exec(&mut self, ctx: &TaskContext<'_>) -> Result<()>;

    fn post(&mut self, ctx: &TaskContext<'_>) -> Result<()>;
}

/// Tasks for one ecosystem, executed in order.
pub struct TaskGroup {
    pub name: String,
    pub tasks: Vec<Box<dyn Task>>,
}

impl TaskGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: impl Task + 'static) -> Self {
        self.tasks.push(Box::new(task));
        self
    }
}

/// Groups in insertion order. Empty groups are dropped.
#[derive(Default)]
pub struct TaskSet {
    groups: Vec<TaskGroup>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, group: TaskGroup) {
        if !group.tasks.is_empty() {
            self.groups.push(group);
        }
    }

    pub fn into_groups(self) -> Vec<TaskGroup> {
        self.groups
    }
}

impl FromIterator<TaskGroup> for TaskSet {
    fn from_iter<I: IntoIterator<Item = TaskGroup>>(iter: I) -> Self {
        let mut set = Self::new();
        for group in iter {
            set.push(group);
        }
        set
    }
}
