//! Runs driven against real git working trees.

use std::fs;

use anyhow::Result;

use tollgate::core::composition::Composition;
use tollgate::core::report::{FailureRecord, RunKind};
use tollgate::error::GateError;
use tollgate::io::cancel::CancelToken;
use tollgate::io::config::GateConfig;
use tollgate::io::git::Git;
use tollgate::pipeline::{self, SilentObserver};
use tollgate::task::catalog;
use tollgate::task::{Task, TaskContext, TaskGroup, TaskSet};
use tollgate::test_support::{FakeProvisioner, TestRepo};

/// Writes a file relative to the repository root during exec.
struct WriteFile {
    info_text: &'static str,
    path: &'static str,
    contents: &'static str,
}

impl Task for WriteFile {
    fn info_text(&self) -> &str {
        self.info_text
    }

    fn exec(&mut self, ctx: &TaskContext<'_>) -> Result<()> {
        fs::write(ctx.root.join(self.path), self.contents)?;
        Ok(())
    }

    fn post(&mut self, _ctx: &TaskContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Creates a scratch file in exec and deletes it in post.
struct ScratchFile;

impl Task for ScratchFile {
    fn info_text(&self) -> &str {
        "Scratch"
    }

    fn exec(&mut self, ctx: &TaskContext<'_>) -> Result<()> {
        fs::write(ctx.root.join("scratch.conf"), "x\n")?;
        Ok(())
    }

    fn post(&mut self, ctx: &TaskContext<'_>) -> Result<()> {
        fs::remove_file(ctx.root.join("scratch.conf"))?;
        Ok(())
    }
}

fn run_ci(repo: &TestRepo, tasks: TaskSet) -> Result<Vec<tollgate::core::report::RunReport>, GateError> {
    let cfg = GateConfig::with_version("1.0.0");
    let provisioner = FakeProvisioner::default();
    let cancel = CancelToken::new();
    let git = Git::new(repo.path(), cancel.clone());
    let ctx = TaskContext {
        root: repo.path(),
        config: &cfg,
        provisioner: &provisioner,
        cancel: &cancel,
    };
    pipeline::ci(tasks, &git, &ctx, &mut SilentObserver)
}

#[test]
fn created_file_is_reported_as_created() {
    let repo = TestRepo::init().expect("repo");
    let tasks: TaskSet = std::iter::once(TaskGroup::new("X").with_task(WriteFile {
        info_text: "Generate",
        path: "foo.txt",
        contents: "new\n",
    }))
    .collect();

    let reports = run_ci(&repo, tasks).expect("run");
    let task = &reports[0].tasks[0];
    assert!(!task.passed);
    assert_eq!(task.diff.created, vec!["foo.txt".to_string()]);
    assert!(task.diff.changed.is_empty());
    assert_eq!(reports[0].failures, vec![FailureRecord::new("X", "Generate")]);
}

#[test]
fn modified_tracked_file_fails_only_the_mutating_task() {
    let repo = TestRepo::init().expect("repo");
    let tasks: TaskSet = std::iter::once(
        TaskGroup::new("Markdown")
            .with_task(WriteFile {
                info_text: "Format",
                path: "README.md",
                contents: "# reformatted\n",
            })
            .with_task(ScratchFile),
    )
    .collect();

    let reports = run_ci(&repo, tasks).expect("run");
    assert_eq!(reports[0].failures, vec![FailureRecord::new("Markdown", "Format")]);
    assert_eq!(reports[0].tasks[0].diff.changed, vec!["README.md".to_string()]);
    assert!(reports[0].tasks[1].passed, "cleanup in post leaves no diff");
}

#[test]
fn pre_existing_changes_are_not_attributed() {
    let repo = TestRepo::init().expect("repo");
    repo.write("README.md", "# dirty before the run\n").expect("write");
    repo.write("notes.txt", "untracked\n").expect("write");
    let tasks: TaskSet = std::iter::once(TaskGroup::new("X").with_task(ScratchFile)).collect();

    let reports = run_ci(&repo, tasks).expect("run");
    assert!(reports[0].succeeded());
}

#[test]
fn quality_gate_on_trunk_passes_end_to_end() {
    let repo = TestRepo::with_version("2.0.0").expect("repo");
    let _origin = repo.add_bare_origin().expect("origin");

    let reports = run_ci(&repo, catalog::ci_tasks(&Composition::default())).expect("run");
    assert_eq!(reports[0].kind, RunKind::Ci);
    assert!(reports[0].succeeded(), "{:?}", reports[0].tasks);
    assert_eq!(reports[0].tasks[0].task, "Versioning checks");
}
