//! Sequential run of task groups with working-tree mutation tracking.
//!
//! A run moves through `Init -> Executing -> Reporting -> Done`. Each task is
//! followed by a status snapshot; a task fails when it errors or, for runs
//! that enforce a clean tree, when the snapshot gained paths relative to the
//! baseline. Failures never stop the run.

use std::time::Instant;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::report::{FailureRecord, RunKind, RunReport, TaskResult};
use crate::core::snapshot::{self, Snapshot};
use crate::error::GateError;
use crate::io::git::StatusProbe;
use crate::task::{Task, TaskContext, TaskGroup, TaskSet};

/// A run is consumed by [`Run::report`], which ends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Executing,
    Reporting,
}

/// Progress notifications for the console. Placeholder tasks emit none.
#[derive(Debug)]
pub enum RunEvent<'a> {
    GroupStarted { group: &'a str, width: usize },
    TaskStarted { task: &'a str, width: usize },
    TaskFinished { result: &'a TaskResult },
}

pub struct Run<'p> {
    kind: RunKind,
    phase: Phase,
    groups: Vec<TaskGroup>,
    probe: &'p dyn StatusProbe,
    baseline: Snapshot,
    failures: Vec<FailureRecord>,
    results: Vec<TaskResult>,
    started: Instant,
    started_at: DateTime<Utc>,
    task_width: usize,
    group_width: usize,
}

impl<'p> Run<'p> {
    /// Capture the baseline snapshot. Failing to do so is an internal error.
    #[instrument(skip_all, fields(kind = kind.label()))]
    pub fn init(kind: RunKind, tasks: TaskSet, probe: &'p dyn StatusProbe) -> Result<Self, GateError> {
        let groups = tasks.into_groups();
        let baseline = probe
            .capture()
            .map_err(|err| GateError::Internal(format!("capture baseline status: {err:#}")))?;
        let task_width = groups
            .iter()
            .flat_map(|group| group.tasks.iter())
            .map(|task| task.info_text().len())
            .max()
            .unwrap_or(0);
        let group_width = groups
            .iter()
            .map(|group| group.name.len())
            .max()
            .unwrap_or(0);
        debug!(groups = groups.len(), "run initialized");
        Ok(Self {
            kind,
            phase: Phase::Init,
            groups,
            probe,
            baseline,
            failures: Vec::new(),
            results: Vec::new(),
            started: Instant::now(),
            started_at: Utc::now(),
            task_width,
            group_width,
        })
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Execute every group in order. Only cancellation and internal errors
    /// end the loop early; records made before that are kept.
    #[instrument(skip_all, fields(kind = self.kind.label()))]
    pub fn execute<F>(&mut self, ctx: &TaskContext<'_>, mut on_event: F) -> Result<(), GateError>
    where
        F: FnMut(RunEvent<'_>),
    {
        if self.phase != Phase::Init {
            return Err(GateError::internal(format!(
                "run cannot execute from phase {:?}",
                self.phase
            )));
        }
        self.phase = Phase::Executing;
        let groups = std::mem::take(&mut self.groups);
        for mut group in groups {
            if group.tasks.iter().any(|task| !task.info_text().is_empty()) {
                on_event(RunEvent::GroupStarted {
                    group: &group.name,
                    width: self.group_width,
                });
            }
            for task in &mut group.tasks {
                ctx.cancel.check()?;
                self.run_task(&group.name, task.as_mut(), ctx, &mut on_event)?;
            }
        }
        self.phase = Phase::Reporting;
        Ok(())
    }

    fn run_task<F>(
        &mut self,
        group: &str,
        task: &mut dyn Task,
        ctx: &TaskContext<'_>,
        on_event: &mut F,
    ) -> Result<(), GateError>
    where
        F: FnMut(RunEvent<'_>),
    {
        let info_text = task.info_text().to_string();
        let reporting = !info_text.is_empty();
        if reporting {
            on_event(RunEvent::TaskStarted {
                task: &info_text,
                width: self.task_width,
            });
        }

        let started = Instant::now();
        let exec_result = task.exec(ctx);
        let post_result = task.post(ctx);
        let cancelled = [exec_result.as_ref().err(), post_result.as_ref().err()]
            .into_iter()
            .flatten()
            .any(GateError::is_cancelled);
        if cancelled {
            warn!(group, task = %info_text, "cancelled");
            return Err(GateError::Cancelled);
        }

        let current = self.probe.capture().map_err(|err| {
            GateError::Internal(format!("capture status after '{info_text}': {err:#}"))
        })?;
        let diff = snapshot::diff(&self.baseline, &current);

        let mut errors: Vec<anyhow::Error> = [exec_result.err(), post_result.err()]
            .into_iter()
            .flatten()
            .collect();
        if diff.has_changed() {
            if self.kind.enforces_clean_tree() {
                errors.push(anyhow!(GateError::UnexpectedMutation {
                    changed: diff.changed.clone(),
                    created: diff.created.clone(),
                }));
            } else {
                debug!(group, task = %info_text, ?diff, "working tree changed");
            }
        }

        if !reporting {
            for err in &errors {
                warn!(group, error = %format!("{err:#}"), "placeholder task failed");
            }
            self.baseline = current;
            return Ok(());
        }

        let passed = errors.is_empty();
        let result = TaskResult {
            group: group.to_string(),
            task: info_text.clone(),
            passed,
            elapsed_ms: millis(started.elapsed()),
            error: render_errors(&errors),
            diff,
        };
        on_event(RunEvent::TaskFinished { result: &result });

        if passed {
            info!(group, task = %info_text, "task passed");
            if result.diff.has_changed() {
                self.baseline = current;
            }
        } else {
            warn!(group, task = %info_text, "task failed");
            self.failures.push(FailureRecord::new(group, &info_text));
            self.baseline = current;
        }
        self.results.push(result);
        Ok(())
    }

    /// Close the run and hand back its report.
    pub fn report(self) -> RunReport {
        if self.phase != Phase::Reporting {
            warn!(phase = ?self.phase, "reporting a run that did not finish executing");
        }
        let elapsed = self.started.elapsed();
        info!(
            kind = self.kind.label(),
            failures = self.failures.len(),
            elapsed_ms = millis(elapsed),
            "run finished"
        );
        RunReport {
            kind: self.kind,
            started_at: self.started_at,
            elapsed_ms: millis(elapsed),
            tasks: self.results,
            failures: self.failures,
            elapsed,
        }
    }
}

fn render_errors(errors: &[anyhow::Error]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    Some(
        errors
            .iter()
            .map(|err| format!("{err:#}"))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn millis(elapsed: std::time::Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cancel::CancelToken;
    use crate::io::config::GateConfig;
    use crate::test_support::{FakeProbe, FakeProvisioner, ScriptedTask, Step};

    fn run_groups(
        kind: RunKind,
        probe: &FakeProbe,
        groups: Vec<TaskGroup>,
    ) -> (RunReport, Vec<String>) {
        let cfg = GateConfig::with_version("1.0.0");
        let provisioner = FakeProvisioner::default();
        let cancel = CancelToken::new();
        let root = std::env::temp_dir();
        let ctx = TaskContext {
            root: &root,
            config: &cfg,
            provisioner: &provisioner,
            cancel: &cancel,
        };
        let mut run = Run::init(kind, groups.into_iter().collect(), probe).expect("init");
        let mut events = Vec::new();
        run.execute(&ctx, |event| {
            events.push(match event {
                RunEvent::GroupStarted { group, .. } => format!("group:{group}"),
                RunEvent::TaskStarted { task, .. } => format!("start:{task}"),
                RunEvent::TaskFinished { result } => {
                    format!("done:{}:{}", result.task, result.passed)
                }
            });
        })
        .expect("execute");
        (run.report(), events)
    }

    #[test]
    fn failing_task_is_recorded_and_run_continues() {
        let probe = FakeProbe::clean();
        let group = TaskGroup::new("X")
            .with_task(ScriptedTask::new("Task1", Step::Fail("boom")))
            .with_task(ScriptedTask::new("Task2", Step::Pass));
        let (report, events) = run_groups(RunKind::Ci, &probe, vec![group]);

        assert_eq!(report.failures, vec![FailureRecord::new("X", "Task1")]);
        assert_eq!(
            events,
            vec![
                "group:X",
                "start:Task1",
                "done:Task1:false",
                "start:Task2",
                "done:Task2:true"
            ]
        );
        assert_eq!(report.tasks[0].error.as_deref(), Some("boom"));
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("X :: Task1"));
    }

    #[test]
    fn successful_task_that_modifies_a_file_fails() {
        let probe = FakeProbe::clean();
        let group = TaskGroup::new("Go").with_task(
            ScriptedTask::new("Format", Step::Pass).modifying(&probe, "main.go"),
        );
        let (report, _) = run_groups(RunKind::Ci, &probe, vec![group]);

        assert_eq!(report.failures, vec![FailureRecord::new("Go", "Format")]);
        assert_eq!(report.tasks[0].diff.changed, vec!["main.go".to_string()]);
        assert!(
            report.tasks[0]
                .error
                .as_deref()
                .is_some_and(|e| e.contains("files changed"))
        );
    }

    #[test]
    fn baseline_resets_after_failure() {
        let probe = FakeProbe::clean();
        let group = TaskGroup::new("Go")
            .with_task(ScriptedTask::new("Format", Step::Pass).creating(&probe, "a.go"))
            .with_task(ScriptedTask::new("Vet", Step::Pass));
        let (report, _) = run_groups(RunKind::Ci, &probe, vec![group]);
        assert_eq!(report.failures, vec![FailureRecord::new("Go", "Format")]);
        assert!(report.tasks[1].passed);
    }

    #[test]
    fn post_runs_after_failed_exec_and_its_error_counts() {
        let probe = FakeProbe::clean();
        let task = ScriptedTask::new("Lint", Step::Fail("lint")).post_step(Step::Fail("cleanup"));
        let post_calls = task.post_calls();
        let group = TaskGroup::new("YAML").with_task(task);
        let (report, _) = run_groups(RunKind::Ci, &probe, vec![group]);
        assert_eq!(post_calls.get(), 1);
        assert_eq!(report.tasks[0].error.as_deref(), Some("lint\ncleanup"));
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn placeholder_tasks_are_silent() {
        let probe = FakeProbe::clean();
        let group = TaskGroup::new("Setup")
            .with_task(ScriptedTask::new("", Step::Fail("hidden")).creating(&probe, "x.txt"))
            .with_task(ScriptedTask::new("Real", Step::Pass));
        let (report, events) = run_groups(RunKind::Ci, &probe, vec![group]);
        assert!(report.succeeded());
        assert_eq!(events, vec!["group:Setup", "start:Real", "done:Real:true"]);
        assert_eq!(report.tasks.len(), 1);
    }

    #[test]
    fn delivery_runs_tolerate_mutations() {
        let probe = FakeProbe::clean();
        let group = TaskGroup::new("Go").with_task(
            ScriptedTask::new("GitHub Release", Step::Pass).creating(&probe, "dist/app"),
        );
        let (report, _) = run_groups(RunKind::Deliver, &probe, vec![group]);
        assert!(report.succeeded());
        assert_eq!(report.tasks[0].diff.created, vec!["dist/app".to_string()]);
    }

    #[test]
    fn baseline_capture_failure_is_internal() {
        let probe = FakeProbe::broken();
        let err = Run::init(RunKind::Ci, TaskSet::new(), &probe)
            .err()
            .expect("init should fail");
        assert!(matches!(err, GateError::Internal(_)));
    }

    #[test]
    fn cancellation_unwinds_and_keeps_records() {
        let probe = FakeProbe::clean();
        let cancel = CancelToken::new();
        let cfg = GateConfig::with_version("1.0.0");
        let provisioner = FakeProvisioner::default();
        let root = std::env::temp_dir();
        let ctx = TaskContext {
            root: &root,
            config: &cfg,
            provisioner: &provisioner,
            cancel: &cancel,
        };
        let group = TaskGroup::new("X")
            .with_task(ScriptedTask::new("First", Step::Fail("bad")))
            .with_task(ScriptedTask::new("Second", Step::Cancel(cancel.clone())))
            .with_task(ScriptedTask::new("Third", Step::Pass));
        let mut run = Run::init(RunKind::Ci, std::iter::once(group).collect(), &probe).expect("init");
        let err = run.execute(&ctx, |_| {}).unwrap_err();
        assert!(matches!(err, GateError::Cancelled));
        assert_eq!(run.failures(), &[FailureRecord::new("X", "First")]);
    }

    #[test]
    fn a_run_executes_only_once() {
        let probe = FakeProbe::clean();
        let cancel = CancelToken::new();
        let cfg = GateConfig::with_version("1.0.0");
        let provisioner = FakeProvisioner::default();
        let root = std::env::temp_dir();
        let ctx = TaskContext {
            root: &root,
            config: &cfg,
            provisioner: &provisioner,
            cancel: &cancel,
        };
        let task = ScriptedTask::new("Once", Step::Pass);
        let calls = task.exec_calls();
        let group = TaskGroup::new("X").with_task(task);
        let mut run = Run::init(RunKind::Ci, std::iter::once(group).collect(), &probe).expect("init");
        run.execute(&ctx, |_| {}).expect("first execute");
        let err = run.execute(&ctx, |_| {}).unwrap_err();
        assert!(matches!(err, GateError::Internal(_)));
        assert_eq!(calls.get(), 1);
        assert!(run.report().succeeded());
    }
}
