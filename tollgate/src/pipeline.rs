//! The `ci` and `deliver` pipelines built on [`Run`].

use tracing::{info, instrument, warn};

use crate::console;
use crate::core::report::{RunKind, RunReport};
use crate::error::GateError;
use crate::io::git::StatusProbe;
use crate::run::{Run, RunEvent};
use crate::task::{TaskContext, TaskSet};

/// Receives progress for every run in a pipeline.
pub trait RunObserver {
    fn run_started(&mut self, kind: RunKind);
    fn event(&mut self, event: RunEvent<'_>);
    fn run_finished(&mut self, report: &RunReport);
}

/// Prints to the terminal.
pub struct ConsoleObserver;

impl RunObserver for ConsoleObserver {
    fn run_started(&mut self, kind: RunKind) {
        console::print_run_banner(kind);
    }

    fn event(&mut self, event: RunEvent<'_>) {
        console::print_event(event);
    }

    fn run_finished(&mut self, report: &RunReport) {
        console::print_report(report);
    }
}

/// Discards everything.
pub struct SilentObserver;

impl RunObserver for SilentObserver {
    fn run_started(&mut self, _kind: RunKind) {}
    fn event(&mut self, _event: RunEvent<'_>) {}
    fn run_finished(&mut self, _report: &RunReport) {}
}

/// Run one task set to completion.
#[instrument(skip_all, fields(kind = kind.label()))]
pub fn run_tasks(
    kind: RunKind,
    tasks: TaskSet,
    probe: &dyn StatusProbe,
    ctx: &TaskContext<'_>,
    observer: &mut dyn RunObserver,
) -> Result<RunReport, GateError> {
    observer.run_started(kind);
    let mut run = Run::init(kind, tasks, probe)?;
    if let Err(err) = run.execute(ctx, |event| observer.event(event)) {
        if !run.failures().is_empty() {
            warn!(failures = ?run.failures(), "run interrupted after recorded failures");
        }
        return Err(err);
    }
    let report = run.report();
    observer.run_finished(&report);
    Ok(report)
}

/// Quality gate only.
pub fn ci(
    tasks: TaskSet,
    probe: &dyn StatusProbe,
    ctx: &TaskContext<'_>,
    observer: &mut dyn RunObserver,
) -> Result<Vec<RunReport>, GateError> {
    Ok(vec![run_tasks(RunKind::Ci, tasks, probe, ctx, observer)?])
}

/// Quality gate, then delivery only if the gate recorded no failures.
/// `delivery` is only built when it will run.
pub fn deliver(
    ci_tasks: TaskSet,
    delivery: impl FnOnce() -> TaskSet,
    probe: &dyn StatusProbe,
    ctx: &TaskContext<'_>,
    observer: &mut dyn RunObserver,
) -> Result<Vec<RunReport>, GateError> {
    let gate = run_tasks(RunKind::Ci, ci_tasks, probe, ctx, observer)?;
    if !gate.succeeded() {
        warn!(
            failures = gate.failures.len(),
            "quality gate failed, skipping delivery"
        );
        return Ok(vec![gate]);
    }
    info!("quality gate passed, starting delivery");
    let delivered = run_tasks(RunKind::Deliver, delivery(), probe, ctx, observer)?;
    Ok(vec![gate, delivered])
}

/// Turn a pipeline's reports into its overall outcome: the first failing
/// run becomes [`GateError::TasksFailed`].
pub fn outcome(reports: Vec<RunReport>) -> Result<Vec<RunReport>, GateError> {
    if let Some(failed) = reports.iter().find(|report| !report.succeeded()) {
        return Err(GateError::TasksFailed {
            failures: failed.failures.clone(),
            elapsed: failed.elapsed,
        });
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::report::FailureRecord;
    use crate::io::cancel::CancelToken;
    use crate::io::config::GateConfig;
    use crate::task::TaskGroup;
    use crate::test_support::{FakeProbe, FakeProvisioner, ScriptedTask, Step};

    #[derive(Default)]
    struct Recorder {
        started: Vec<RunKind>,
        finished: usize,
    }

    impl RunObserver for Recorder {
        fn run_started(&mut self, kind: RunKind) {
            self.started.push(kind);
        }
        fn event(&mut self, _event: RunEvent<'_>) {}
        fn run_finished(&mut self, _report: &RunReport) {
            self.finished += 1;
        }
    }

    fn set(group: &str, task: ScriptedTask) -> TaskSet {
        std::iter::once(TaskGroup::new(group).with_task(task)).collect()
    }

    fn with_ctx<T>(f: impl FnOnce(&TaskContext<'_>) -> T) -> T {
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
        f(&ctx)
    }

    #[test]
    fn failed_gate_blocks_delivery() {
        let probe = FakeProbe::clean();
        let release = ScriptedTask::new("Release", Step::Pass);
        let release_calls = release.exec_calls();
        let mut recorder = Recorder::default();

        let reports = with_ctx(|ctx| {
            deliver(
                set("Version", ScriptedTask::new("Versioning checks", Step::Fail("stale"))),
                || set("Go", release),
                &probe,
                ctx,
                &mut recorder,
            )
        })
        .expect("pipeline");

        assert_eq!(reports.len(), 1);
        assert_eq!(release_calls.get(), 0);
        assert_eq!(recorder.started, vec![RunKind::Ci]);
        let err = outcome(reports).unwrap_err();
        assert!(matches!(
            err,
            GateError::TasksFailed { ref failures, .. }
                if failures == &[FailureRecord::new("Version", "Versioning checks")]
        ));
    }

    #[test]
    fn clean_gate_runs_delivery() {
        let probe = FakeProbe::clean();
        let release = ScriptedTask::new("Release", Step::Pass);
        let release_calls = release.exec_calls();
        let mut recorder = Recorder::default();

        let reports = with_ctx(|ctx| {
            deliver(
                set("Version", ScriptedTask::new("Versioning checks", Step::Pass)),
                || set("Go", release),
                &probe,
                ctx,
                &mut recorder,
            )
        })
        .expect("pipeline");

        assert_eq!(release_calls.get(), 1);
        assert_eq!(recorder.started, vec![RunKind::Ci, RunKind::Deliver]);
        assert_eq!(recorder.finished, 2);
        assert!(outcome(reports).is_ok());
    }

    #[test]
    fn ci_reports_single_run() {
        let probe = FakeProbe::clean();
        let reports = with_ctx(|ctx| {
            ci(
                set("X", ScriptedTask::new("Task", Step::Pass)),
                &probe,
                ctx,
                &mut SilentObserver,
            )
        })
        .expect("ci");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, RunKind::Ci);
    }
}
