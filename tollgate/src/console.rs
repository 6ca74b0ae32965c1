//! Human-facing output. Progress goes to stdout, failure detail to stderr.

use std::io::Write;

use crate::core::report::{
    RunKind, RunReport, TaskResult, duration_string, failure_summary, group_banner, run_banner,
    task_label,
};
use crate::run::RunEvent;

pub fn print_run_banner(kind: RunKind) {
    println!("{}", run_banner(kind));
}

/// Print a run event as it happens.
pub fn print_event(event: RunEvent<'_>) {
    match event {
        RunEvent::GroupStarted { group, width } => println!("{}", group_banner(group, width)),
        RunEvent::TaskStarted { task, width } => {
            print!("{} ", task_label(task, width));
            let _ = std::io::stdout().flush();
        }
        RunEvent::TaskFinished { result } => {
            println!("{}", status_line(result));
            if let Some(detail) = failure_detail(result) {
                eprintln!("{detail}");
            }
        }
    }
}

/// Final summary; failures go to stderr.
pub fn print_report(report: &RunReport) {
    if report.succeeded() {
        println!(
            "All {} tasks passed! ({})",
            report.kind.label(),
            duration_string(report.elapsed)
        );
    } else {
        eprintln!("\n{}\n", failure_summary(&report.failures, report.elapsed));
    }
}

fn status_line(result: &TaskResult) -> String {
    let elapsed = duration_string(std::time::Duration::from_millis(result.elapsed_ms));
    if result.passed {
        format!("PASSED ({elapsed})")
    } else {
        format!("FAILED ({elapsed})")
    }
}

/// Tool output and the mutation listing for a failed task.
fn failure_detail(result: &TaskResult) -> Option<String> {
    if result.passed {
        return None;
    }
    let mut out = String::from("\n");
    if let Some(error) = &result.error {
        out.push_str(error);
        out.push('\n');
    }
    if result.diff.has_changed() {
        out.push_str(&format!("Files ~CHANGED~ during run: {:?}\n", result.diff.changed));
        out.push_str(&format!("Files +CREATED+ during run: {:?}\n", result.diff.created));
    }
    Some(out)
}
