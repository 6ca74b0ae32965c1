//! JSON run report written with `--report`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::report::RunReport;

#[derive(Debug, Serialize)]
struct ReportFile<'a> {
    succeeded: bool,
    runs: &'a [RunReport],
}

/// Atomically write every run of one invocation to disk (temp file + rename).
pub fn write_run_reports(path: &Path, runs: &[RunReport]) -> Result<()> {
    debug!(path = %path.display(), runs = runs.len(), "writing run report");
    let file = ReportFile {
        succeeded: runs.iter().all(RunReport::succeeded),
        runs,
    };
    let mut buf = serde_json::to_string_pretty(&file).context("serialize run report")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run report {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace run report {}", path.display()))?;
    Ok(())
}
