//! Git adapter for the orchestrator and the delivery tasks.
//!
//! Every call goes through [`crate::io::process`] so git honours the run's
//! cancel token and output limit like any other external tool.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::snapshot::Snapshot;
use crate::io::cancel::CancelToken;
use crate::io::process::{self, CommandOutput, DEFAULT_OUTPUT_LIMIT_BYTES};

/// Source of working-tree snapshots. The orchestrator only depends on this.
pub trait StatusProbe {
    fn capture(&self) -> Result<Snapshot>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    cancel: CancelToken,
    output_limit_bytes: usize,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>, cancel: CancelToken) -> Self {
        Self {
            workdir: workdir.into(),
            cancel,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    pub fn with_output_limit(mut self, output_limit_bytes: usize) -> Self {
        self.output_limit_bytes = output_limit_bytes;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Capture tracked and untracked changes from `git status --porcelain`.
    #[instrument(skip_all)]
    pub fn snapshot(&self) -> Result<Snapshot> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let snapshot = Snapshot::from_porcelain(&out);
        debug!(
            tracked = snapshot.tracked_changes.len(),
            untracked = snapshot.untracked.len(),
            "captured status snapshot"
        );
        Ok(snapshot)
    }

    /// Abbreviated HEAD ref. Detached HEAD yields the literal `HEAD`.
    pub fn head_ref(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
        }
        Ok(name)
    }

    pub fn toplevel(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(out.trim()))
    }

    pub fn head_short_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--short", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Most recent tag reachable from HEAD, if any.
    pub fn latest_tag(&self) -> Result<Option<String>> {
        let out = self.run(&["describe", "--tags", "--abbrev=0"])?;
        if !out.status.success() {
            debug!("no tags reachable from HEAD");
            return Ok(None);
        }
        Ok(Some(out.stdout_text().trim().to_string()))
    }

    pub fn remote_url(&self, remote: &str) -> Result<String> {
        let out = self.run_capture(&["remote", "get-url", remote])?;
        Ok(out.trim().to_string())
    }

    /// Repository files, tracked plus untracked-but-not-ignored, optionally
    /// filtered by pathspecs.
    pub fn ls_files(&self, pathspecs: &[&str]) -> Result<Vec<String>> {
        let mut args = vec!["ls-files", "--cached", "--others", "--exclude-standard"];
        if !pathspecs.is_empty() {
            args.push("--");
            args.extend_from_slice(pathspecs);
        }
        let out = self.run_capture(&args)?;
        let mut files: Vec<String> = out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Clone a single branch at depth 1 into `dest`.
    #[instrument(skip_all, fields(url, branch))]
    pub fn clone_shallow(&self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        let dest = dest.to_string_lossy();
        debug!(dest = %dest, "shallow cloning");
        self.run_checked(&["clone", "--depth", "1", "--branch", branch, url, &dest])?;
        Ok(())
    }

    #[instrument(skip_all, fields(tag))]
    pub fn create_tag(&self, tag: &str) -> Result<()> {
        self.run_checked(&["tag", tag])?;
        Ok(())
    }

    pub fn push_tags(&self, remote: &str) -> Result<()> {
        self.run_checked(&["push", remote, "--tags"])?;
        Ok(())
    }

    /// Collect the summary printed at the start of a run.
    pub fn info(&self) -> Result<GitInfo> {
        Ok(GitInfo {
            root: self.toplevel()?,
            branch: self.head_ref()?,
            latest_tag: self.latest_tag()?,
            latest_commit: self.head_short_sha()?,
            dirty: !self.snapshot()?.is_clean(),
        })
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(output.stdout_text())
    }

    fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        process::run_checked(self.command(args), &self.cancel, self.output_limit_bytes)
            .with_context(|| format!("git {}", args.join(" ")))
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        process::run_command(self.command(args), &self.cancel, self.output_limit_bytes)
            .with_context(|| format!("git {}", args.join(" ")))
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);
        cmd
    }
}

impl StatusProbe for Git {
    fn capture(&self) -> Result<Snapshot> {
        self.snapshot()
    }
}

/// Repository summary shown before any task runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInfo {
    pub root: PathBuf,
    pub branch: String,
    pub latest_tag: Option<String>,
    pub latest_commit: String,
    pub dirty: bool,
}

impl fmt::Display for GitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Git info:")?;
        writeln!(f, "  Root:          {}", self.root.display())?;
        writeln!(f, "  Branch:        {}", self.branch)?;
        writeln!(
            f,
            "  Latest tag:    {}",
            self.latest_tag.as_deref().unwrap_or("<none>")
        )?;
        writeln!(f, "  Latest commit: {}", self.latest_commit)?;
        writeln!(f, "  Dirty:         {}", self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn snapshot_sees_untracked_and_modified_files() {
        let repo = TestRepo::init().expect("repo");
        let git = Git::new(repo.path(), CancelToken::new());
        assert!(git.snapshot().expect("snapshot").is_clean());

        repo.write("README.md", "changed\n").expect("write");
        repo.write("notes/new.txt", "hi\n").expect("write");
        let snap = git.snapshot().expect("snapshot");
        assert!(snap.tracked_changes.contains("README.md"));
        assert!(snap.untracked.contains("notes/new.txt"));
    }

    #[test]
    fn ls_files_lists_tracked_and_untracked() {
        let repo = TestRepo::init().expect("repo");
        repo.write("main.go", "package main\n").expect("write");
        let git = Git::new(repo.path(), CancelToken::new());
        let files = git.ls_files(&[]).expect("ls-files");
        assert_eq!(files, vec!["README.md".to_string(), "main.go".to_string()]);
        let go = git.ls_files(&["*.go"]).expect("ls-files");
        assert_eq!(go, vec!["main.go".to_string()]);
    }

    #[test]
    fn info_reports_branch_and_missing_tag() {
        let repo = TestRepo::init().expect("repo");
        let git = Git::new(repo.path(), CancelToken::new());
        let info = git.info().expect("info");
        assert_eq!(info.branch, "main");
        assert_eq!(info.latest_tag, None);
        assert!(!info.dirty);
        assert!(info.to_string().contains("Latest tag:    <none>"));
    }

    #[test]
    fn failing_git_command_carries_context() {
        let repo = TestRepo::init().expect("repo");
        let git = Git::new(repo.path(), CancelToken::new());
        let err = git.remote_url("nowhere").unwrap_err();
        assert!(format!("{err:#}").contains("git remote get-url nowhere"));
    }
}
