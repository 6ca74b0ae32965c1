//! Test-only helpers: scripted tasks, fake collaborators, throwaway git repos.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;

use crate::core::snapshot::Snapshot;
use crate::error::GateError;
use crate::io::cancel::CancelToken;
use crate::io::config::{CONFIG_FILE_NAME, GateConfig, write_config};
use crate::io::git::StatusProbe;
use crate::io::provisioner::Provisioner;
use crate::task::{Task, TaskContext};

/// Scripted outcome of `exec` or `post`.
#[derive(Debug, Clone)]
pub enum Step {
    Pass,
    Fail(&'static str),
    /// Cancel the token, then fail the way an interrupted command does.
    Cancel(CancelToken),
}

impl Step {
    fn outcome(&self) -> Result<()> {
        match self {
            Step::Pass => Ok(()),
            Step::Fail(msg) => Err(anyhow!(*msg)),
            Step::Cancel(token) => {
                token.cancel();
                Err(GateError::Cancelled.into())
            }
        }
    }
}

enum Effect {
    Modify(FakeProbe, String),
    Create(FakeProbe, String),
}

/// A task whose behaviour is fixed up front.
pub struct ScriptedTask {
    info_text: String,
    exec: Step,
    post: Step,
    effects: Vec<Effect>,
    exec_calls: Rc<Cell<usize>>,
    post_calls: Rc<Cell<usize>>,
}

impl ScriptedTask {
    pub fn new(info_text: &str, exec: Step) -> Self {
        Self {
            info_text: info_text.to_string(),
            exec,
            post: Step::Pass,
            effects: Vec::new(),
            exec_calls: Rc::default(),
            post_calls: Rc::default(),
        }
    }

    pub fn post_step(mut self, post: Step) -> Self {
        self.post = post;
        self
    }

    /// During `exec`, mark `path` as a modified tracked file in `probe`.
    pub fn modifying(mut self, probe: &FakeProbe, path: &str) -> Self {
        self.effects
            .push(Effect::Modify(probe.clone(), path.to_string()));
        self
    }

    /// During `exec`, mark `path` as a new untracked file in `probe`.
    pub fn creating(mut self, probe: &FakeProbe, path: &str) -> Self {
        self.effects
            .push(Effect::Create(probe.clone(), path.to_string()));
        self
    }

    pub fn exec_calls(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.exec_calls)
    }

    pub fn post_calls(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.post_calls)
    }
}

impl Task for ScriptedTask {
    fn info_text(&self) -> &str {
        &self.info_text
    }

    fn exec(&mut self, _ctx: &TaskContext<'_>) -> Result<()> {
        self.exec_calls.set(self.exec_calls.get() + 1);
        for effect in &self.effects {
            match effect {
                Effect::Modify(probe, path) => probe.modify(path),
                Effect::Create(probe, path) => probe.create(path),
            }
        }
        self.exec.outcome()
    }

    fn post(&mut self, _ctx: &TaskContext<'_>) -> Result<()> {
        self.post_calls.set(self.post_calls.get() + 1);
        self.post.outcome()
    }
}

/// In-memory working tree status. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    state: Rc<RefCell<Snapshot>>,
    broken: bool,
}

impl FakeProbe {
    pub fn clean() -> Self {
        Self::default()
    }

    /// Every capture fails.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn modify(&self, path: &str) {
        self.state
            .borrow_mut()
            .tracked_changes
            .insert(path.to_string());
    }

    pub fn create(&self, path: &str) {
        self.state.borrow_mut().untracked.insert(path.to_string());
    }
}

impl StatusProbe for FakeProbe {
    fn capture(&self) -> Result<Snapshot> {
        if self.broken {
            bail!("status unavailable");
        }
        Ok(self.state.borrow().clone())
    }
}

/// Records every command instead of running it.
#[derive(Debug, Default)]
pub struct FakeProvisioner {
    calls: RefCell<Vec<Vec<String>>>,
    failing: BTreeSet<String>,
    missing: BTreeSet<String>,
}

impl FakeProvisioner {
    /// Commands whose program is `program` exit non-zero.
    pub fn failing(mut self, program: &str) -> Self {
        self.failing.insert(program.to_string());
        self
    }

    /// `ensure_available(tool)` fails.
    pub fn missing(mut self, tool: &str) -> Self {
        self.missing.insert(tool.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl Provisioner for FakeProvisioner {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn ensure_available(&self, tool: &str) -> Result<()> {
        if self.missing.contains(tool) {
            bail!("required tool '{tool}' not found on PATH");
        }
        Ok(())
    }

    fn run(&self, cancel: &CancelToken, _workdir: &Path, args: &[String]) -> Result<String> {
        cancel.check()?;
        self.calls.borrow_mut().push(args.to_vec());
        let program = args.first().cloned().unwrap_or_default();
        if self.failing.contains(&program) {
            return Err(GateError::ExternalTool {
                command: args.join(" "),
                status: "exit status: 1".to_string(),
                output: format!("{program} failed"),
            }
            .into());
        }
        Ok(String::new())
    }
}

/// A git repository in a temporary directory, on branch `main`, with one
/// commit containing `README.md`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn init() -> Result<Self> {
        let dir = tempfile::tempdir().context("create repo dir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        repo.git(&["config", "user.email", "tollgate@example.com"])?;
        repo.git(&["config", "user.name", "tollgate"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.git(&["config", "tag.gpgsign", "false"])?;
        repo.write("README.md", "# test\n")?;
        repo.commit_all("initial")?;
        Ok(repo)
    }

    /// Like [`TestRepo::init`], with a committed config declaring `version`.
    pub fn with_version(version: &str) -> Result<Self> {
        let repo = Self::init()?;
        repo.set_version(version)?;
        repo.commit_all("add config")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Overwrite the config file with `version` (uncommitted).
    pub fn set_version(&self, version: &str) -> Result<()> {
        write_config(
            &self.path().join(CONFIG_FILE_NAME),
            &GateConfig::with_version(version),
        )
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    /// Create a bare repository, register it as `origin`, and push `main`.
    /// The returned directory must outlive the repo's use of the remote.
    pub fn add_bare_origin(&self) -> Result<TempDir> {
        let remote = tempfile::tempdir().context("create remote dir")?;
        let remote_path = remote.path().to_string_lossy().to_string();
        run_git(remote.path(), &["init", "-q", "--bare"])?;
        run_git(remote.path(), &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        self.git(&["remote", "add", "origin", &remote_path])?;
        self.git(&["push", "-q", "origin", "main"])?;
        Ok(remote)
    }

    pub fn git(&self, args: &[&str]) -> Result<String> {
        run_git(self.path(), args)
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
