//! Refuses to let a branch through unless its configured version is newer
//! than the one on the remote trunk.

use std::path::Path;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info, instrument};

use crate::core::remote::canonicalize_remote;
use crate::core::version::{self, Version};
use crate::error::GateError;
use crate::io::config::{CONFIG_FILE_NAME, load_config};
use crate::task::{Task, TaskContext};

/// The trunk is read from a fresh shallow clone rather than a local ref, so
/// the result does not depend on how the CI system checked out this branch.
#[derive(Default)]
pub struct VersionGate {
    clone_dir: Option<TempDir>,
}

impl VersionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding the trunk clone, between `exec` and `post`.
    pub fn clone_path(&self) -> Option<&Path> {
        self.clone_dir.as_ref().map(TempDir::path)
    }
}

impl Task for VersionGate {
    fn info_text(&self) -> &str {
        "Versioning checks"
    }

    #[instrument(skip_all)]
    fn exec(&mut self, ctx: &TaskContext<'_>) -> Result<()> {
        let local = version::canonicalize(&ctx.config.version)?;
        debug!(%local, "local version");

        let git = ctx.git();
        let repo = &ctx.config.repo;
        let remote = canonicalize_remote(&git.remote_url(&repo.remote)?);

        let dir = tempfile::Builder::new()
            .prefix("tollgate-trunk-")
            .tempdir()
            .context("create trunk clone directory")?;
        let dest = dir.path().join("repo");
        let dest_display = dest.display().to_string();
        self.clone_dir = Some(dir);
        git.clone_shallow(&remote, &repo.default_branch, &dest)
            .with_context(|| format!("clone {remote} into {dest_display}"))?;

        let trunk_cfg = load_config(&dest.join(CONFIG_FILE_NAME))
            .with_context(|| format!("read config from '{}'", repo.default_branch))?;
        let trunk = version::canonicalize(&trunk_cfg.version)?;
        debug!(%trunk, "trunk version");

        let head = git.head_ref()?;
        let on_default_branch = head == repo.default_branch;
        check_increment(&local, &trunk, on_default_branch, &repo.default_branch)?;
        info!(%local, %trunk, head = %head, "version check passed");
        Ok(())
    }

    fn post(&mut self, _ctx: &TaskContext<'_>) -> Result<()> {
        if let Some(path) = self.clone_path() {
            debug!(path = %path.display(), "removing trunk clone");
        }
        if let Some(dir) = self.clone_dir.take() {
            dir.close().context("remove trunk clone directory")?;
        }
        Ok(())
    }
}

/// Off the default branch, `local` must be strictly newer than `trunk`.
pub fn check_increment(
    local: &Version,
    trunk: &Version,
    on_default_branch: bool,
    default_branch: &str,
) -> Result<(), GateError> {
    if on_default_branch || version::is_newer(local, trunk) {
        return Ok(());
    }
    Err(GateError::VersionNotIncremented {
        local: local.to_string(),
        trunk: trunk.to_string(),
        branch: default_branch.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> Version {
        version::canonicalize(raw).expect("version")
    }

    #[test]
    fn default_branch_skips_comparison() {
        check_increment(&v("1.0.0"), &v("2.0.0"), true, "main").expect("skipped");
    }

    #[test]
    fn equal_version_off_trunk_fails() {
        let err = check_increment(&v("1.2.0"), &v("1.2.0"), false, "main").unwrap_err();
        assert!(matches!(err, GateError::VersionNotIncremented { ref branch, .. } if branch == "main"));
    }

    #[test]
    fn greater_version_off_trunk_passes() {
        check_increment(&v("1.2.1"), &v("1.2.0"), false, "main").expect("newer");
        check_increment(&v("1.3.0-rc.1"), &v("1.2.9"), false, "main").expect("newer");
    }

    #[test]
    fn prerelease_of_trunk_version_is_not_an_increment() {
        let err = check_increment(&v("1.2.0-rc.1"), &v("1.2.0"), false, "main");
        assert!(err.is_err());
    }
}
