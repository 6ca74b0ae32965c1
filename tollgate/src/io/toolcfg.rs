//! Linter configuration files shipped inside the binary and written out only
//! for the duration of the task that needs them.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::debug;

/// Where a config file must live for its tool to find it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// At the repository root. For tools without a config-path flag.
    RepoRoot,
    /// In a private scratch directory, passed to the tool by path.
    Scratch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedConfig {
    pub file_name: &'static str,
    pub contents: &'static str,
    pub placement: Placement,
}

pub const REVIVE: EmbeddedConfig = EmbeddedConfig {
    file_name: "revive.toml",
    contents: include_str!("../../toolcfg/revive.toml"),
    placement: Placement::Scratch,
};

// staticcheck has no flag for a config path.
pub const STATICCHECK: EmbeddedConfig = EmbeddedConfig {
    file_name: "staticcheck.conf",
    contents: include_str!("../../toolcfg/staticcheck.conf"),
    placement: Placement::RepoRoot,
};

pub const YAMLFMT: EmbeddedConfig = EmbeddedConfig {
    file_name: ".yamlfmt",
    contents: include_str!("../../toolcfg/.yamlfmt"),
    placement: Placement::Scratch,
};

pub const YAMLLINT: EmbeddedConfig = EmbeddedConfig {
    file_name: ".yamllint",
    contents: include_str!("../../toolcfg/.yamllint"),
    placement: Placement::Scratch,
};

pub const HADOLINT: EmbeddedConfig = EmbeddedConfig {
    file_name: "hadolint.yaml",
    contents: include_str!("../../toolcfg/hadolint.yaml"),
    placement: Placement::Scratch,
};

pub const MARKDOWNLINT: EmbeddedConfig = EmbeddedConfig {
    file_name: ".markdownlint-cli2.yaml",
    contents: include_str!("../../toolcfg/.markdownlint-cli2.yaml"),
    placement: Placement::Scratch,
};

/// A config file currently on disk. Removed by [`MaterializedConfig::remove`],
/// or on drop for scratch placements. A repository's own file is never removed.
#[derive(Debug)]
pub struct MaterializedConfig {
    path: PathBuf,
    scratch: Option<TempDir>,
    owned: bool,
}

impl MaterializedConfig {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(self) -> Result<()> {
        if !self.owned {
            return Ok(());
        }
        debug!(path = %self.path.display(), "removing tool config");
        match self.scratch {
            Some(dir) => dir.close().context("remove scratch config directory"),
            None => match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => {
                    Err(err).with_context(|| format!("remove {}", self.path.display()))
                }
            },
        }
    }
}

/// Write `config` where its tool expects it. A repo-root file that already
/// exists is left untouched and used in place of the embedded one.
pub fn materialize(config: &EmbeddedConfig, repo_root: &Path) -> Result<MaterializedConfig> {
    let (dir, scratch) = match config.placement {
        Placement::RepoRoot => {
            let path = repo_root.join(config.file_name);
            if path.try_exists().with_context(|| format!("stat {}", path.display()))? {
                debug!(path = %path.display(), "repository provides its own tool config");
                return Ok(MaterializedConfig {
                    path,
                    scratch: None,
                    owned: false,
                });
            }
            (repo_root.to_path_buf(), None)
        }
        Placement::Scratch => {
            let tmp = tempfile::Builder::new()
                .prefix("tollgate-cfg-")
                .tempdir()
                .context("create scratch config directory")?;
            (tmp.path().to_path_buf(), Some(tmp))
        }
    };
    let path = dir.join(config.file_name);
    fs::write(&path, config.contents).with_context(|| format!("write {}", path.display()))?;
    debug!(path = %path.display(), "materialized tool config");
    Ok(MaterializedConfig {
        path,
        scratch,
        owned: true,
    })
}
