//! Repository configuration stored in `tollgate.toml` at the repository root.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::DEFAULT_OUTPUT_LIMIT_BYTES;

pub const CONFIG_FILE_NAME: &str = "tollgate.toml";

/// Repository configuration (TOML).
///
/// Built once per invocation and passed by reference to the run and every
/// task. Only `version` is required; everything else has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Version of the software in this repository. Loosely formatted values
    /// are canonicalized before use.
    pub version: String,

    /// Truncate captured tool stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Optional wall-clock deadline for a whole run.
    pub run_timeout_secs: Option<u64>,

    pub repo: RepoConfig,
    pub provisioner: ProvisionerConfig,
    pub deliver: DeliverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepoConfig {
    /// Trunk branch whose version must be exceeded before delivery.
    pub default_branch: String,
    /// Remote the trunk is cloned from and tags are pushed to.
    pub remote: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            remote: "origin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerKind {
    /// Tools are resolved from `PATH`.
    #[default]
    Host,
    /// Tools run through `mise exec`.
    Mise,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionerConfig {
    pub kind: ProvisionerKind,
    /// Path or name of the `mise` binary; required when `kind = "mise"`.
    pub mise_bin: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeliverConfig {
    pub go_github_release: Option<GoGithubReleaseConfig>,
    pub container_image: Option<ContainerImageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GoGithubReleaseConfig {
    /// Go package paths to cross-compile, e.g. `./cmd/app`.
    pub build_sources: Vec<String>,
    pub draft: bool,
}

impl Default for GoGithubReleaseConfig {
    fn default() -> Self {
        Self {
            build_sources: vec![".".to_string()],
            draft: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContainerImageConfig {
    pub registry: String,
    pub owner: String,
    pub repo: String,
    pub containerfile: String,
}

impl Default for ContainerImageConfig {
    fn default() -> Self {
        Self {
            registry: "ghcr.io".to_string(),
            owner: String::new(),
            repo: String::new(),
            containerfile: "Containerfile".to_string(),
        }
    }
}

impl ContainerImageConfig {
    /// `registry/owner/repo:version`.
    pub fn image_ref(&self, version: &str) -> String {
        format!("{}/{}/{}:{}", self.registry, self.owner, self.repo, version)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            run_timeout_secs: None,
            repo: RepoConfig::default(),
            provisioner: ProvisionerConfig::default(),
            deliver: DeliverConfig::default(),
        }
    }
}

impl GateConfig {
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(anyhow!("version must be set"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.run_timeout_secs == Some(0) {
            return Err(anyhow!("run_timeout_secs must be > 0 when set"));
        }
        if self.repo.default_branch.trim().is_empty() {
            return Err(anyhow!("repo.default_branch must be non-empty"));
        }
        if self.repo.remote.trim().is_empty() {
            return Err(anyhow!("repo.remote must be non-empty"));
        }
        if self.provisioner.kind == ProvisionerKind::Mise
            && self
                .provisioner
                .mise_bin
                .as_deref()
                .is_none_or(|bin| bin.trim().is_empty())
        {
            return Err(anyhow!("provisioner.mise_bin is required when kind = \"mise\""));
        }
        if let Some(release) = &self.deliver.go_github_release
            && release.build_sources.is_empty()
        {
            return Err(anyhow!(
                "deliver.go_github_release.build_sources must be a non-empty array"
            ));
        }
        if let Some(image) = &self.deliver.container_image
            && (image.registry.is_empty() || image.owner.is_empty() || image.repo.is_empty())
        {
            return Err(anyhow!(
                "deliver.container_image requires registry, owner and repo"
            ));
        }
        Ok(())
    }
}

/// Load and validate config from a TOML file. A missing file is an error,
/// since `version` has no default.
pub fn load_config(path: &Path) -> Result<GateConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GateConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &GateConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
