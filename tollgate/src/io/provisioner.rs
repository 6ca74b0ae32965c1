//! How external tools are located and launched.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::io::cancel::CancelToken;
use crate::io::config::{GateConfig, ProvisionerKind};
use crate::io::process;

/// Launches task commands. `args[0]` is the program.
pub trait Provisioner {
    fn name(&self) -> &'static str;

    /// Fail when `tool` cannot be launched by [`Provisioner::run`].
    fn ensure_available(&self, tool: &str) -> Result<()>;

    /// Run to completion in `workdir`, returning combined stdout/stderr.
    /// A non-zero exit is a [`crate::error::GateError::ExternalTool`].
    fn run(&self, cancel: &CancelToken, workdir: &Path, args: &[String]) -> Result<String>;
}

/// Tools come straight from `PATH`.
#[derive(Debug, Clone)]
pub struct HostProvisioner {
    output_limit_bytes: usize,
}

impl HostProvisioner {
    pub fn new(output_limit_bytes: usize) -> Self {
        Self { output_limit_bytes }
    }
}

impl Provisioner for HostProvisioner {
    fn name(&self) -> &'static str {
        "host"
    }

    fn ensure_available(&self, tool: &str) -> Result<()> {
        let path = which::which(tool)
            .map_err(|err| anyhow!("required tool '{tool}' not found on PATH: {err}"))?;
        debug!(tool, path = %path.display(), "tool available");
        Ok(())
    }

    #[instrument(skip_all, fields(program = args.first().map(String::as_str)))]
    fn run(&self, cancel: &CancelToken, workdir: &Path, args: &[String]) -> Result<String> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| anyhow!("empty command"))?;
        let mut cmd = Command::new(program);
        cmd.args(rest).current_dir(workdir);
        let output = process::run_checked(cmd, cancel, self.output_limit_bytes)?;
        Ok(output.combined())
    }
}

/// Tools are resolved and launched through `mise`.
#[derive(Debug, Clone)]
pub struct MiseProvisioner {
    bin: String,
    output_limit_bytes: usize,
}

impl MiseProvisioner {
    pub fn new(bin: impl Into<String>, output_limit_bytes: usize) -> Self {
        Self {
            bin: bin.into(),
            output_limit_bytes,
        }
    }

    fn exec_command(&self, workdir: &Path, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("exec").arg("--").args(args).current_dir(workdir);
        cmd
    }
}

impl Provisioner for MiseProvisioner {
    fn name(&self) -> &'static str {
        "mise"
    }

    fn ensure_available(&self, tool: &str) -> Result<()> {
        which::which(&self.bin)
            .map_err(|err| anyhow!("mise binary '{}' not found: {err}", self.bin))?;
        let mut cmd = Command::new(&self.bin);
        cmd.arg("which").arg(tool);
        process::run_checked(cmd, &CancelToken::new(), self.output_limit_bytes)
            .with_context(|| format!("required tool '{tool}' not provided by mise"))?;
        Ok(())
    }

    #[instrument(skip_all, fields(program = args.first().map(String::as_str)))]
    fn run(&self, cancel: &CancelToken, workdir: &Path, args: &[String]) -> Result<String> {
        if args.is_empty() {
            return Err(anyhow!("empty command"));
        }
        let output =
            process::run_checked(self.exec_command(workdir, args), cancel, self.output_limit_bytes)?;
        Ok(output.combined())
    }
}

/// Build the provisioner selected in config.
pub fn from_config(cfg: &GateConfig) -> Result<Box<dyn Provisioner>> {
    match cfg.provisioner.kind {
        ProvisionerKind::Host => Ok(Box::new(HostProvisioner::new(cfg.output_limit_bytes))),
        ProvisionerKind::Mise => {
            let bin = cfg
                .provisioner
                .mise_bin
                .clone()
                .ok_or_else(|| anyhow!("provisioner.mise_bin is not set"))?;
            Ok(Box::new(MiseProvisioner::new(bin, cfg.output_limit_bytes)))
        }
    }
}
