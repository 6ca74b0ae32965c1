//! The generic adapter behind almost every catalog entry: one external
//! command, an optional embedded config file, and an optional file list.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::io::toolcfg::{self, EmbeddedConfig, MaterializedConfig};
use crate::task::{Task, TaskContext};

/// Runs a fixed argument template through the provisioner.
///
/// Arguments may reference the materialized config file as
/// `{{ config_file }}`.
pub struct CommandTask {
    info_text: String,
    args: Vec<String>,
    pathspecs: Vec<String>,
    config: Option<EmbeddedConfig>,
    materialized: Option<MaterializedConfig>,
}

impl CommandTask {
    pub fn builder(info_text: impl Into<String>) -> CommandTaskBuilder {
        CommandTaskBuilder {
            info_text: info_text.into(),
            args: Vec::new(),
            pathspecs: Vec::new(),
            config: None,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }
}

pub struct CommandTaskBuilder {
    info_text: String,
    args: Vec<String>,
    pathspecs: Vec<String>,
    config: Option<EmbeddedConfig>,
}

impl CommandTaskBuilder {
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn config_file(mut self, config: EmbeddedConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Append repository files matching these git pathspecs to the command.
    /// When nothing matches, the task passes without running.
    pub fn files<I, S>(mut self, pathspecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pathspecs.extend(pathspecs.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> CommandTask {
        CommandTask {
            info_text: self.info_text,
            args: self.args,
            pathspecs: self.pathspecs,
            config: self.config,
            materialized: None,
        }
    }
}

impl Task for CommandTask {
    fn info_text(&self) -> &str {
        &self.info_text
    }

    fn exec(&mut self, ctx: &TaskContext<'_>) -> Result<()> {
        let mut files = Vec::new();
        if !self.pathspecs.is_empty() {
            let pathspecs: Vec<&str> = self.pathspecs.iter().map(String::as_str).collect();
            files = ctx.git().ls_files(&pathspecs)?;
            if files.is_empty() {
                debug!(task = %self.info_text, "no matching files, nothing to run");
                return Ok(());
            }
        }

        ctx.provisioner.ensure_available(self.program())?;

        if let Some(config) = &self.config {
            self.materialized = Some(toolcfg::materialize(config, ctx.root)?);
        }
        let mut args = render_args(
            &self.args,
            self.materialized.as_ref().map(MaterializedConfig::path),
        )?;
        args.extend(files);

        let output = ctx.provisioner.run(ctx.cancel, ctx.root, &args)?;
        debug!(task = %self.info_text, output_len = output.len(), "command succeeded");
        Ok(())
    }

    fn post(&mut self, _ctx: &TaskContext<'_>) -> Result<()> {
        if let Some(materialized) = self.materialized.take() {
            materialized.remove()?;
        }
        Ok(())
    }
}

fn render_args(args: &[String], config_file: Option<&Path>) -> Result<Vec<String>> {
    let Some(config_file) = config_file else {
        return Ok(args.to_vec());
    };
    let env = Environment::new();
    let config_file = config_file.to_string_lossy().to_string();
    args.iter()
        .map(|arg| {
            env.render_str(arg, context! { config_file => config_file.as_str() })
                .with_context(|| format!("render argument '{arg}'"))
        })
        .collect()
}
