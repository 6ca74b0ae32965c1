//! tollgate command-line entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use tollgate::error::GateError;
use tollgate::exit_codes;
use tollgate::io::cancel::CancelToken;
use tollgate::io::config::{CONFIG_FILE_NAME, load_config};
use tollgate::io::discovery;
use tollgate::io::git::Git;
use tollgate::io::provisioner::{self, HostProvisioner, Provisioner};
use tollgate::io::run_report::write_run_reports;
use tollgate::logging;
use tollgate::pipeline::{self, ConsoleObserver};
use tollgate::task::TaskContext;
use tollgate::task::catalog;

/// Tools tollgate itself shells out to, whatever the provisioner.
const HOST_PREREQUISITES: [&str; 2] = ["git", "bash"];

#[derive(Parser)]
#[command(
    name = "tollgate",
    version,
    about = "Run quality gates and delivery tasks for a repository"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Repository root. Defaults to the current directory.
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// Config file, relative to the repository root unless absolute.
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Cancel the whole run after this many seconds.
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Write a JSON report of every run to this path.
    #[arg(long, global = true, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Debug-level diagnostics on stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the quality gate.
    Ci,
    /// Run the quality gate and, if it passes, the delivery tasks.
    Deliver,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(&cli) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            // The failure summary has already been printed.
            if !matches!(
                err.downcast_ref::<GateError>(),
                Some(GateError::TasksFailed { .. })
            ) {
                eprintln!("error: {err:#}");
            }
            exit_codes::FAILED
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<()> {
    let root = match &cli.workdir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let config_path = root.join(&cli.config);
    let config = load_config(&config_path).map_err(|err| GateError::internal(format!("{err:#}")))?;
    debug!(config = %config_path.display(), "loaded config");

    let cancel = match cli.timeout.or(config.run_timeout_secs) {
        Some(secs) => CancelToken::new().with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    cancel.install_signal_handler()?;

    preflight(config.output_limit_bytes)?;
    let provisioner = provisioner::from_config(&config)?;
    debug!(provisioner = provisioner.name(), "selected provisioner");

    let git = Git::new(&root, cancel.clone()).with_output_limit(config.output_limit_bytes);
    print!("{}", git.info()?);
    let composition = discovery::discover(&git)?;
    print!("{composition}");

    let ctx = TaskContext {
        root: &root,
        config: &config,
        provisioner: provisioner.as_ref(),
        cancel: &cancel,
    };
    let mut observer = ConsoleObserver;
    let reports = match cli.command {
        Command::Ci => pipeline::ci(catalog::ci_tasks(&composition), &git, &ctx, &mut observer)?,
        Command::Deliver => pipeline::deliver(
            catalog::ci_tasks(&composition),
            || catalog::delivery_tasks(&composition, &config),
            &git,
            &ctx,
            &mut observer,
        )?,
    };

    if let Some(path) = &cli.report {
        write_run_reports(path, &reports)?;
    }
    pipeline::outcome(reports)?;
    Ok(())
}

fn preflight(output_limit_bytes: usize) -> Result<()> {
    let host = HostProvisioner::new(output_limit_bytes);
    for tool in HOST_PREREQUISITES {
        host.ensure_available(tool)
            .map_err(|err| GateError::internal(format!("{err:#}")))?;
    }
    Ok(())
}
