//! Side-effecting adapters: processes, git, config files, provisioning.

pub mod cancel;
pub mod config;
pub mod discovery;
pub mod git;
pub mod process;
pub mod provisioner;
pub mod run_report;
pub mod toolcfg;
