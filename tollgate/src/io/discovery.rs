//! Ecosystem discovery from the repository's file list.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::composition::Composition;
use crate::io::git::Git;

/// Classify tracked and untracked-but-not-ignored files.
#[instrument(skip_all)]
pub fn discover(git: &Git) -> Result<Composition> {
    let files = git.ls_files(&[])?;
    let composition = Composition::from_paths(&files);
    debug!(files = files.len(), ?composition, "discovered repository composition");
    Ok(composition)
}
