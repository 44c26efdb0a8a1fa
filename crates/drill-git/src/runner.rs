//! Async git command runner
//!
//! Runs one git subcommand against a repository working directory and
//! resolves to its captured stdout, or to a [`Error::CommandFailed`]
//! carrying the exit status and captured stderr.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Run `git <subcommand> <args...>` with `repo` as the working directory.
pub async fn git(repo: &Path, subcommand: &str, args: &[&str]) -> Result<String> {
    debug!(repo = %repo.display(), subcommand, ?args, "running git");

    let output = Command::new("git")
        .arg(subcommand)
        .args(args)
        .current_dir(repo)
        .output()
        .await
        .map_err(Error::Spawn)?;

    if !output.status.success() {
        return Err(Error::CommandFailed {
            subcommand: subcommand.to_string(),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
