//! Git CLI helpers for fixtures.

use std::path::Path;
use std::process::Command;

/// Run a git command in `repo`, panicking with the captured stderr on
/// failure. Returns captured stdout.
///
/// # Panics
/// Panics if the command cannot be spawned or exits non-zero.
pub fn run_git(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .unwrap_or_else(|e| panic!("run_git: failed to run `git {args:?}`: {e}"));
    if !output.status.success() {
        panic!(
            "run_git: `git {args:?}` failed:\n{}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).into_owned()
}
