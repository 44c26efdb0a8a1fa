//! Error types for drill-git

use std::path::PathBuf;

/// Result type for drill-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in drill-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("git {subcommand} exited with status {status}: {stderr}")]
    CommandFailed {
        subcommand: String,
        status: i32,
        stderr: String,
    },

    #[error("failed to launch git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not restore branch '{branch}' after shadow operation: {source}")]
    ShadowRestore {
        branch: String,
        #[source]
        source: Box<Error>,
    },
}
