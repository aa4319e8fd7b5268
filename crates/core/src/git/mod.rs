//! Read-only interface to a local git repository.

mod adapter;

pub use adapter::{CommitRecord, GitAdapter, LocalGitAdapter};

use thiserror::Error;

/// Failures from shelling out to `git` or interpreting its output.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },

    #[error("could not parse git output: {0}")]
    UnexpectedOutput(String),

    #[error("not inside a git repository")]
    NotARepo,

    #[error("io error talking to git: {0}")]
    Io(#[from] std::io::Error),
}
