//! The error taxonomy from the failure-kinds list: each variant is a stable,
//! user-facing condition rather than a wrapper around whatever underlying
//! library produced it.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error union returned by core operations.
#[derive(Debug, Error)]
pub enum GitmemError {
    #[error("workspace is not initialized (no {0} found); run init first")]
    NotInitialized(PathBuf),

    #[error("config at {path} is invalid: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("{0} is not inside a git repository")]
    NotARepo(PathBuf),

    #[error("no index database found at {0}; run index first")]
    DbMissing(PathBuf),

    #[error("lock file held at {0}; another gitmem process is running")]
    LockHeld(PathBuf),

    #[error("ANTHROPIC_API_KEY is not set but this operation requires model access")]
    ApiKeyMissing,

    #[error("hash prefix {prefix} is ambiguous; candidates: {}", candidates.join(", "))]
    AmbiguousHash { prefix: String, candidates: Vec<String> },

    #[error("no data found for {0}")]
    NotFound(String),

    #[error("{field} must be one of {}, got {value}", allowed.join(", "))]
    Validation {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("this operation requires enrichment data, but ai is disabled in config")]
    AiRequired,

    #[error("invalid search query: {query}")]
    InvalidSearchQuery { query: String },

    #[error("model request failed: {0}")]
    ModelTransport(String),

    #[error(transparent)]
    Git(#[from] crate::git::GitError),

    #[error(transparent)]
    Model(#[from] crate::model::ModelError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitmemError {
    pub fn ambiguous_hash(prefix: impl Into<String>, candidates: Vec<String>) -> Self {
        Self::AmbiguousHash {
            prefix: prefix.into(),
            candidates,
        }
    }

    pub fn validation(
        field: impl Into<String>,
        value: impl Into<String>,
        allowed: Vec<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            value: value.into(),
            allowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_hash_lists_candidates() {
        let err = GitmemError::ambiguous_hash(
            "abc1234",
            vec!["abc1234aaa".into(), "abc1234bbb".into()],
        );
        let msg = err.to_string();
        assert!(msg.contains("abc1234aaa"));
        assert!(msg.contains("abc1234bbb"));
    }
}
