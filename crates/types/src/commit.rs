//! Commit and commit-file row types.

use serde::{Deserialize, Serialize};

use crate::Classification;

/// A single-character git change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
}

impl ChangeType {
    pub fn as_char(&self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::TypeChanged => 'T',
        }
    }

    /// Parses the leading status character git emits, including the
    /// similarity-scored `R100`/`C75`-style prefixes for rename/copy.
    pub fn parse(s: &str) -> Option<Self> {
        let c = s.chars().next()?;
        match c {
            'A' => Some(Self::Added),
            'M' => Some(Self::Modified),
            'D' => Some(Self::Deleted),
            'R' => Some(Self::Renamed),
            'C' => Some(Self::Copied),
            'T' => Some(Self::TypeChanged),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// The enrichment triple attached to a commit once a model call succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub classification: Classification,
    pub summary: String,
    pub enriched_at: String,
    pub model_used: String,
}

/// A commit row as discovered from the git adapter or read back from the
/// store. `enrichment` is `None` until an enricher run fills it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub committed_at: String,
    pub message: String,
    pub enrichment: Option<Enrichment>,
}

impl Commit {
    pub fn is_enriched(&self) -> bool {
        self.enrichment.is_some()
    }

    /// True if this commit looks like an automatically generated merge
    /// commit whose prior summary was itself templated — excluded from judge
    /// sampling by default.
    pub fn is_template_merge(&self) -> bool {
        self.message.starts_with("Merge")
            && self
                .enrichment
                .as_ref()
                .is_some_and(|e| e.summary.starts_with("Merge commit:"))
    }
}

/// A (commit hash, file path) row. The complexity triple is `None` until the
/// measurer fills it in; it is forced to `Some((0, 0, 0))` for short-circuit
/// cases (deletions, generated files, binary content).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitFile {
    pub commit_hash: String,
    pub file_path: String,
    pub change_type: ChangeType,
    pub additions: i64,
    pub deletions: i64,
    pub complexity: Option<Complexity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complexity {
    pub lines_of_code: i64,
    pub indent_complexity: i64,
    pub max_indent: i64,
}

impl Complexity {
    pub const ZERO: Complexity = Complexity {
        lines_of_code: 0,
        indent_complexity: 0,
        max_indent: 0,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rename_status_with_similarity_score() {
        assert_eq!(ChangeType::parse("R100"), Some(ChangeType::Renamed));
    }

    #[test]
    fn template_merge_requires_both_message_and_summary_shape() {
        let mut c = Commit {
            hash: "a".into(),
            author_name: "a".into(),
            author_email: "a@example.com".into(),
            committed_at: "2024-01-01T00:00:00Z".into(),
            message: "Merge branch 'main'".into(),
            enrichment: None,
        };
        assert!(!c.is_template_merge());
        c.enrichment = Some(Enrichment {
            classification: Classification::Chore,
            summary: "Merge commit: main into feature".into(),
            enriched_at: "2024-01-01T00:00:00Z".into(),
            model_used: "test".into(),
        });
        assert!(c.is_template_merge());
    }
}
