//! The closed classification vocabulary assigned to enriched commits.

use serde::{Deserialize, Serialize};

/// One of the eight labels an enrichment call may assign to a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    BugFix,
    Feature,
    Refactor,
    Docs,
    Chore,
    Perf,
    Test,
    Style,
}

impl Classification {
    pub const ALL: [Classification; 8] = [
        Classification::BugFix,
        Classification::Feature,
        Classification::Refactor,
        Classification::Docs,
        Classification::Chore,
        Classification::Perf,
        Classification::Test,
        Classification::Style,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BugFix => "bug-fix",
            Self::Feature => "feature",
            Self::Refactor => "refactor",
            Self::Docs => "docs",
            Self::Chore => "chore",
            Self::Perf => "perf",
            Self::Test => "test",
            Self::Style => "style",
        }
    }

    /// Parses a label, accepting both the canonical hyphenated spelling and a
    /// bare underscore/no-separator variant some model responses use.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bug-fix" | "bug_fix" | "bugfix" => Some(Self::BugFix),
            "feature" => Some(Self::Feature),
            "refactor" => Some(Self::Refactor),
            "docs" => Some(Self::Docs),
            "chore" => Some(Self::Chore),
            "perf" => Some(Self::Perf),
            "test" => Some(Self::Test),
            "style" => Some(Self::Style),
            _ => None,
        }
    }

    /// Parses a label, coercing anything unrecognized to `chore` per the
    /// model-response fallback policy.
    pub fn parse_or_chore(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Chore)
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_label() {
        for c in Classification::ALL {
            assert_eq!(Classification::parse(c.as_str()), Some(c));
        }
    }

    #[test]
    fn unknown_label_falls_back_to_chore() {
        assert_eq!(Classification::parse_or_chore("wat"), Classification::Chore);
    }

    #[test]
    fn accepts_underscore_spelling() {
        assert_eq!(Classification::parse("bug_fix"), Some(Classification::BugFix));
    }
}
