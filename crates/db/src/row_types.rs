//! Row <-> domain-type conversions. Kept separate from the query modules so
//! the SQL column order and the `gitmem_types` struct shapes can drift
//! independently.

use gitmem_types::{ChangeType, Classification, Commit, CommitFile, Complexity, Enrichment};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::StoreError;

pub fn change_type_to_str(ct: ChangeType) -> &'static str {
    match ct {
        ChangeType::Added => "A",
        ChangeType::Modified => "M",
        ChangeType::Deleted => "D",
        ChangeType::Renamed => "R",
        ChangeType::Copied => "C",
        ChangeType::TypeChanged => "T",
    }
}

pub fn str_to_change_type(s: &str) -> ChangeType {
    ChangeType::parse(s).unwrap_or(ChangeType::Modified)
}

/// Reads one row of the `commits` table into a `Commit`.
pub fn commit_from_row(row: &SqliteRow) -> Result<Commit, StoreError> {
    let classification: Option<String> = row.try_get("classification")?;
    let summary: Option<String> = row.try_get("summary")?;
    let enriched_at: Option<String> = row.try_get("enriched_at")?;
    let model_used: Option<String> = row.try_get("model_used")?;

    let enrichment = match (classification, summary, enriched_at, model_used) {
        (Some(c), Some(s), Some(e), Some(m)) => Some(Enrichment {
            classification: Classification::parse_or_chore(&c),
            summary: s,
            enriched_at: e,
            model_used: m,
        }),
        _ => None,
    };

    Ok(Commit {
        hash: row.try_get("hash")?,
        author_name: row.try_get("author_name")?,
        author_email: row.try_get("author_email")?,
        committed_at: row.try_get("committed_at")?,
        message: row.try_get("message")?,
        enrichment,
    })
}

/// Reads one row of the `commit_files` table into a `CommitFile`.
pub fn commit_file_from_row(row: &SqliteRow) -> Result<CommitFile, StoreError> {
    let lines_of_code: Option<i64> = row.try_get("lines_of_code")?;
    let indent_complexity: Option<i64> = row.try_get("indent_complexity")?;
    let max_indent: Option<i64> = row.try_get("max_indent")?;

    let complexity = match (lines_of_code, indent_complexity, max_indent) {
        (Some(loc), Some(ic), Some(mi)) => Some(Complexity {
            lines_of_code: loc,
            indent_complexity: ic,
            max_indent: mi,
        }),
        _ => None,
    };

    let change_type: String = row.try_get("change_type")?;
    Ok(CommitFile {
        commit_hash: row.try_get("commit_hash")?,
        file_path: row.try_get("file_path")?,
        change_type: str_to_change_type(&change_type),
        additions: row.try_get("additions")?,
        deletions: row.try_get("deletions")?,
        complexity,
    })
}

/// The result of resolving a hash prefix against the `commits` table.
#[derive(Debug, Clone)]
pub enum ResolvePrefixOutcome {
    Unique(Commit),
    Ambiguous(Vec<String>),
    NotFound,
}
