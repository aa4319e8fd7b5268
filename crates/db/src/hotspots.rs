//! On-demand ranking over `file_stats` — reads the derived table the
//! aggregator rebuilds, so results are only as fresh as the last `rebuild`.
//! No materialized "hotspot" table exists; ranking is a sort, not a
//! separately-maintained aggregate.

use sqlx::Row;

use gitmem_types::Classification;

use crate::{Store, StoreError};

/// The four ranking keys a file's row in `file_stats` can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotspotRank {
    TotalChanges,
    ClassificationCount(Classification),
    CurrentComplexity,
    /// `current_complexity * log(1 + total_changes)` — rewards files that
    /// are both complex and frequently touched over ones that are merely
    /// one or the other.
    Combined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotspotEntry {
    pub file_path: String,
    pub total_changes: i64,
    pub current_complexity: Option<i64>,
    pub score: f64,
}

struct FileStatsRow {
    file_path: String,
    total_changes: i64,
    current_complexity: Option<i64>,
    classification_count: i64,
}

impl Store {
    /// Ranks every file in `file_stats` by `rank`, descending, returning at
    /// most `limit` entries. Files with a null `current_complexity` (never
    /// measured, e.g. binary or deleted on every touch) sort last under
    /// `CurrentComplexity`/`Combined` rather than being dropped, so a caller
    /// asking for "top N" still sees `N` files when fewer than `N` have been
    /// measured.
    pub async fn hotspots(&self, rank: HotspotRank, limit: usize) -> Result<Vec<HotspotEntry>, StoreError> {
        let count_column = match rank {
            HotspotRank::ClassificationCount(c) => Some(classification_count_column(c)),
            _ => None,
        };

        let sql = format!(
            "SELECT file_path, total_changes, current_complexity, {col} AS classification_count \
             FROM file_stats",
            col = count_column.unwrap_or("0"),
        );

        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        let mut entries: Vec<FileStatsRow> = rows
            .iter()
            .map(|row| {
                Ok(FileStatsRow {
                    file_path: row.try_get("file_path")?,
                    total_changes: row.try_get("total_changes")?,
                    current_complexity: row.try_get("current_complexity")?,
                    classification_count: row.try_get("classification_count")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()?;

        entries.sort_by(|a, b| score(b, rank).partial_cmp(&score(a, rank)).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(limit);

        Ok(entries
            .into_iter()
            .map(|row| {
                let s = score(&row, rank);
                HotspotEntry {
                    file_path: row.file_path,
                    total_changes: row.total_changes,
                    current_complexity: row.current_complexity,
                    score: s,
                }
            })
            .collect())
    }
}

fn score(row: &FileStatsRow, rank: HotspotRank) -> f64 {
    match rank {
        HotspotRank::TotalChanges => row.total_changes as f64,
        HotspotRank::ClassificationCount(_) => row.classification_count as f64,
        HotspotRank::CurrentComplexity => row.current_complexity.unwrap_or(i64::MIN) as f64,
        HotspotRank::Combined => match row.current_complexity {
            Some(c) => c as f64 * (1.0 + row.total_changes as f64).ln(),
            None => f64::MIN,
        },
    }
}

fn classification_count_column(c: Classification) -> &'static str {
    match c {
        Classification::BugFix => "bug_fix_count",
        Classification::Feature => "feature_count",
        Classification::Refactor => "refactor_count",
        Classification::Docs => "docs_count",
        Classification::Chore => "chore_count",
        Classification::Perf => "perf_count",
        Classification::Test => "test_count",
        Classification::Style => "style_count",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmem_core::git::CommitRecord;
    use gitmem_core::ports::{AggregateStore, CommitStore};
    use gitmem_types::{ChangeType, Commit, CommitFile, Complexity};

    fn record(hash: &str, file: &str, adds: i64, complexity: i64) -> CommitRecord {
        CommitRecord {
            commit: Commit {
                hash: hash.to_string(),
                author_name: "alice".to_string(),
                author_email: "alice@example.com".to_string(),
                committed_at: "2024-01-01T00:00:00Z".into(),
                message: "msg".into(),
                enrichment: None,
            },
            files: vec![CommitFile {
                commit_hash: hash.to_string(),
                file_path: file.to_string(),
                change_type: ChangeType::Modified,
                additions: adds,
                deletions: 0,
                complexity: Some(Complexity {
                    lines_of_code: 10,
                    indent_complexity: complexity,
                    max_indent: complexity,
                }),
            }],
        }
    }

    #[tokio::test]
    async fn ranks_by_total_changes_descending() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_raw(vec![
                record("h1", "hot.rs", 1, 5),
                record("h2", "hot.rs", 1, 5),
                record("h3", "cold.rs", 1, 5),
            ])
            .await
            .unwrap();
        AggregateStore::rebuild(&store).await.unwrap();

        let top = store.hotspots(HotspotRank::TotalChanges, 10).await.unwrap();
        assert_eq!(top[0].file_path, "hot.rs");
        assert_eq!(top[0].total_changes, 2);
        assert_eq!(top[1].file_path, "cold.rs");
    }

    #[tokio::test]
    async fn combined_score_rewards_complexity_and_frequency_together() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_raw(vec![
                record("h1", "complex_rare.rs", 1, 100),
                record("h2", "simple_frequent.rs", 1, 1),
                record("h3", "simple_frequent.rs", 1, 1),
                record("h4", "simple_frequent.rs", 1, 1),
            ])
            .await
            .unwrap();
        AggregateStore::rebuild(&store).await.unwrap();

        let top = store.hotspots(HotspotRank::Combined, 10).await.unwrap();
        assert_eq!(top[0].file_path, "complex_rare.rs");
    }

    #[tokio::test]
    async fn respects_limit() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_raw(vec![record("h1", "a.rs", 1, 1), record("h2", "b.rs", 1, 1), record("h3", "c.rs", 1, 1)])
            .await
            .unwrap();
        AggregateStore::rebuild(&store).await.unwrap();

        let top = store.hotspots(HotspotRank::TotalChanges, 2).await.unwrap();
        assert_eq!(top.len(), 2);
    }
}
