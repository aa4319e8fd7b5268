//! Derived-table rebuild: `file_stats`, `file_contributors`, `file_coupling`.
//!
//! Rebuild is destructive-then-repopulate, wrapped in a single transaction so
//! concurrent readers see either the pre- or post-rebuild derived tables,
//! never a partial mix.

use std::collections::HashMap;

use async_trait::async_trait;
use gitmem_core::error::GitmemError;
use gitmem_core::ports::AggregateStore;
use gitmem_types::Classification;
use sqlx::{Row, SqlitePool};

use crate::{Store, StoreError};

/// Per-commit cap on how many of its touched files contribute to coupling
/// pairs, keeping the per-commit cost `O(K^2)` instead of `O(n^2)` for merge
/// commits that touch thousands of (often generated) files.
pub const COUPLING_FILES_PER_COMMIT_CAP: usize = 256;

pub struct Aggregator<'a> {
    pool: &'a SqlitePool,
}

impl<'a> Aggregator<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn rebuild(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM file_stats").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM file_contributors").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM file_coupling").execute(&mut *tx).await?;

        let classification_sums: String = Classification::ALL
            .iter()
            .map(|c| {
                format!(
                    "SUM(CASE WHEN c.classification = '{label}' THEN 1 ELSE 0 END) AS {col}",
                    label = c.as_str(),
                    col = classification_count_column(*c),
                )
            })
            .collect::<Vec<_>>()
            .join(",\n    ");

        let file_stats_sql = format!(
            r#"
INSERT INTO file_stats (
    file_path, total_changes,
    {count_columns},
    first_seen, last_changed, total_additions, total_deletions,
    current_loc, current_complexity, avg_complexity, max_complexity
)
SELECT
    cf.file_path,
    COUNT(*) AS total_changes,
    {classification_sums},
    MIN(c.committed_at) AS first_seen,
    MAX(c.committed_at) AS last_changed,
    SUM(cf.additions) AS total_additions,
    SUM(cf.deletions) AS total_deletions,
    (SELECT cf2.lines_of_code FROM commit_files cf2 JOIN commits c2 ON c2.hash = cf2.commit_hash
        WHERE cf2.file_path = cf.file_path ORDER BY c2.committed_at DESC LIMIT 1) AS current_loc,
    (SELECT cf2.indent_complexity FROM commit_files cf2 JOIN commits c2 ON c2.hash = cf2.commit_hash
        WHERE cf2.file_path = cf.file_path ORDER BY c2.committed_at DESC LIMIT 1) AS current_complexity,
    AVG(cf.indent_complexity) AS avg_complexity,
    MAX(cf.indent_complexity) AS max_complexity
FROM commit_files cf
JOIN commits c ON c.hash = cf.commit_hash
GROUP BY cf.file_path
"#,
            count_columns = Classification::ALL
                .iter()
                .map(|c| classification_count_column(*c))
                .collect::<Vec<_>>()
                .join(", "),
            classification_sums = classification_sums,
        );
        sqlx::query(&file_stats_sql).execute(&mut *tx).await?;

        sqlx::query(
            r#"
INSERT INTO file_contributors (file_path, author_email, author_name, commit_count)
SELECT
    cf.file_path,
    c.author_email,
    MAX(c.author_name),
    COUNT(DISTINCT cf.commit_hash)
FROM commit_files cf
JOIN commits c ON c.hash = cf.commit_hash
GROUP BY cf.file_path, c.author_email
"#,
        )
        .execute(&mut *tx)
        .await?;

        self.rebuild_coupling(&mut tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn rebuild_coupling(&self, tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>) -> Result<(), StoreError> {
        let rows = sqlx::query("SELECT commit_hash, file_path, additions, deletions FROM commit_files ORDER BY commit_hash")
            .fetch_all(&mut **tx)
            .await?;

        let mut by_commit: HashMap<String, Vec<(String, i64)>> = HashMap::new();
        for row in &rows {
            let commit_hash: String = row.try_get("commit_hash")?;
            let file_path: String = row.try_get("file_path")?;
            let additions: i64 = row.try_get("additions")?;
            let deletions: i64 = row.try_get("deletions")?;
            by_commit.entry(commit_hash).or_default().push((file_path, additions + deletions));
        }

        let mut pair_counts: HashMap<(String, String), i64> = HashMap::new();
        for files in by_commit.values_mut() {
            files.sort_by(|a, b| b.1.cmp(&a.1));
            files.truncate(COUPLING_FILES_PER_COMMIT_CAP);

            for i in 0..files.len() {
                for j in (i + 1)..files.len() {
                    let a = &files[i].0;
                    let b = &files[j].0;
                    if a == b {
                        continue;
                    }
                    let pair = if a < b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
                    *pair_counts.entry(pair).or_insert(0) += 1;
                }
            }
        }

        for chunk in pair_counts.into_iter().collect::<Vec<_>>().chunks(300) {
            let placeholders = chunk.iter().map(|_| "(?, ?, ?)").collect::<Vec<_>>().join(", ");
            let query = format!(
                "INSERT INTO file_coupling (file_a, file_b, co_change_count) VALUES {} \
                 ON CONFLICT(file_a, file_b) DO UPDATE SET co_change_count = co_change_count + excluded.co_change_count",
                placeholders
            );
            let mut q = sqlx::query(&query);
            for ((a, b), count) in chunk {
                q = q.bind(a).bind(b).bind(count);
            }
            q.execute(&mut **tx).await?;
        }

        Ok(())
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

#[async_trait]
impl AggregateStore for Store {
    async fn rebuild(&self) -> Result<(), GitmemError> {
        Aggregator::new(self.pool()).rebuild().await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use gitmem_core::git::CommitRecord;
    use gitmem_types::{ChangeType, Commit, CommitFile};

    fn record(hash: &str, author: &str, files: &[(&str, i64, i64)]) -> CommitRecord {
        CommitRecord {
            commit: Commit {
                hash: hash.to_string(),
                author_name: author.to_string(),
                author_email: format!("{author}@example.com"),
                committed_at: "2024-01-01T00:00:00Z".into(),
                message: "msg".into(),
                enrichment: None,
            },
            files: files
                .iter()
                .map(|(path, add, del)| CommitFile {
                    commit_hash: hash.to_string(),
                    file_path: path.to_string(),
                    change_type: ChangeType::Modified,
                    additions: *add,
                    deletions: *del,
                    complexity: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn rebuild_on_empty_store_produces_empty_tables() {
        let store = Store::open_in_memory().await.unwrap();
        AggregateStore::rebuild(&store).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM file_stats").fetch_one(store.pool()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn coupling_is_canonicalized_and_single_file_commit_contributes_nothing() {
        use gitmem_core::ports::CommitStore;

        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_raw(vec![
                record("h1", "alice", &[("b.ts", 1, 0), ("a.ts", 1, 0)]),
                record("h2", "bob", &[("solo.ts", 1, 0)]),
            ])
            .await
            .unwrap();

        AggregateStore::rebuild(&store).await.unwrap();

        let rows = sqlx::query("SELECT file_a, file_b, co_change_count FROM file_coupling")
            .fetch_all(store.pool())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let file_a: String = rows[0].try_get("file_a").unwrap();
        let file_b: String = rows[0].try_get("file_b").unwrap();
        assert!(file_a < file_b);
        assert_eq!(file_a, "a.ts");
        assert_eq!(file_b, "b.ts");
    }

    #[tokio::test]
    async fn rebuild_is_idempotent_on_unchanged_inputs() {
        use gitmem_core::ports::CommitStore;

        let store = Store::open_in_memory().await.unwrap();
        store.insert_raw(vec![record("h1", "alice", &[("a.ts", 1, 0), ("b.ts", 2, 1)])]).await.unwrap();

        AggregateStore::rebuild(&store).await.unwrap();
        let first: (i64,) = sqlx::query_as("SELECT co_change_count FROM file_coupling").fetch_one(store.pool()).await.unwrap();

        AggregateStore::rebuild(&store).await.unwrap();
        let second: (i64,) = sqlx::query_as("SELECT co_change_count FROM file_coupling").fetch_one(store.pool()).await.unwrap();

        assert_eq!(first, second);
    }
}
