//! The commit and commit-file tables: CRUD, enrichment/complexity updates,
//! prefix resolution, and random sampling for the judge.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use gitmem_core::error::GitmemError;
use gitmem_core::git::CommitRecord;
use gitmem_core::ports::{CommitStore, EvalCommitSource};
use gitmem_core::scope;
use gitmem_types::{Classification, Commit, CommitFile, Complexity};
use sqlx::Row;

use crate::row_types::{change_type_to_str, commit_file_from_row, commit_from_row, ResolvePrefixOutcome};
use crate::{Store, StoreError};

/// `files_by_hashes` and `exclude`-set materialization chunk at this size to
/// stay comfortably under SQLite's default bound-parameter ceiling.
const CHUNK_SIZE: usize = 500;

/// A commit surfaced by `recent_for_file`/`recent_for_directory`, carrying
/// the matched path alongside the commit it belongs to (the directory form
/// dedupes by commit hash even when several matched files share one).
#[derive(Debug, Clone, PartialEq)]
pub struct RecentCommit {
    pub commit: Commit,
    pub file_path: String,
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(", ")
}

impl Store {
    /// Single-item enrichment update; the batch form is what the enricher
    /// actually drives, this exists for callers (CLI `retry` commands,
    /// tests) operating on one commit at a time.
    pub async fn update_enrichment(
        &self,
        hash: &str,
        classification: Classification,
        summary: &str,
        model: &str,
    ) -> Result<(), StoreError> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE commits SET classification = ?1, summary = ?2, enriched_at = ?3, model_used = ?4 WHERE hash = ?5",
        )
        .bind(classification.as_str())
        .bind(summary)
        .bind(&now)
        .bind(model)
        .bind(hash)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Single-item complexity update, mirroring `update_complexity_batch`.
    pub async fn update_complexity(&self, commit_hash: &str, file_path: &str, complexity: Complexity) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE commit_files SET lines_of_code = ?1, indent_complexity = ?2, max_indent = ?3 \
             WHERE commit_hash = ?4 AND file_path = ?5",
        )
        .bind(complexity.lines_of_code)
        .bind(complexity.indent_complexity)
        .bind(complexity.max_indent)
        .bind(commit_hash)
        .bind(file_path)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Resolves a hash prefix, capping the candidate scan at `cap` rows (the
    /// spec only requires reporting that more than one candidate exists, not
    /// an exhaustive list for pathological prefixes).
    pub async fn resolve_prefix(&self, prefix: &str, cap: usize) -> Result<ResolvePrefixOutcome, StoreError> {
        let like = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let rows = sqlx::query("SELECT * FROM commits WHERE hash LIKE ?1 ESCAPE '\\' LIMIT ?2")
            .bind(&like)
            .bind(cap as i64)
            .fetch_all(self.pool())
            .await?;

        match rows.len() {
            0 => Ok(ResolvePrefixOutcome::NotFound),
            1 => Ok(ResolvePrefixOutcome::Unique(commit_from_row(&rows[0])?)),
            _ => {
                let hashes = rows
                    .iter()
                    .map(|r| r.try_get::<String, _>("hash"))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ResolvePrefixOutcome::Ambiguous(hashes))
            }
        }
    }

    /// Most recent commits touching exactly `path`.
    pub async fn recent_for_file(&self, path: &str, limit: usize) -> Result<Vec<RecentCommit>, StoreError> {
        let rows = sqlx::query(
            "SELECT c.*, cf.file_path AS matched_path FROM commits c \
             JOIN commit_files cf ON cf.commit_hash = c.hash \
             WHERE cf.file_path = ?1 \
             ORDER BY c.committed_at DESC LIMIT ?2",
        )
        .bind(path)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|r| {
                Ok(RecentCommit {
                    commit: commit_from_row(r)?,
                    file_path: r.try_get("matched_path")?,
                })
            })
            .collect()
    }

    /// Most recent commits touching any file under `dir_prefix`, deduplicated
    /// by commit hash when several matched files share one. Uses the same
    /// `LIKE` form the scope engine builds so directory matching here agrees
    /// with scope-filtered search.
    pub async fn recent_for_directory(&self, dir_prefix: &str, limit: usize) -> Result<Vec<RecentCommit>, StoreError> {
        let like = scope::to_like_pattern(dir_prefix);
        let rows = sqlx::query(
            "SELECT c.*, MIN(cf.file_path) AS matched_path FROM commits c \
             JOIN commit_files cf ON cf.commit_hash = c.hash \
             WHERE cf.file_path LIKE ?1 ESCAPE '\\' \
             GROUP BY c.hash \
             ORDER BY c.committed_at DESC LIMIT ?2",
        )
        .bind(&like)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|r| {
                Ok(RecentCommit {
                    commit: commit_from_row(r)?,
                    file_path: r.try_get("matched_path")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CommitStore for Store {
    async fn insert_raw(&self, records: Vec<CommitRecord>) -> Result<(), GitmemError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        for record in &records {
            sqlx::query(
                "INSERT OR IGNORE INTO commits (hash, author_name, author_email, committed_at, message) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&record.commit.hash)
            .bind(&record.commit.author_name)
            .bind(&record.commit.author_email)
            .bind(&record.commit.committed_at)
            .bind(&record.commit.message)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

            for file in &record.files {
                sqlx::query(
                    "INSERT OR IGNORE INTO commit_files \
                     (commit_hash, file_path, change_type, additions, deletions) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .bind(&file.commit_hash)
                .bind(&file.file_path)
                .bind(change_type_to_str(file.change_type))
                .bind(file.additions)
                .bind(file.deletions)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from)?;
            }
        }
        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn indexed_hashes(&self) -> Result<HashSet<String>, GitmemError> {
        let rows = sqlx::query("SELECT hash FROM commits")
            .fetch_all(self.pool())
            .await
            .map_err(StoreError::from)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("hash").map_err(|e| StoreError::from(e).into()))
            .collect()
    }

    async fn unenriched(&self, since: Option<&str>) -> Result<Vec<Commit>, GitmemError> {
        let rows = match since {
            Some(date) => {
                sqlx::query(
                    "SELECT * FROM commits WHERE enriched_at IS NULL AND committed_at >= ?1 \
                     ORDER BY committed_at DESC",
                )
                .bind(date)
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query("SELECT * FROM commits WHERE enriched_at IS NULL ORDER BY committed_at DESC")
                    .fetch_all(self.pool())
                    .await
            }
        }
        .map_err(StoreError::from)?;

        rows.iter().map(|r| commit_from_row(r).map_err(Into::into)).collect()
    }

    async fn update_enrichment_batch(
        &self,
        items: Vec<(String, Classification, String)>,
        model: &str,
    ) -> Result<(), GitmemError> {
        if items.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        for (hash, classification, summary) in items {
            sqlx::query(
                "UPDATE commits SET classification = ?1, summary = ?2, enriched_at = ?3, model_used = ?4 \
                 WHERE hash = ?5",
            )
            .bind(classification.as_str())
            .bind(&summary)
            .bind(&now)
            .bind(model)
            .bind(&hash)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        }
        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn commit_files_missing_complexity(&self, limit: usize) -> Result<Vec<CommitFile>, GitmemError> {
        let rows = sqlx::query(
            "SELECT * FROM commit_files WHERE lines_of_code IS NULL ORDER BY rowid LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(StoreError::from)?;

        rows.iter().map(|r| commit_file_from_row(r).map_err(Into::into)).collect()
    }

    async fn update_complexity_batch(&self, items: Vec<CommitFile>) -> Result<(), GitmemError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        for file in items {
            let complexity = file.complexity.unwrap_or(Complexity::ZERO);
            sqlx::query(
                "UPDATE commit_files SET lines_of_code = ?1, indent_complexity = ?2, max_indent = ?3 \
                 WHERE commit_hash = ?4 AND file_path = ?5",
            )
            .bind(complexity.lines_of_code)
            .bind(complexity.indent_complexity)
            .bind(complexity.max_indent)
            .bind(&file.commit_hash)
            .bind(&file.file_path)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        }
        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn write_metadata(&self, key: &str, value: &str) -> Result<(), GitmemError> {
        sqlx::query(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(self.pool())
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn files_by_hashes(&self, hashes: &[String]) -> Result<HashMap<String, Vec<CommitFile>>, GitmemError> {
        let mut out: HashMap<String, Vec<CommitFile>> = HashMap::new();
        for chunk in hashes.chunks(CHUNK_SIZE) {
            let query = format!(
                "SELECT * FROM commit_files WHERE commit_hash IN ({}) ORDER BY rowid",
                placeholders(chunk.len())
            );
            let mut q = sqlx::query(&query);
            for h in chunk {
                q = q.bind(h);
            }
            let rows = q.fetch_all(self.pool()).await.map_err(StoreError::from)?;
            for row in &rows {
                let file = commit_file_from_row(row)?;
                out.entry(file.commit_hash.clone()).or_default().push(file);
            }
        }
        for hash in hashes {
            out.entry(hash.clone()).or_default();
        }
        Ok(out)
    }
}

impl Store {
    /// Materializes `exclude` into a connection-scoped temp table when it's
    /// too large to inline as bound parameters, per the 500-hash chunking
    /// rule used elsewhere in this crate.
    async fn random_enriched_impl(
        &self,
        n: usize,
        exclude: &HashSet<String>,
        exclude_template_merges: bool,
    ) -> Result<Vec<Commit>, StoreError> {
        let template_clause = if exclude_template_merges {
            "AND NOT (message LIKE 'Merge%' AND summary LIKE 'Merge commit:%')"
        } else {
            ""
        };

        if exclude.len() <= CHUNK_SIZE {
            let exclude_vec: Vec<&String> = exclude.iter().collect();
            let exclude_clause = if exclude_vec.is_empty() {
                String::new()
            } else {
                format!("AND hash NOT IN ({})", placeholders(exclude_vec.len()))
            };
            let query = format!(
                "SELECT * FROM commits WHERE enriched_at IS NOT NULL {exclude_clause} {template_clause} \
                 ORDER BY RANDOM() LIMIT ?"
            );
            let mut q = sqlx::query(&query);
            for h in &exclude_vec {
                q = q.bind(h.as_str());
            }
            q = q.bind(n as i64);
            let rows = q.fetch_all(self.pool()).await?;
            return rows.iter().map(|r| commit_from_row(r)).collect();
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("CREATE TEMP TABLE IF NOT EXISTS exclude_hashes (hash TEXT PRIMARY KEY)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM exclude_hashes").execute(&mut *tx).await?;
        for chunk in exclude.iter().collect::<Vec<_>>().chunks(CHUNK_SIZE) {
            let query = format!(
                "INSERT OR IGNORE INTO exclude_hashes (hash) VALUES {}",
                chunk.iter().map(|_| "(?)").collect::<Vec<_>>().join(", ")
            );
            let mut q = sqlx::query(&query);
            for h in chunk {
                q = q.bind(h.as_str());
            }
            q.execute(&mut *tx).await?;
        }

        let query = format!(
            "SELECT * FROM commits WHERE enriched_at IS NOT NULL \
             AND hash NOT IN (SELECT hash FROM exclude_hashes) {template_clause} \
             ORDER BY RANDOM() LIMIT ?"
        );
        let rows = sqlx::query(&query).bind(n as i64).fetch_all(&mut *tx).await?;
        let result: Result<Vec<Commit>, StoreError> = rows.iter().map(|r| commit_from_row(r)).collect();
        sqlx::query("DROP TABLE exclude_hashes").execute(&mut *tx).await?;
        tx.commit().await?;
        result
    }
}

#[async_trait]
impl EvalCommitSource for Store {
    async fn get_enriched(&self, hash: &str) -> Result<Option<Commit>, GitmemError> {
        let row = sqlx::query("SELECT * FROM commits WHERE hash = ?1 AND enriched_at IS NOT NULL")
            .bind(hash)
            .fetch_optional(self.pool())
            .await
            .map_err(StoreError::from)?;
        row.as_ref().map(commit_from_row).transpose().map_err(Into::into)
    }

    async fn random_enriched(
        &self,
        n: usize,
        exclude: &HashSet<String>,
        exclude_template_merges: bool,
    ) -> Result<Vec<Commit>, GitmemError> {
        self.random_enriched_impl(n, exclude, exclude_template_merges)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmem_types::{ChangeType, Commit as CommitType};

    fn sample_record(hash: &str, path: &str) -> CommitRecord {
        CommitRecord {
            commit: CommitType {
                hash: hash.to_string(),
                author_name: "A".into(),
                author_email: "a@example.com".into(),
                committed_at: "2024-01-01T00:00:00Z".into(),
                message: "initial".into(),
                enrichment: None,
            },
            files: vec![CommitFile {
                commit_hash: hash.to_string(),
                file_path: path.to_string(),
                change_type: ChangeType::Added,
                additions: 10,
                deletions: 0,
                complexity: None,
            }],
        }
    }

    #[tokio::test]
    async fn insert_raw_is_idempotent_on_hash() {
        let store = Store::open_in_memory().await.unwrap();
        let record = sample_record("abc123", "src/app.ts");
        store.insert_raw(vec![record.clone()]).await.unwrap();
        store.insert_raw(vec![record]).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM commits").fetch_one(store.pool()).await.unwrap();
        assert_eq!(count, 1);
        let (file_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM commit_files").fetch_one(store.pool()).await.unwrap();
        assert_eq!(file_count, 1);
    }

    #[tokio::test]
    async fn resolve_prefix_distinguishes_unique_and_ambiguous() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_raw(vec![sample_record("abc1234aaa", "a.ts"), sample_record("abc1234bbb", "b.ts")])
            .await
            .unwrap();

        match store.resolve_prefix("abc1234", 50).await.unwrap() {
            ResolvePrefixOutcome::Ambiguous(hashes) => {
                assert_eq!(hashes.len(), 2);
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }

        match store.resolve_prefix("abc1234a", 50).await.unwrap() {
            ResolvePrefixOutcome::Unique(commit) => assert_eq!(commit.hash, "abc1234aaa"),
            other => panic!("expected unique, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_enrichment_batch_sets_triple() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert_raw(vec![sample_record("abc123", "a.ts")]).await.unwrap();
        store
            .update_enrichment_batch(vec![("abc123".into(), Classification::Feature, "summary".into())], "model-x")
            .await
            .unwrap();

        let unenriched = store.unenriched(None).await.unwrap();
        assert!(unenriched.is_empty());
    }

    #[tokio::test]
    async fn random_enriched_excludes_given_hashes() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_raw(vec![sample_record("h1", "a.ts"), sample_record("h2", "b.ts")])
            .await
            .unwrap();
        store
            .update_enrichment_batch(
                vec![
                    ("h1".into(), Classification::Feature, "s1".into()),
                    ("h2".into(), Classification::BugFix, "s2".into()),
                ],
                "model-x",
            )
            .await
            .unwrap();

        let mut exclude = HashSet::new();
        exclude.insert("h1".to_string());
        let sample = store.random_enriched_impl(10, &exclude, false).await.unwrap();
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].hash, "h2");
    }
}
