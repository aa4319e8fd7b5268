//! Keeps `commits_fts` in sync with enrichment state: insert/replace one
//! commit, insert a batch of newly-enriched hashes (chunked at 500, the same
//! bound-parameter ceiling `gitmem-db`'s commit repository chunks at), and a
//! full truncate-then-repopulate rebuild.

use async_trait::async_trait;
use gitmem_core::error::GitmemError;
use gitmem_core::ports::SearchIndexer;
use sqlx::Row;

use crate::{SearchError, SearchIndex, SearchResult};

/// Matches the chunking ceiling used throughout `gitmem-db` for bound
/// parameters.
const CHUNK_SIZE: usize = 500;

impl<'a> SearchIndex<'a> {
    /// Inserts or replaces the FTS row for one commit, reading its current
    /// `commits` row. A no-op if the hash doesn't exist.
    pub async fn index_commit(&self, hash: &str) -> SearchResult<()> {
        let row = sqlx::query("SELECT hash, message, classification, summary FROM commits WHERE hash = ?1")
            .bind(hash)
            .fetch_optional(self.pool())
            .await?;
        let Some(row) = row else { return Ok(()) };
        self.upsert_row(&row).await
    }

    /// Inserts FTS rows for the given hashes, chunked. Called by the
    /// enricher's finalization step with the hashes it just enriched.
    pub async fn index_new_commits_impl(&self, hashes: &[String]) -> SearchResult<()> {
        if hashes.is_empty() {
            return Ok(());
        }
        for chunk in hashes.chunks(CHUNK_SIZE) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let query = format!(
                "SELECT hash, message, classification, summary FROM commits WHERE hash IN ({placeholders})"
            );
            let mut q = sqlx::query(&query);
            for h in chunk {
                q = q.bind(h);
            }
            let rows = q.fetch_all(self.pool()).await?;
            for row in &rows {
                self.upsert_row(row).await?;
            }
        }
        Ok(())
    }

    async fn upsert_row(&self, row: &sqlx::sqlite::SqliteRow) -> SearchResult<()> {
        let hash: String = row.try_get("hash")?;
        let message: String = row.try_get("message")?;
        let classification: Option<String> = row.try_get("classification")?;
        let summary: Option<String> = row.try_get("summary")?;

        sqlx::query("DELETE FROM commits_fts WHERE hash = ?1").bind(&hash).execute(self.pool()).await?;
        sqlx::query(
            "INSERT INTO commits_fts (hash, message, classification, summary) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&hash)
        .bind(&message)
        .bind(classification.unwrap_or_default())
        .bind(summary.unwrap_or_default())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Truncates and repopulates the full index from every commit row.
    /// Enriched commits get their real classification/summary; unenriched
    /// ones get empty strings so a prefix-hash lookup still resolves them
    /// through the FTS table's `hash` column.
    pub async fn rebuild_index(&self) -> SearchResult<()> {
        let mut tx = self.pool().begin().await.map_err(SearchError::from)?;
        sqlx::query("DELETE FROM commits_fts").execute(&mut *tx).await?;
        sqlx::query(
            "INSERT INTO commits_fts (hash, message, classification, summary) \
             SELECT hash, message, COALESCE(classification, ''), COALESCE(summary, '') FROM commits",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl<'a> SearchIndexer for SearchIndex<'a> {
    async fn index_new_commits(&self, hashes: &[String]) -> Result<(), GitmemError> {
        self.index_new_commits_impl(hashes).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::store_with_commit;

    #[tokio::test]
    async fn index_commit_mirrors_unenriched_row_with_empty_strings() {
        let store = store_with_commit("h1", "fix bug").await;
        let index = SearchIndex::new(&store);
        index.index_commit("h1").await.unwrap();

        let row = sqlx::query("SELECT message, classification, summary FROM commits_fts WHERE hash = 'h1'")
            .fetch_one(index.pool())
            .await
            .unwrap();
        let message: String = row.try_get("message").unwrap();
        let classification: String = row.try_get("classification").unwrap();
        assert_eq!(message, "fix bug");
        assert_eq!(classification, "");
    }

    #[tokio::test]
    async fn index_commit_is_replace_not_duplicate() {
        let store = store_with_commit("h1", "fix bug").await;
        let index = SearchIndex::new(&store);
        index.index_commit("h1").await.unwrap();
        index.index_commit("h1").await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM commits_fts WHERE hash = 'h1'")
            .fetch_one(index.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn rebuild_index_covers_every_commit_including_unenriched() {
        let store = store_with_commit("h1", "fix bug").await;
        let index = SearchIndex::new(&store);
        index.rebuild_index().await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM commits_fts")
            .fetch_one(index.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn index_new_commits_chunks_large_hash_lists() {
        use gitmem_core::git::CommitRecord;
        use gitmem_core::ports::CommitStore;
        use gitmem_types::{ChangeType, Commit, CommitFile};

        let store = gitmem_db::Store::open_in_memory().await.unwrap();
        let mut hashes = Vec::new();
        let mut records = Vec::new();
        for i in 0..600 {
            let hash = format!("h{i:04}");
            records.push(CommitRecord {
                commit: Commit {
                    hash: hash.clone(),
                    author_name: "A".into(),
                    author_email: "a@example.com".into(),
                    committed_at: "2024-01-01T00:00:00Z".into(),
                    message: format!("commit {i}"),
                    enrichment: None,
                },
                files: vec![CommitFile {
                    commit_hash: hash.clone(),
                    file_path: "a.ts".into(),
                    change_type: ChangeType::Modified,
                    additions: 1,
                    deletions: 0,
                    complexity: None,
                }],
            });
            hashes.push(hash);
        }
        store.insert_raw(records).await.unwrap();

        let index = SearchIndex::new(&store);
        index.index_new_commits_impl(&hashes).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM commits_fts")
            .fetch_one(index.pool())
            .await
            .unwrap();
        assert_eq!(count, 600);
    }
}
