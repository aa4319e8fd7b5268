//! Full-text search over the `commits_fts` SQLite FTS5 virtual table that
//! lives in the same database `gitmem-db` manages.
//!
//! `commits_fts` mirrors `(hash, message, classification, summary)` for
//! every commit — enriched rows carry their real classification/summary,
//! unenriched rows carry empty strings so prefix-hash lookup elsewhere still
//! sees every commit. This crate only owns the mirroring and querying; the
//! source of truth is always the `commits` table in `gitmem-db`.

mod indexer;
mod query;
mod types;

pub use query::search_with_scope;
pub use types::SearchHit;

use gitmem_core::error::GitmemError;
use gitmem_db::Store;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("invalid search query: {query}")]
    InvalidQuery { query: String },
}

impl From<SearchError> for GitmemError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidQuery { query } => GitmemError::InvalidSearchQuery { query },
            other => GitmemError::Io(std::io::Error::new(std::io::ErrorKind::Other, other.to_string())),
        }
    }
}

pub type SearchResult<T> = Result<T, SearchError>;

/// The full-text index, a thin handle over the store's `SqlitePool`. Local
/// to this crate so it (not `gitmem_db::Store`) is the type the
/// `SearchIndexer` trait is implemented against — `Store` is a foreign type
/// from this crate's perspective, so the orphan rule requires a local
/// wrapper rather than an `impl SearchIndexer for Store` here.
pub struct SearchIndex<'a> {
    store: &'a Store,
}

impl<'a> SearchIndex<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn pool(&self) -> &sqlx::SqlitePool {
        self.store.pool()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmem_core::git::CommitRecord;
    use gitmem_core::ports::CommitStore;
    use gitmem_types::{ChangeType, Commit, CommitFile};

    pub(crate) async fn store_with_commit(hash: &str, message: &str) -> Store {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_raw(vec![CommitRecord {
                commit: Commit {
                    hash: hash.to_string(),
                    author_name: "Alice".into(),
                    author_email: "alice@example.com".into(),
                    committed_at: "2024-01-01T00:00:00Z".into(),
                    message: message.to_string(),
                    enrichment: None,
                },
                files: vec![CommitFile {
                    commit_hash: hash.to_string(),
                    file_path: "src/app.ts".into(),
                    change_type: ChangeType::Modified,
                    additions: 1,
                    deletions: 0,
                    complexity: None,
                }],
            }])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn open_in_memory_store_has_fts_table() {
        let store = store_with_commit("h1", "fix bug").await;
        let index = SearchIndex::new(&store);
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM commits_fts")
            .fetch_one(index.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
