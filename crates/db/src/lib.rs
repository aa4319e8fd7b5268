//! The embedded SQL store: connection management, schema migrations, and
//! the trait implementations (`CommitStore`, `AggregateStore`,
//! `BatchJobStore`, `EvalCommitSource`) that `gitmem-core`'s orchestration
//! layer is written against.
//!
//! The concurrency guard (the `.gitmem/index.lock` exclusive-create lock)
//! lives in `gitmem_core::workspace::Workspace`, not here — this crate only
//! owns the database file itself. Callers acquire the lock before calling
//! any write path on `Store`.

mod aggregator;
mod batch_jobs;
mod commits;
mod hotspots;
mod migrations;
mod row_types;
mod trends;

pub use aggregator::Aggregator;
pub use hotspots::{HotspotEntry, HotspotRank};
pub use row_types::ResolvePrefixOutcome;
pub use trends::{compute_trend, TrendDirection, TrendPeriod, TrendSummary, TrendWindow};

use std::path::Path;
use std::str::FromStr;

use gitmem_core::error::GitmemError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("failed to create workspace directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

/// `StoreError` is local to this crate; `GitmemError` is not, but the
/// orphan rule permits this impl because the generic parameter is local.
impl From<StoreError> for GitmemError {
    fn from(err: StoreError) -> Self {
        GitmemError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The single embedded database handle. `Store` is `Clone` (the underlying
/// `SqlitePool` is a cheap handle), but per §5 only one process should hold
/// the write lock at a time — `Store` itself does not enforce that; the
/// workspace lock file does.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if missing) the database at `path`, enabling WAL
    /// journaling, and runs all pending migrations.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON")
            .busy_timeout(std::time::Duration::from_secs(30))
            .log_slow_statements(tracing::log::LevelFilter::Warn, std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// An in-memory database for tests. `shared_cache` keeps every pooled
    /// connection looking at the same database, the same trick the teacher
    /// uses for its own in-memory test handle.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .pragma("foreign_keys", "ON")
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Idempotent migration routine: tracks applied versions in
    /// `_migrations` so `ALTER TABLE ADD COLUMN` statements run exactly
    /// once, while `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT
    /// EXISTS` remain safe to see re-applied by an older tracking row. A
    /// concurrent reader observes either a fully-applied migration or none
    /// of it, never a column half-added, because each statement commits on
    /// its own and `IF NOT EXISTS` guards make every statement idempotent.
    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let (current_version,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i64;
            if version <= current_version {
                continue;
            }
            match sqlx::raw_sql(migration).execute(&self.pool).await {
                Ok(_) => {}
                Err(e) if e.to_string().contains("duplicate column name") => {}
                Err(e) => return Err(e.into()),
            }
            sqlx::query("INSERT INTO _migrations (version) VALUES (?1)")
                .bind(version)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_and_creates_schema() {
        let store = Store::open_in_memory().await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM commits")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn migrations_are_idempotent_across_opens() {
        let store = Store::open_in_memory().await.unwrap();
        store.run_migrations().await.unwrap();
        store.run_migrations().await.unwrap();
    }
}
