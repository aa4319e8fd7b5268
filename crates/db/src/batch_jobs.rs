//! The batch job registry (`batch_jobs`) and the `check`-only per-item side
//! table (`check_batch_items`).

use async_trait::async_trait;
use gitmem_core::error::GitmemError;
use gitmem_core::ports::BatchJobStore;
use gitmem_types::{BatchJob, BatchJobType, BatchStatus, CheckBatchItem, Classification};
use sqlx::Row;

use crate::{Store, StoreError};

fn batch_job_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BatchJob, StoreError> {
    let job_type: String = row.try_get("type")?;
    let status: String = row.try_get("status")?;
    Ok(BatchJob {
        batch_id: row.try_get("batch_id")?,
        job_type: BatchJobType::parse(&job_type).unwrap_or(BatchJobType::Index),
        status: BatchStatus::parse(&status).unwrap_or(BatchStatus::Failed),
        request_count: row.try_get("request_count")?,
        succeeded_count: row.try_get("succeeded_count")?,
        failed_count: row.try_get("failed_count")?,
        submitted_at: row.try_get("submitted_at")?,
        completed_at: row.try_get("completed_at")?,
        model_used: row.try_get("model_used")?,
    })
}

fn check_batch_item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CheckBatchItem, StoreError> {
    let classification: String = row.try_get("classification")?;
    Ok(CheckBatchItem {
        batch_id: row.try_get("batch_id")?,
        commit_hash: row.try_get("hash")?,
        classification: Classification::parse_or_chore(&classification),
        summary: row.try_get("summary")?,
    })
}

#[async_trait]
impl BatchJobStore for Store {
    /// Most recent non-terminal job of the given type, if any — the
    /// enricher/judge only ever track one in-flight batch per facility.
    async fn get_pending(&self, job_type: BatchJobType) -> Result<Option<BatchJob>, GitmemError> {
        let row = sqlx::query(
            "SELECT * FROM batch_jobs WHERE type = ?1 AND status NOT IN ('ended', 'failed', 'canceled', 'expired') \
             ORDER BY submitted_at DESC LIMIT 1",
        )
        .bind(job_type.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(StoreError::from)?;

        row.as_ref().map(batch_job_from_row).transpose().map_err(Into::into)
    }

    async fn insert(&self, job: BatchJob) -> Result<(), GitmemError> {
        sqlx::query(
            "INSERT INTO batch_jobs \
             (batch_id, type, status, request_count, succeeded_count, failed_count, submitted_at, completed_at, model_used) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&job.batch_id)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(job.request_count)
        .bind(job.succeeded_count)
        .bind(job.failed_count)
        .bind(&job.submitted_at)
        .bind(&job.completed_at)
        .bind(&job.model_used)
        .execute(self.pool())
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn update_status(
        &self,
        batch_id: &str,
        status: BatchStatus,
        succeeded_count: i64,
        failed_count: i64,
        completed_at: Option<String>,
    ) -> Result<(), GitmemError> {
        sqlx::query(
            "UPDATE batch_jobs SET status = ?1, succeeded_count = ?2, failed_count = ?3, completed_at = ?4 \
             WHERE batch_id = ?5",
        )
        .bind(status.as_str())
        .bind(succeeded_count)
        .bind(failed_count)
        .bind(&completed_at)
        .bind(batch_id)
        .execute(self.pool())
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn insert_check_items(&self, items: Vec<CheckBatchItem>) -> Result<(), GitmemError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        for item in items {
            sqlx::query(
                "INSERT OR IGNORE INTO check_batch_items (batch_id, hash, classification, summary) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&item.batch_id)
            .bind(&item.commit_hash)
            .bind(item.classification.as_str())
            .bind(&item.summary)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        }
        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_check_items(&self, batch_id: &str) -> Result<Vec<CheckBatchItem>, GitmemError> {
        let rows = sqlx::query("SELECT * FROM check_batch_items WHERE batch_id = ?1")
            .bind(batch_id)
            .fetch_all(self.pool())
            .await
            .map_err(StoreError::from)?;
        rows.iter().map(|r| check_batch_item_from_row(r).map_err(Into::into)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job(batch_id: &str, status: BatchStatus) -> BatchJob {
        BatchJob {
            batch_id: batch_id.to_string(),
            job_type: BatchJobType::Index,
            status,
            request_count: 10,
            succeeded_count: 0,
            failed_count: 0,
            submitted_at: "2024-01-01T00:00:00Z".into(),
            completed_at: None,
            model_used: "model-x".into(),
        }
    }

    #[tokio::test]
    async fn get_pending_ignores_terminal_jobs() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert(sample_job("batch-1", BatchStatus::Ended)).await.unwrap();
        assert!(store.get_pending(BatchJobType::Index).await.unwrap().is_none());

        store.insert(sample_job("batch-2", BatchStatus::Submitted)).await.unwrap();
        let pending = store.get_pending(BatchJobType::Index).await.unwrap().unwrap();
        assert_eq!(pending.batch_id, "batch-2");
    }

    #[tokio::test]
    async fn update_status_persists_counts() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert(sample_job("batch-1", BatchStatus::Submitted)).await.unwrap();
        store
            .update_status(
                "batch-1",
                BatchStatus::Ended,
                48,
                2,
                Some("2024-01-02T00:00:00Z".into()),
            )
            .await
            .unwrap();

        let job = store.get_pending(BatchJobType::Index).await.unwrap();
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn check_items_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert(sample_job("batch-1", BatchStatus::Submitted)).await.unwrap();
        store
            .insert_check_items(vec![CheckBatchItem {
                batch_id: "batch-1".into(),
                commit_hash: "abc123".into(),
                classification: Classification::Feature,
                summary: "adds a thing".into(),
            }])
            .await
            .unwrap();

        let items = store.get_check_items("batch-1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].commit_hash, "abc123");
    }
}
