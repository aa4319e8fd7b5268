//! Trait seams the enricher, judge, and measurer are written against. The
//! `gitmem-db` and `gitmem-search` crates depend on `gitmem-core` (for its
//! domain types and orchestration), so the orchestration logic here cannot
//! depend back on them — instead it depends on these traits, which `db` and
//! `search` implement against their concrete storage.

use async_trait::async_trait;
use gitmem_types::{BatchJob, BatchJobType, BatchStatus, CheckBatchItem, Classification, Commit, CommitFile};

use crate::error::GitmemError;
use crate::git::CommitRecord;

/// Everything the enricher/judge/measurer need from the commit and
/// commit-file tables.
#[async_trait]
pub trait CommitStore: Send + Sync {
    async fn insert_raw(&self, records: Vec<CommitRecord>) -> Result<(), GitmemError>;
    async fn indexed_hashes(&self) -> Result<std::collections::HashSet<String>, GitmemError>;
    async fn unenriched(&self, since: Option<&str>) -> Result<Vec<Commit>, GitmemError>;
    async fn update_enrichment_batch(
        &self,
        items: Vec<(String, Classification, String)>,
        model: &str,
    ) -> Result<(), GitmemError>;
    async fn commit_files_missing_complexity(&self, limit: usize) -> Result<Vec<CommitFile>, GitmemError>;
    async fn update_complexity_batch(&self, items: Vec<CommitFile>) -> Result<(), GitmemError>;
    async fn write_metadata(&self, key: &str, value: &str) -> Result<(), GitmemError>;
    async fn files_by_hashes(
        &self,
        hashes: &[String],
    ) -> Result<std::collections::HashMap<String, Vec<CommitFile>>, GitmemError>;
}

/// The aggregator's single destructive-then-repopulate entry point.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    async fn rebuild(&self) -> Result<(), GitmemError>;
}

/// The subset of the search index the enricher drives directly.
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn index_new_commits(&self, hashes: &[String]) -> Result<(), GitmemError>;
}

/// Read access to enriched commits the judge samples from.
#[async_trait]
pub trait EvalCommitSource: Send + Sync {
    async fn get_enriched(&self, hash: &str) -> Result<Option<Commit>, GitmemError>;
    async fn random_enriched(
        &self,
        n: usize,
        exclude: &std::collections::HashSet<String>,
        exclude_template_merges: bool,
    ) -> Result<Vec<Commit>, GitmemError>;
}

/// The persistent batch job registry, covering both the `index` and `check`
/// job types and the `check`-only per-item side table.
#[async_trait]
pub trait BatchJobStore: Send + Sync {
    async fn get_pending(&self, job_type: BatchJobType) -> Result<Option<BatchJob>, GitmemError>;
    async fn insert(&self, job: BatchJob) -> Result<(), GitmemError>;
    async fn update_status(
        &self,
        batch_id: &str,
        status: BatchStatus,
        succeeded_count: i64,
        failed_count: i64,
        completed_at: Option<String>,
    ) -> Result<(), GitmemError>;
    async fn insert_check_items(&self, items: Vec<CheckBatchItem>) -> Result<(), GitmemError>;
    async fn get_check_items(&self, batch_id: &str) -> Result<Vec<CheckBatchItem>, GitmemError>;
}
