//! Drives an enrichment run end-to-end, in either interactive or batch mode.

use std::collections::HashMap;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use gitmem_types::{BatchJob, BatchJobType, BatchStatus, Classification, Commit};

use crate::error::GitmemError;
use crate::git::GitAdapter;
use crate::measurer::Measurer;
use crate::model::batch_client::{chunk_requests, BatchModelClient, BatchRequestItem};
use crate::model::classifier::{ClassifierClient, ClassifyRequest, FileChangeSummary};
use crate::ports::{AggregateStore, BatchJobStore, CommitStore, SearchIndexer};
use crate::progress::{Phase, Progress};

/// Diffs are truncated to this many characters before being sent to the
/// model; the git adapter applies the fair per-file allocation within it.
const DIFF_MAX_CHARS: usize = 8_000;

/// Enrichment writes are flushed to the store in groups of roughly this
/// size so a long interactive run doesn't hold one giant transaction open
/// nor issue one transaction per commit.
const ENRICH_WRITE_BATCH_SIZE: usize = 50;

/// Default worker-pool width for interactive enrichment.
pub const DEFAULT_CONCURRENCY: usize = 4;

const ENRICH_SYSTEM_PROMPT: &str = "\
You are classifying a single git commit. Read the commit message, the list \
of changed files, and the unified diff. Respond with a JSON object of the \
exact shape {\"classification\": <one of bug-fix|feature|refactor|docs|chore|perf|test|style>, \
\"summary\": <a 1-2 sentence natural-language summary of the change>}. \
Do not include any other text.";

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichOutcome {
    Submitted {
        batch_id: String,
    },
    InProgress {
        batch_id: String,
        status: BatchStatus,
    },
    Complete {
        enriched_this_run: usize,
    },
}

pub struct Enricher<'a> {
    pub git: &'a dyn GitAdapter,
    pub commits: &'a dyn CommitStore,
    pub aggregator: &'a dyn AggregateStore,
    pub search: &'a dyn SearchIndexer,
    pub batch_jobs: &'a dyn BatchJobStore,
    pub classifier: &'a dyn ClassifierClient,
    pub batch_model: &'a dyn BatchModelClient,
    pub branch: String,
    pub index_start_date: Option<String>,
    pub model_identifier: String,
}

impl<'a> Enricher<'a> {
    /// Shared discovery + measurement phase. Returns the hashes of commits
    /// newly inserted this run (not necessarily all still unenriched).
    async fn discover(
        &self,
        on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<Vec<String>, GitmemError> {
        on_progress(Progress::phase(Phase::Discovering, 0, 0));

        let all_hashes = self.git.commit_hashes(&self.branch).await?;
        let indexed = self.commits.indexed_hashes().await?;
        let new_hashes: Vec<String> = all_hashes.into_iter().filter(|h| !indexed.contains(h)).collect();
        if new_hashes.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.git.commit_info_batch(&new_hashes).await?;
        let records: Vec<_> = match &self.index_start_date {
            Some(cutoff) => records
                .into_iter()
                .filter(|r| r.commit.committed_at.as_str() >= cutoff.as_str())
                .collect(),
            None => records,
        };
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let inserted_hashes: Vec<String> = records.iter().map(|r| r.commit.hash.clone()).collect();
        self.commits.insert_raw(records).await?;

        on_progress(Progress::phase(Phase::Measuring, 0, inserted_hashes.len()));
        let measurer = Measurer::default();
        let total = inserted_hashes.len();
        measurer
            .measure_all(self.git, self.commits, |done, _chunk| {
                on_progress(Progress::phase(Phase::Measuring, done, total));
            })
            .await?;

        Ok(inserted_hashes)
    }

    async fn finalize(&self, newly_enriched: &[String]) -> Result<(), GitmemError> {
        self.aggregator.rebuild().await?;
        self.search.index_new_commits(newly_enriched).await?;
        let now = Utc::now().to_rfc3339();
        self.commits.write_metadata("last_run", &now).await?;
        self.commits.write_metadata("model_used", &self.model_identifier).await?;
        Ok(())
    }

    fn build_request(
        commit: &Commit,
        files: &[gitmem_types::CommitFile],
        diff: String,
    ) -> ClassifyRequest {
        ClassifyRequest {
            commit_message: commit.message.clone(),
            files: files
                .iter()
                .map(|f| FileChangeSummary {
                    path: f.file_path.clone(),
                    change_type: f.change_type,
                    additions: f.additions,
                    deletions: f.deletions,
                })
                .collect(),
            diff,
        }
    }

    /// Worker pool of width `concurrency` issuing classifier calls, with a
    /// batched writer flushing every `ENRICH_WRITE_BATCH_SIZE` completions.
    /// Failed classifications are logged and dropped from this run; the
    /// pipeline continues.
    pub async fn run_interactive(
        &self,
        concurrency: usize,
        mut on_progress: impl FnMut(Progress) + Send,
    ) -> Result<EnrichOutcome, GitmemError> {
        self.discover(&mut on_progress).await?;

        let unenriched = self.commits.unenriched(self.index_start_date.as_deref()).await?;
        let total = unenriched.len();
        if total == 0 {
            return Ok(EnrichOutcome::Complete { enriched_this_run: 0 });
        }

        let hashes: Vec<String> = unenriched.iter().map(|c| c.hash.clone()).collect();
        let diffs = self.git.diff_batch(&hashes, DIFF_MAX_CHARS).await?;
        let files_by_hash = self.commits.files_by_hashes(&hashes).await?;
        let by_hash: HashMap<String, &Commit> = unenriched.iter().map(|c| (c.hash.clone(), c)).collect();

        let concurrency = concurrency.max(1);
        let mut completed = 0usize;
        let mut enriched_hashes = Vec::new();
        let mut pending_writes: Vec<(String, Classification, String)> = Vec::new();

        let mut results = stream::iter(hashes.iter().cloned())
            .map(|hash| {
                let commit = by_hash.get(&hash).copied();
                let diff = diffs.get(&hash).cloned().unwrap_or_default();
                let files = files_by_hash.get(&hash).cloned().unwrap_or_default();
                async move {
                    let Some(commit) = commit else {
                        return (hash, None);
                    };
                    let request = Self::build_request(commit, &files, diff);
                    match self.classifier.classify(request).await {
                        Ok(resp) => (hash, Some(resp)),
                        Err(err) => {
                            tracing::warn!(hash = %hash, error = %err, "classification failed, dropping commit from this run");
                            (hash, None)
                        }
                    }
                }
            })
            .buffer_unordered(concurrency);

        while let Some((hash, outcome)) = results.next().await {
            completed += 1;
            on_progress(Progress::phase(Phase::Enriching, completed, total).with_hash(hash.clone()));

            if let Some(resp) = outcome {
                pending_writes.push((hash.clone(), resp.classification, resp.summary));
                enriched_hashes.push(hash);
            }

            if pending_writes.len() >= ENRICH_WRITE_BATCH_SIZE {
                let batch = std::mem::take(&mut pending_writes);
                self.commits.update_enrichment_batch(batch, &self.model_identifier).await?;
            }
        }
        if !pending_writes.is_empty() {
            self.commits.update_enrichment_batch(pending_writes, &self.model_identifier).await?;
        }

        self.finalize(&enriched_hashes).await?;
        Ok(EnrichOutcome::Complete {
            enriched_this_run: enriched_hashes.len(),
        })
    }

    /// Inspects the batch registry and advances exactly one step: submit,
    /// poll, or import results — matching the three terminal return shapes
    /// in `EnrichOutcome`.
    pub async fn run_batch(
        &self,
        mut on_progress: impl FnMut(Progress) + Send,
    ) -> Result<EnrichOutcome, GitmemError> {
        self.discover(&mut on_progress).await?;

        if let Some(pending) = self.batch_jobs.get_pending(BatchJobType::Index).await? {
            let counts = self.batch_model.status(&pending.batch_id).await?;
            on_progress(
                Progress::phase(Phase::Enriching, (counts.succeeded + counts.failed) as usize, counts.total as usize)
                    .with_batch(pending.batch_id.clone(), counts.status),
            );

            if counts.status != BatchStatus::Ended {
                self.batch_jobs
                    .update_status(&pending.batch_id, counts.status, counts.succeeded, counts.failed, None)
                    .await?;
                return Ok(EnrichOutcome::InProgress {
                    batch_id: pending.batch_id,
                    status: counts.status,
                });
            }

            let results = self.batch_model.results(&pending.batch_id).await?;
            let mut writes = Vec::new();
            for item in results {
                match item.outcome {
                    crate::model::batch_client::ResultOutcome::Success(text) => {
                        let parsed = crate::model::classifier::parse_classify_response(&text);
                        writes.push((item.correlation_id, parsed.classification, parsed.summary));
                    }
                    crate::model::batch_client::ResultOutcome::Failure(reason) => {
                        tracing::warn!(hash = %item.correlation_id, reason = %reason, "batch item failed, dropping from this run");
                    }
                }
            }
            let enriched_hashes: Vec<String> = writes.iter().map(|(h, _, _)| h.clone()).collect();
            if !writes.is_empty() {
                self.commits.update_enrichment_batch(writes, &self.model_identifier).await?;
            }

            let now = Utc::now().to_rfc3339();
            self.batch_jobs
                .update_status(&pending.batch_id, BatchStatus::Ended, counts.succeeded, counts.failed, Some(now))
                .await?;

            self.finalize(&enriched_hashes).await?;
            return Ok(EnrichOutcome::Complete {
                enriched_this_run: enriched_hashes.len(),
            });
        }

        let unenriched = self.commits.unenriched(self.index_start_date.as_deref()).await?;
        if unenriched.is_empty() {
            return Ok(EnrichOutcome::Complete { enriched_this_run: 0 });
        }

        let hashes: Vec<String> = unenriched.iter().map(|c| c.hash.clone()).collect();
        let diffs = self.git.diff_batch(&hashes, DIFF_MAX_CHARS).await?;
        let files_by_hash = self.commits.files_by_hashes(&hashes).await?;

        let requests: Vec<BatchRequestItem> = unenriched
            .iter()
            .map(|c| {
                let diff = diffs.get(&c.hash).cloned().unwrap_or_default();
                let files = files_by_hash.get(&c.hash).cloned().unwrap_or_default();
                let request = Self::build_request(c, &files, diff);
                BatchRequestItem {
                    correlation_id: c.hash.clone(),
                    system_prompt: ENRICH_SYSTEM_PROMPT.to_string(),
                    user_message: request.to_user_message(),
                }
            })
            .collect();

        let chunks = chunk_requests(requests);
        let mut first_batch_id = None;
        let now = Utc::now().to_rfc3339();
        for chunk in chunks {
            let outcome = self.batch_model.submit(chunk).await?;
            self.batch_jobs
                .insert(BatchJob {
                    batch_id: outcome.batch_id.clone(),
                    job_type: BatchJobType::Index,
                    status: BatchStatus::Submitted,
                    request_count: outcome.request_count as i64,
                    succeeded_count: 0,
                    failed_count: 0,
                    submitted_at: now.clone(),
                    completed_at: None,
                    model_used: self.model_identifier.clone(),
                })
                .await?;
            first_batch_id.get_or_insert_with(|| outcome.batch_id.clone());
        }

        let batch_id = first_batch_id.expect("non-empty unenriched set always produces at least one chunk");
        on_progress(Progress::phase(Phase::Enriching, 0, hashes.len()).with_batch(batch_id.clone(), BatchStatus::Submitted));
        Ok(EnrichOutcome::Submitted { batch_id })
    }
}
