//! Evaluates existing (classification, summary) enrichments with a stronger
//! model, along the same interactive/batch duality as the enricher.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use gitmem_types::{
    BatchJob, BatchJobType, BatchStatus, CheckBatchItem, Classification, Commit, EvalResult, EvalSummary, Verdict,
};
use serde_json::Value;

use crate::error::GitmemError;
use crate::git::GitAdapter;
use crate::model::batch_client::{BatchModelClient, BatchRequestItem, ResultOutcome};
use crate::model::ModelError;
use crate::ports::{BatchJobStore, EvalCommitSource};
use crate::progress::{Phase, Progress};

const JUDGE_SYSTEM_PROMPT: &str = "\
You are evaluating a prior classification and summary assigned to a git \
commit. You are given the commit message, diff, the assigned classification, \
and the assigned summary. Judge three independent dimensions: whether the \
classification is correct, whether the summary is factually accurate, and \
whether the summary is complete. Respond with a JSON object of the shape \
{\"classification\": {\"pass\": bool, \"reasoning\": string, \"suggested_classification\"?: string}, \
\"accuracy\": {\"pass\": bool, \"reasoning\": string}, \
\"completeness\": {\"pass\": bool, \"reasoning\": string}}. Do not include any other text.";

const DIFF_MAX_CHARS: usize = 8_000;

#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub commit_message: String,
    pub diff: String,
    pub classification: Classification,
    pub summary: String,
}

impl JudgeRequest {
    pub fn to_user_message(&self) -> String {
        format!(
            "Commit message:\n{}\n\nAssigned classification: {}\nAssigned summary: {}\n\nDiff:\n{}",
            self.commit_message,
            self.classification.as_str(),
            self.summary,
            self.diff
        )
    }
}

#[derive(Debug, Clone)]
pub struct RawVerdicts {
    pub classification: Verdict,
    pub accuracy: Verdict,
    pub completeness: Verdict,
}

#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn evaluate(&self, request: JudgeRequest) -> Result<RawVerdicts, ModelError>;
}

pub struct HttpJudgeClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl HttpJudgeClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    content: Vec<ChatContentBlock>,
}

#[derive(serde::Deserialize)]
struct ChatContentBlock {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl JudgeClient for HttpJudgeClient {
    async fn evaluate(&self, request: JudgeRequest) -> Result<RawVerdicts, ModelError> {
        let user_message = request.to_user_message();
        let body = ChatRequest {
            model: &self.model,
            system: JUDGE_SYSTEM_PROMPT,
            messages: vec![ChatMessage {
                role: "user",
                content: &user_message,
            }],
            max_tokens: 1024,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::VendorError {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed.content.into_iter().map(|b| b.text).collect::<Vec<_>>().join("");
        Ok(parse_judge_response(&text))
    }
}

fn parse_verdict(value: Option<&Value>) -> Verdict {
    let Some(value) = value else {
        return Verdict {
            pass: false,
            reasoning: "no response".to_string(),
            suggested_classification: None,
        };
    };
    Verdict {
        pass: value.get("pass").and_then(Value::as_bool).unwrap_or(false),
        reasoning: value
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("no reasoning provided")
            .to_string(),
        suggested_classification: value
            .get("suggested_classification")
            .and_then(Value::as_str)
            .and_then(Classification::parse),
    }
}

/// Tolerant parser mirroring the classifier's: direct decode, then fenced or
/// brace-delimited extraction, with safe per-dimension defaults.
pub fn parse_judge_response(text: &str) -> RawVerdicts {
    let object = extract_json_object(text).unwrap_or_else(|| text.to_string());
    let value: Value = serde_json::from_str(&object).unwrap_or(Value::Null);

    RawVerdicts {
        classification: parse_verdict(value.get("classification")),
        accuracy: parse_verdict(value.get("accuracy")),
        completeness: parse_verdict(value.get("completeness")),
    }
}

fn extract_json_object(text: &str) -> Option<String> {
    let text = text.trim();
    if let Some(start) = text.find("```") {
        let after_fence = &text[start + 3..];
        let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim().to_string());
        }
    }
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (i, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
pub enum JudgeOutcome {
    Submitted {
        batch_id: String,
    },
    InProgress {
        batch_id: String,
        status: BatchStatus,
    },
    Complete {
        results: Vec<EvalResult>,
        summary: EvalSummary,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum EvalSelection<'a> {
    Single(&'a str),
    Sample { n: usize, exclude_template_merges: bool },
}

pub struct Judge<'a> {
    pub git: &'a dyn GitAdapter,
    pub commits: &'a dyn EvalCommitSource,
    pub batch_jobs: &'a dyn BatchJobStore,
    pub judge_client: &'a dyn JudgeClient,
    pub batch_model: &'a dyn BatchModelClient,
    pub model_identifier: String,
}

impl<'a> Judge<'a> {
    async fn select_commits(&self, selection: EvalSelection<'_>) -> Result<Vec<Commit>, GitmemError> {
        match selection {
            EvalSelection::Single(hash) => {
                let commit = self
                    .commits
                    .get_enriched(hash)
                    .await?
                    .ok_or_else(|| GitmemError::NotFound(hash.to_string()))?;
                Ok(vec![commit])
            }
            EvalSelection::Sample {
                n,
                exclude_template_merges,
            } => {
                self.commits
                    .random_enriched(n, &std::collections::HashSet::new(), exclude_template_merges)
                    .await
            }
        }
    }

    async fn evaluate_one(&self, commit: &Commit) -> Result<Option<EvalResult>, GitmemError> {
        let Some(enrichment) = &commit.enrichment else {
            return Ok(None);
        };
        let diffs = self.git.diff_batch(&[commit.hash.clone()], DIFF_MAX_CHARS).await?;
        let diff = diffs.get(&commit.hash).cloned().unwrap_or_default();

        let request = JudgeRequest {
            commit_message: commit.message.clone(),
            diff,
            classification: enrichment.classification,
            summary: enrichment.summary.clone(),
        };
        let raw = self.judge_client.evaluate(request).await?;

        Ok(Some(reconcile(commit.hash.clone(), enrichment.classification, enrichment.summary.clone(), raw)))
    }

    pub async fn run_interactive(
        &self,
        selection: EvalSelection<'_>,
        mut on_progress: impl FnMut(Progress) + Send,
    ) -> Result<JudgeOutcome, GitmemError> {
        let commits = self.select_commits(selection).await?;
        let total = commits.len();
        let mut results = Vec::with_capacity(total);

        for (i, commit) in commits.iter().enumerate() {
            on_progress(Progress::phase(Phase::Enriching, i, total).with_hash(commit.hash.clone()));
            match self.evaluate_one(commit).await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(hash = %commit.hash, error = %err, "judge evaluation failed, dropping from this run");
                }
            }
        }

        let summary = EvalSummary::from_results(&results);
        Ok(JudgeOutcome::Complete { results, summary })
    }

    pub async fn run_batch(
        &self,
        selection: EvalSelection<'_>,
        mut on_progress: impl FnMut(Progress) + Send,
    ) -> Result<JudgeOutcome, GitmemError> {
        if let Some(pending) = self.batch_jobs.get_pending(BatchJobType::Check).await? {
            let counts = self.batch_model.status(&pending.batch_id).await?;
            on_progress(
                Progress::phase(Phase::Enriching, (counts.succeeded + counts.failed) as usize, counts.total as usize)
                    .with_batch(pending.batch_id.clone(), counts.status),
            );

            if counts.status != BatchStatus::Ended {
                self.batch_jobs
                    .update_status(&pending.batch_id, counts.status, counts.succeeded, counts.failed, None)
                    .await?;
                return Ok(JudgeOutcome::InProgress {
                    batch_id: pending.batch_id,
                    status: counts.status,
                });
            }

            let items = self.batch_jobs.get_check_items(&pending.batch_id).await?;
            let by_hash: std::collections::HashMap<String, &CheckBatchItem> =
                items.iter().map(|i| (i.commit_hash.clone(), i)).collect();

            let results_raw = self.batch_model.results(&pending.batch_id).await?;
            let mut results = Vec::new();
            for item in results_raw {
                let Some(check_item) = by_hash.get(&item.correlation_id) else {
                    continue;
                };
                match item.outcome {
                    ResultOutcome::Success(text) => {
                        let raw = parse_judge_response(&text);
                        results.push(reconcile(
                            check_item.commit_hash.clone(),
                            check_item.classification,
                            check_item.summary.clone(),
                            raw,
                        ));
                    }
                    ResultOutcome::Failure(reason) => {
                        tracing::warn!(hash = %item.correlation_id, reason = %reason, "judge batch item failed");
                    }
                }
            }

            let now = Utc::now().to_rfc3339();
            self.batch_jobs
                .update_status(&pending.batch_id, BatchStatus::Ended, counts.succeeded, counts.failed, Some(now))
                .await?;

            let summary = EvalSummary::from_results(&results);
            return Ok(JudgeOutcome::Complete { results, summary });
        }

        let commits = self.select_commits(selection).await?;
        if commits.is_empty() {
            return Ok(JudgeOutcome::Complete {
                results: Vec::new(),
                summary: EvalSummary::default(),
            });
        }

        let hashes: Vec<String> = commits.iter().map(|c| c.hash.clone()).collect();
        let diffs = self.git.diff_batch(&hashes, DIFF_MAX_CHARS).await?;

        let mut requests = Vec::with_capacity(commits.len());
        let mut check_items = Vec::with_capacity(commits.len());
        for commit in &commits {
            let Some(enrichment) = &commit.enrichment else {
                continue;
            };
            let diff = diffs.get(&commit.hash).cloned().unwrap_or_default();
            let request = JudgeRequest {
                commit_message: commit.message.clone(),
                diff,
                classification: enrichment.classification,
                summary: enrichment.summary.clone(),
            };
            requests.push(BatchRequestItem {
                correlation_id: commit.hash.clone(),
                system_prompt: JUDGE_SYSTEM_PROMPT.to_string(),
                user_message: request.to_user_message(),
            });
            check_items.push(CheckBatchItem {
                batch_id: String::new(), // filled in once the batch id is known
                commit_hash: commit.hash.clone(),
                classification: enrichment.classification,
                summary: enrichment.summary.clone(),
            });
        }

        let outcome = self.batch_model.submit(requests).await?;
        let check_items: Vec<CheckBatchItem> = check_items
            .into_iter()
            .map(|mut i| {
                i.batch_id = outcome.batch_id.clone();
                i
            })
            .collect();

        let now = Utc::now().to_rfc3339();
        self.batch_jobs
            .insert(BatchJob {
                batch_id: outcome.batch_id.clone(),
                job_type: BatchJobType::Check,
                status: BatchStatus::Submitted,
                request_count: outcome.request_count as i64,
                succeeded_count: 0,
                failed_count: 0,
                submitted_at: now,
                completed_at: None,
                model_used: self.model_identifier.clone(),
            })
            .await?;
        self.batch_jobs.insert_check_items(check_items).await?;

        on_progress(
            Progress::phase(Phase::Enriching, 0, commits.len())
                .with_batch(outcome.batch_id.clone(), BatchStatus::Submitted),
        );
        Ok(JudgeOutcome::Submitted {
            batch_id: outcome.batch_id,
        })
    }
}

/// The on-disk dump written when a judge run is invoked with an output path:
/// `check-<timestamp>.json` beside the workspace, per the external contract.
#[derive(serde::Serialize)]
struct CheckOutputFile<'a> {
    results: &'a [EvalResult],
    summary: &'a EvalSummary,
}

/// Returns the conventional filename for a check dump taken at `timestamp`
/// (caller supplies it, typically `Utc::now()` formatted as it sees fit —
/// this module does not stamp times itself, matching the rest of the crate).
pub fn check_output_filename(timestamp: &str) -> String {
    format!("check-{timestamp}.json")
}

/// Writes a judge run's results and summary to `path` as a single JSON
/// object. Called by consumers that passed an output path into the run.
pub fn write_check_output(path: &Path, results: &[EvalResult], summary: &EvalSummary) -> Result<(), GitmemError> {
    let body = CheckOutputFile { results, summary };
    let json = serde_json::to_string_pretty(&body)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, json)?;
    Ok(())
}

fn reconcile(hash: String, classification: Classification, summary: String, raw: RawVerdicts) -> EvalResult {
    EvalResult {
        commit_hash: hash,
        classification,
        summary,
        classification_verdict: raw.classification,
        accuracy_verdict: raw.accuracy,
        completeness_verdict: raw.completeness,
    }
    .reconciled()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_output_filename_follows_convention() {
        assert_eq!(check_output_filename("20240601T000000Z"), "check-20240601T000000Z.json");
    }

    #[test]
    fn write_check_output_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check-test.json");
        let result = reconcile(
            "abc".into(),
            Classification::Feature,
            "did a thing".into(),
            RawVerdicts {
                classification: Verdict { pass: true, reasoning: "ok".into(), suggested_classification: None },
                accuracy: Verdict { pass: true, reasoning: "ok".into(), suggested_classification: None },
                completeness: Verdict { pass: true, reasoning: "ok".into(), suggested_classification: None },
            },
        );
        let summary = EvalSummary::from_results(std::slice::from_ref(&result));
        write_check_output(&path, std::slice::from_ref(&result), &summary).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["summary"]["total"], 1);
        assert_eq!(parsed["results"][0]["commit_hash"], "abc");
    }

    #[test]
    fn parses_judge_response_with_suggestion() {
        let text = r#"{"classification": {"pass": false, "reasoning": "Should be feature", "suggested_classification": "feature"}, "accuracy": {"pass": true, "reasoning": "ok"}, "completeness": {"pass": true, "reasoning": "ok"}}"#;
        let raw = parse_judge_response(text);
        assert!(!raw.classification.pass);
        assert_eq!(raw.classification.suggested_classification, Some(Classification::Feature));
    }

    #[test]
    fn missing_dimension_defaults_to_fail_with_reason() {
        let raw = parse_judge_response("{}");
        assert!(!raw.classification.pass);
        assert_eq!(raw.classification.reasoning, "no response");
    }

    #[test]
    fn reconcile_flips_self_contradicting_verdict() {
        let raw = RawVerdicts {
            classification: Verdict {
                pass: false,
                reasoning: "Should be feature".into(),
                suggested_classification: Some(Classification::Feature),
            },
            accuracy: Verdict {
                pass: true,
                reasoning: "ok".into(),
                suggested_classification: None,
            },
            completeness: Verdict {
                pass: true,
                reasoning: "ok".into(),
                suggested_classification: None,
            },
        };
        let result = reconcile("abc".into(), Classification::Feature, "s".into(), raw);
        assert!(result.classification_verdict.pass);
        assert_eq!(result.classification_verdict.suggested_classification, None);
    }

    #[tokio::test]
    async fn evaluate_parses_a_mocked_vendor_response() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "{\"classification\": {\"pass\": true, \"reasoning\": \"ok\"}, \"accuracy\": {\"pass\": true, \"reasoning\": \"ok\"}, \"completeness\": {\"pass\": false, \"reasoning\": \"missing detail\"}}"}]
            })))
            .mount(&server)
            .await;

        let client = HttpJudgeClient::new("test-key", "claude-test").with_endpoint(server.uri());
        let raw = client
            .evaluate(JudgeRequest {
                commit_message: "fix bug".into(),
                diff: "diff".into(),
                classification: Classification::BugFix,
                summary: "Fixed bug".into(),
            })
            .await
            .unwrap();
        assert!(raw.classification.pass);
        assert!(!raw.completeness.pass);
    }
}
