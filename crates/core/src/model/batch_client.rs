//! Asynchronous batch submission/status/results against the vendor's batch
//! facility. Used by both the enricher (index batches) and the judge (check
//! batches); only the prompt content differs between the two callers.

use async_trait::async_trait;
use gitmem_types::BatchStatus;
use serde::{Deserialize, Serialize};

use super::ModelError;

/// Vendor batch submission ceilings are typically in the tens of thousands;
/// we chunk conservatively below any of them so one logical `run_batch` call
/// can still emit more than one physical submission (and thus more than one
/// `Batch job` row) for very large unenriched sets.
pub const MAX_ITEMS_PER_SUBMISSION: usize = 10_000;

#[derive(Debug, Clone)]
pub struct BatchRequestItem {
    pub correlation_id: String,
    pub system_prompt: String,
    pub user_message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub batch_id: String,
    pub request_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub status: BatchStatus,
    pub succeeded: i64,
    pub failed: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultOutcome {
    Success(String),
    Failure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResultItem {
    pub correlation_id: String,
    pub outcome: ResultOutcome,
}

/// Splits a request list into submission-sized chunks, preserving order.
/// Plain fixed-size chunking (rather than a token-aware bin pack) is
/// sufficient here because the vendor limit is a hard item count, not a
/// token budget — unlike the diff-truncation problem, there's no payload
/// size to balance across chunks.
pub fn chunk_requests(items: Vec<BatchRequestItem>) -> Vec<Vec<BatchRequestItem>> {
    items
        .chunks(MAX_ITEMS_PER_SUBMISSION)
        .map(|c| c.to_vec())
        .collect()
}

#[async_trait]
pub trait BatchModelClient: Send + Sync {
    async fn submit(&self, items: Vec<BatchRequestItem>) -> Result<SubmitOutcome, ModelError>;
    async fn status(&self, batch_id: &str) -> Result<StatusCounts, ModelError>;
    async fn results(&self, batch_id: &str) -> Result<Vec<BatchResultItem>, ModelError>;
}

#[derive(Serialize)]
struct VendorBatchRequest<'a> {
    requests: Vec<VendorBatchRequestEntry<'a>>,
}

#[derive(Serialize)]
struct VendorBatchRequestEntry<'a> {
    custom_id: &'a str,
    params: VendorBatchParams<'a>,
}

#[derive(Serialize)]
struct VendorBatchParams<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<VendorMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct VendorMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct VendorSubmitResponse {
    id: String,
    request_counts: VendorRequestCounts,
}

#[derive(Deserialize)]
struct VendorRequestCounts {
    processing: i64,
    succeeded: i64,
    errored: i64,
    #[serde(default)]
    canceled: i64,
    #[serde(default)]
    expired: i64,
}

#[derive(Deserialize)]
struct VendorStatusResponse {
    processing_status: String,
    request_counts: VendorRequestCounts,
}

#[derive(Deserialize)]
struct VendorResultLine {
    custom_id: String,
    result: VendorResultBody,
}

#[derive(Deserialize)]
struct VendorResultBody {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<VendorResultMessage>,
    #[serde(default)]
    error: Option<VendorResultError>,
}

#[derive(Deserialize)]
struct VendorResultMessage {
    content: Vec<VendorContentBlock>,
}

#[derive(Deserialize)]
struct VendorContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct VendorResultError {
    message: String,
}

pub struct HttpBatchModelClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl HttpBatchModelClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.anthropic.com/v1/messages/batches".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
    }
}

#[async_trait]
impl BatchModelClient for HttpBatchModelClient {
    async fn submit(&self, items: Vec<BatchRequestItem>) -> Result<SubmitOutcome, ModelError> {
        let requests: Vec<VendorBatchRequestEntry> = items
            .iter()
            .map(|item| VendorBatchRequestEntry {
                custom_id: &item.correlation_id,
                params: VendorBatchParams {
                    model: &self.model,
                    system: &item.system_prompt,
                    messages: vec![VendorMessage {
                        role: "user",
                        content: &item.user_message,
                    }],
                    max_tokens: 1024,
                },
            })
            .collect();

        let response = self
            .auth(self.client.post(&self.base_url))
            .json(&VendorBatchRequest { requests })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::VendorError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: VendorSubmitResponse = response.json().await?;
        Ok(SubmitOutcome {
            batch_id: parsed.id,
            request_count: items.len(),
        })
    }

    async fn status(&self, batch_id: &str) -> Result<StatusCounts, ModelError> {
        let url = format!("{}/{}", self.base_url, batch_id);
        let response = self.auth(self.client.get(&url)).send().await?;

        let status_code = response.status();
        if status_code == reqwest::StatusCode::NOT_FOUND {
            return Err(ModelError::BatchNotFound(batch_id.to_string()));
        }
        if !status_code.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::VendorError {
                status: status_code.as_u16(),
                body,
            });
        }

        let parsed: VendorStatusResponse = response.json().await?;
        let counts = &parsed.request_counts;
        let status = match parsed.processing_status.as_str() {
            "in_progress" if counts.processing > 0 => BatchStatus::InProgress,
            "in_progress" => BatchStatus::Submitted,
            other => BatchStatus::parse(other).unwrap_or(BatchStatus::Failed),
        };
        Ok(StatusCounts {
            status,
            succeeded: counts.succeeded,
            failed: counts.errored,
            total: counts.processing + counts.succeeded + counts.errored + counts.canceled + counts.expired,
        })
    }

    async fn results(&self, batch_id: &str) -> Result<Vec<BatchResultItem>, ModelError> {
        let url = format!("{}/{}/results", self.base_url, batch_id);
        let response = self.auth(self.client.get(&url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::VendorError {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        parse_results_jsonl(&body)
    }
}

/// The vendor results endpoint streams newline-delimited JSON; we read the
/// whole body (a real `AsyncIterator` boundary would read it incrementally,
/// but batch result sets are bounded by `MAX_ITEMS_PER_SUBMISSION`).
fn parse_results_jsonl(body: &str) -> Result<Vec<BatchResultItem>, ModelError> {
    let mut out = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed: VendorResultLine = serde_json::from_str(line)
            .map_err(|e| ModelError::ParseFailed(format!("malformed batch result line: {e}")))?;
        let outcome = match parsed.result.kind.as_str() {
            "succeeded" => {
                let text = parsed
                    .result
                    .message
                    .map(|m| m.content.into_iter().map(|b| b.text).collect::<Vec<_>>().join(""))
                    .unwrap_or_default();
                ResultOutcome::Success(text)
            }
            _ => {
                let reason = parsed
                    .result
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| parsed.result.kind.clone());
                ResultOutcome::Failure(reason)
            }
        };
        out.push(BatchResultItem {
            correlation_id: parsed.custom_id,
            outcome,
        });
    }
    Ok(out)
}
