//! Batch job registry row types.

use serde::{Deserialize, Serialize};

use crate::Classification;

/// Which enrichment facility a batch job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchJobType {
    Index,
    Check,
}

impl BatchJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Check => "check",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "index" => Some(Self::Index),
            "check" => Some(Self::Check),
            _ => None,
        }
    }
}

/// Vendor-reported batch processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Submitted,
    InProgress,
    Ended,
    Failed,
    Canceled,
    Expired,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::InProgress => "in_progress",
            Self::Ended => "ended",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" | "submitting" => Some(Self::Submitted),
            "in_progress" => Some(Self::InProgress),
            "ended" => Some(Self::Ended),
            "failed" => Some(Self::Failed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// True once the vendor will not emit further status transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed | Self::Canceled | Self::Expired)
    }
}

/// A row in the persistent batch job registry (`batch_jobs` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub batch_id: String,
    pub job_type: BatchJobType,
    pub status: BatchStatus,
    pub request_count: i64,
    pub succeeded_count: i64,
    pub failed_count: i64,
    pub submitted_at: String,
    pub completed_at: Option<String>,
    pub model_used: String,
}

/// A `check_batch_items` row: the enrichment under evaluation at submission
/// time, kept so a judge verdict can be attached correctly even if the
/// commit's live enrichment is overwritten before results return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckBatchItem {
    pub batch_id: String,
    pub commit_hash: String,
    pub classification: Classification,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(BatchStatus::Ended.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(!BatchStatus::InProgress.is_terminal());
        assert!(!BatchStatus::Submitted.is_terminal());
    }
}
