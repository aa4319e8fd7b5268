//! The single progress value the enricher and judge emit after every phase
//! transition and meaningful step within a phase.

use gitmem_types::BatchStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discovering,
    Measuring,
    Enriching,
    Aggregating,
    Indexing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_status: Option<BatchStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_hash: Option<String>,
}

impl Progress {
    pub fn phase(phase: Phase, current: usize, total: usize) -> Self {
        Self {
            phase,
            current,
            total,
            batch_id: None,
            batch_status: None,
            current_hash: None,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.current_hash = Some(hash.into());
        self
    }

    pub fn with_batch(mut self, batch_id: impl Into<String>, status: BatchStatus) -> Self {
        self.batch_id = Some(batch_id.into());
        self.batch_status = Some(status);
        self
    }
}

/// Callback signature the enricher/judge public entry points accept. Boxed
/// so callers (CLI, TUI, HTML server) can close over whatever sink they
/// like without the core depending on any of them.
pub type ProgressCallback<'a> = Box<dyn FnMut(Progress) + Send + 'a>;
