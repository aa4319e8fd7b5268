//! Model vendor integration: the interactive classify-and-summarize client
//! and the asynchronous batch submission/status/results client.

pub mod batch_client;
pub mod classifier;

use thiserror::Error;

/// Errors surfaced unchanged to enricher/judge callers; retry policy is the
/// caller's decision, not this crate's.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model API key missing")]
    ApiKeyMissing,

    #[error("request to model vendor failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("vendor returned an error status {status}: {body}")]
    VendorError { status: u16, body: String },

    #[error("could not parse model response: {0}")]
    ParseFailed(String),

    #[error("batch {0} not found")]
    BatchNotFound(String),
}
