//! Shared wire and row types for the enrichment store.
//!
//! Nothing in this crate touches the filesystem, a database, or the network;
//! it exists so `gitmem-core`, `gitmem-db`, and `gitmem-search` can agree on
//! shapes without depending on each other.

mod batch;
mod classification;
mod commit;
mod coverage;
mod scope;
mod verdict;

pub use batch::{BatchJob, BatchJobType, BatchStatus, CheckBatchItem};
pub use classification::Classification;
pub use commit::{ChangeType, Commit, CommitFile};
pub use coverage::Coverage;
pub use scope::ScopeConfig;
pub use verdict::{EvalResult, EvalSummary, Verdict};
