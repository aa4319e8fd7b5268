//! Row types returned by full-text search queries.

use gitmem_types::Classification;
use serde::Serialize;

/// One matching commit, carrying just enough of its enrichment and message
/// to render a result line; callers needing the full row look it up through
/// `gitmem-db`'s commit repository by hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub hash: String,
    pub message: String,
    pub classification: Option<Classification>,
    pub summary: Option<String>,
    /// SQLite FTS5 `bm25()` rank; lower is a better match.
    pub rank: f64,
}
