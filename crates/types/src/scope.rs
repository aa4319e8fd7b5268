//! Scope configuration: the data shape shared between config, CLI flags, and
//! the matching engine in `gitmem-core`. Matching logic lives in
//! `gitmem_core::scope`; this crate only holds the plain data.

use serde::{Deserialize, Serialize};

/// An include/exclude file-path pattern set. Patterns are raw strings; see
/// the matching engine for the prefix-vs-wildcard semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl ScopeConfig {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}
