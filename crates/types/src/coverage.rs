//! The three-valued enrichment coverage state surfaced to consumers.
//!
//! `ai` in config can be `false` (disabled), `true` (always enrich), or an
//! ISO date string (enrich only from that date forward). Downstream UI code
//! must not collapse "disabled" and "partial coverage" into one state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Coverage {
    Disabled,
    Full,
    Partial {
        enriched: i64,
        total: i64,
        ai_config: AiConfig,
    },
}

/// The `ai` config value that produced a `Partial` coverage state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AiConfig {
    Enabled,
    SinceDate(String),
}

impl Coverage {
    pub fn is_disabled(&self) -> bool {
        matches!(self, Coverage::Disabled)
    }
}
