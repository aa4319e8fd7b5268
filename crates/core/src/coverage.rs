//! Computes the three-valued coverage state from config and enrichment
//! counts. Kept distinct from "disabled": a cutoff date still enriches
//! going forward, it just isn't "full".

use gitmem_types::{AiConfig as TypesAiConfig, Coverage};

use crate::config::AiSetting;

/// `enriched`/`total` are over the set of commits the `ai` setting actually
/// applies to (i.e. already filtered by `indexStartDate`-equivalent cutoff
/// when `ai` is a date).
pub fn compute_coverage(ai: &AiSetting, enriched: i64, total: i64) -> Coverage {
    match ai {
        AiSetting::Disabled => Coverage::Disabled,
        AiSetting::Enabled => {
            if total > 0 && enriched == total {
                Coverage::Full
            } else {
                Coverage::Partial {
                    enriched,
                    total,
                    ai_config: TypesAiConfig::Enabled,
                }
            }
        }
        AiSetting::SinceDate(date) => {
            if total > 0 && enriched == total {
                Coverage::Full
            } else {
                Coverage::Partial {
                    enriched,
                    total,
                    ai_config: TypesAiConfig::SinceDate(date.clone()),
                }
            }
        }
    }
}
