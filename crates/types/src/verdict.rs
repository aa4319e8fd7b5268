//! Judge output types: per-dimension verdicts and the summary across a run.

use serde::{Deserialize, Serialize};

use crate::Classification;

/// A single pass/fail judgment along one of the judge's three dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub pass: bool,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_classification: Option<Classification>,
}

impl Verdict {
    /// Applies the self-contradiction normalization: a failing classification
    /// verdict whose suggestion matches the original classification is
    /// flipped to pass and the suggestion is cleared.
    pub fn reconcile_classification(mut self, original: Classification) -> Self {
        if !self.pass {
            if let Some(suggested) = self.suggested_classification {
                if suggested == original {
                    self.pass = true;
                    self.suggested_classification = None;
                }
            }
        }
        self
    }
}

/// The judge's full output for one commit: the enrichment under evaluation
/// plus a verdict for each of the three dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub commit_hash: String,
    pub classification: Classification,
    pub summary: String,
    pub classification_verdict: Verdict,
    pub accuracy_verdict: Verdict,
    pub completeness_verdict: Verdict,
}

impl EvalResult {
    pub fn reconciled(mut self) -> Self {
        self.classification_verdict = self
            .classification_verdict
            .reconcile_classification(self.classification);
        self
    }
}

/// Aggregate pass counts across a judge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub total: usize,
    pub classification_passed: usize,
    pub accuracy_passed: usize,
    pub completeness_passed: usize,
}

impl EvalSummary {
    pub fn from_results(results: &[EvalResult]) -> Self {
        let mut summary = EvalSummary {
            total: results.len(),
            ..Default::default()
        };
        for r in results {
            if r.classification_verdict.pass {
                summary.classification_passed += 1;
            }
            if r.accuracy_verdict.pass {
                summary.accuracy_passed += 1;
            }
            if r.completeness_verdict.pass {
                summary.completeness_passed += 1;
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_contradicting_verdict_flips_to_pass() {
        let v = Verdict {
            pass: false,
            reasoning: "Should be feature".into(),
            suggested_classification: Some(Classification::Feature),
        };
        let reconciled = v.reconcile_classification(Classification::Feature);
        assert!(reconciled.pass);
        assert_eq!(reconciled.suggested_classification, None);
        assert_eq!(reconciled.reasoning, "Should be feature");
    }

    #[test]
    fn genuine_disagreement_stays_failed() {
        let v = Verdict {
            pass: false,
            reasoning: "Should be feature".into(),
            suggested_classification: Some(Classification::Feature),
        };
        let reconciled = v.reconcile_classification(Classification::Chore);
        assert!(!reconciled.pass);
        assert_eq!(reconciled.suggested_classification, Some(Classification::Feature));
    }
}
