//! On-demand (non-materialized) trend queries: group touching commits for a
//! file or directory prefix into ISO 8601 period buckets and reduce a period
//! series to a directional summary.

use chrono::{DateTime, Datelike};
use sqlx::Row;

use gitmem_core::scope;
use gitmem_types::Classification;

use crate::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendWindow {
    Weekly,
    Monthly,
    Quarterly,
}

impl TrendWindow {
    /// Buckets an RFC 3339 timestamp into this window's ISO 8601 period
    /// label. Malformed timestamps (shouldn't occur; `committed_at` is
    /// always git-derived) fall back to the raw string so a query never
    /// panics on bad data.
    fn period_label(&self, committed_at: &str) -> String {
        let Ok(dt) = DateTime::parse_from_rfc3339(committed_at) else {
            return committed_at.to_string();
        };
        match self {
            TrendWindow::Weekly => {
                let iso = dt.iso_week();
                format!("{}-W{:02}", iso.year(), iso.week())
            }
            TrendWindow::Monthly => format!("{:04}-{:02}", dt.year(), dt.month()),
            TrendWindow::Quarterly => format!("{:04}-Q{}", dt.year(), (dt.month() - 1) / 3 + 1),
        }
    }
}

/// One bucketed period's counters, mirroring File statistics plus an
/// average over the measured complexity column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrendPeriod {
    pub period_label: String,
    pub total_changes: i64,
    pub bug_fix_count: i64,
    pub feature_count: i64,
    pub refactor_count: i64,
    pub docs_count: i64,
    pub chore_count: i64,
    pub perf_count: i64,
    pub test_count: i64,
    pub style_count: i64,
    pub avg_complexity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendSummary {
    pub direction: TrendDirection,
    pub recent_avg: f64,
    pub historical_avg: f64,
    pub bug_fix_trend: TrendDirection,
    pub complexity_trend: TrendDirection,
}

fn direction(recent: f64, historical: f64) -> TrendDirection {
    if historical == 0.0 {
        return if recent > 0.0 { TrendDirection::Increasing } else { TrendDirection::Stable };
    }
    let ratio = recent / historical;
    if ratio >= 1.15 {
        TrendDirection::Increasing
    } else if ratio <= 0.85 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

fn avg(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Splits a chronologically-ascending period series into (historical, recent)
/// halves and reduces each axis (total changes, bug-fix count, average
/// complexity) to a trend direction.
pub fn compute_trend(periods: &[TrendPeriod]) -> TrendSummary {
    let mid = periods.len() / 2;
    let historical = &periods[..mid];
    let recent = &periods[mid..];

    let historical_avg = avg(&historical.iter().map(|p| p.total_changes as f64).collect::<Vec<_>>());
    let recent_avg = avg(&recent.iter().map(|p| p.total_changes as f64).collect::<Vec<_>>());

    let historical_bug_fix = avg(&historical.iter().map(|p| p.bug_fix_count as f64).collect::<Vec<_>>());
    let recent_bug_fix = avg(&recent.iter().map(|p| p.bug_fix_count as f64).collect::<Vec<_>>());

    let historical_complexity = avg(
        &historical.iter().filter_map(|p| p.avg_complexity).collect::<Vec<_>>(),
    );
    let recent_complexity = avg(&recent.iter().filter_map(|p| p.avg_complexity).collect::<Vec<_>>());

    TrendSummary {
        direction: direction(recent_avg, historical_avg),
        recent_avg,
        historical_avg,
        bug_fix_trend: direction(recent_bug_fix, historical_bug_fix),
        complexity_trend: direction(recent_complexity, historical_complexity),
    }
}

impl Store {
    /// Trend periods for commits touching exactly `file_path`.
    pub async fn trend_for_file(&self, file_path: &str, window: TrendWindow) -> Result<Vec<TrendPeriod>, StoreError> {
        let rows = sqlx::query(
            "SELECT c.committed_at, c.classification, cf.indent_complexity FROM commits c \
             JOIN commit_files cf ON cf.commit_hash = c.hash \
             WHERE cf.file_path = ?1",
        )
        .bind(file_path)
        .fetch_all(self.pool())
        .await?;
        Ok(bucket_rows(&rows, window)?)
    }

    /// Trend periods for commits touching any file under `dir_prefix`.
    pub async fn trend_for_directory(&self, dir_prefix: &str, window: TrendWindow) -> Result<Vec<TrendPeriod>, StoreError> {
        let like = scope::to_like_pattern(dir_prefix);
        let rows = sqlx::query(
            "SELECT DISTINCT c.hash, c.committed_at, c.classification, cf.indent_complexity FROM commits c \
             JOIN commit_files cf ON cf.commit_hash = c.hash \
             WHERE cf.file_path LIKE ?1 ESCAPE '\\'",
        )
        .bind(&like)
        .fetch_all(self.pool())
        .await?;
        Ok(bucket_rows(&rows, window)?)
    }
}

fn bucket_rows(rows: &[sqlx::sqlite::SqliteRow], window: TrendWindow) -> Result<Vec<TrendPeriod>, StoreError> {
    use std::collections::BTreeMap;

    let mut buckets: BTreeMap<String, (TrendPeriod, Vec<f64>)> = BTreeMap::new();
    for row in rows {
        let committed_at: String = row.try_get("committed_at")?;
        let classification: Option<String> = row.try_get("classification")?;
        let indent_complexity: Option<i64> = row.try_get("indent_complexity")?;

        let label = window.period_label(&committed_at);
        let (period, complexities) = buckets.entry(label.clone()).or_insert_with(|| {
            (
                TrendPeriod {
                    period_label: label.clone(),
                    ..Default::default()
                },
                Vec::new(),
            )
        });

        period.total_changes += 1;
        if let Some(c) = classification.as_deref().map(Classification::parse_or_chore) {
            match c {
                Classification::BugFix => period.bug_fix_count += 1,
                Classification::Feature => period.feature_count += 1,
                Classification::Refactor => period.refactor_count += 1,
                Classification::Docs => period.docs_count += 1,
                Classification::Chore => period.chore_count += 1,
                Classification::Perf => period.perf_count += 1,
                Classification::Test => period.test_count += 1,
                Classification::Style => period.style_count += 1,
            }
        }
        if let Some(ic) = indent_complexity {
            complexities.push(ic as f64);
        }
    }

    Ok(buckets
        .into_values()
        .map(|(mut period, complexities)| {
            period.avg_complexity = if complexities.is_empty() { None } else { Some(avg(&complexities)) };
            period
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(total: i64, bug_fix: i64, complexity: Option<f64>) -> TrendPeriod {
        TrendPeriod {
            total_changes: total,
            bug_fix_count: bug_fix,
            avg_complexity: complexity,
            ..Default::default()
        }
    }

    #[test]
    fn increasing_when_recent_half_at_least_fifteen_percent_higher() {
        let periods = vec![period(10, 1, Some(1.0)), period(10, 1, Some(1.0)), period(20, 5, Some(2.0))];
        let summary = compute_trend(&periods);
        assert_eq!(summary.direction, TrendDirection::Increasing);
    }

    #[test]
    fn stable_when_within_threshold_band() {
        let periods = vec![period(10, 1, Some(1.0)), period(10, 1, Some(1.0))];
        let summary = compute_trend(&periods);
        assert_eq!(summary.direction, TrendDirection::Stable);
    }

    #[test]
    fn decreasing_when_recent_half_drops() {
        let periods = vec![period(20, 5, None), period(20, 5, None), period(5, 1, None)];
        let summary = compute_trend(&periods);
        assert_eq!(summary.direction, TrendDirection::Decreasing);
    }

    #[test]
    fn weekly_label_uses_iso_week() {
        let window = TrendWindow::Weekly;
        assert_eq!(window.period_label("2024-01-08T00:00:00Z"), "2024-W02");
    }

    #[test]
    fn quarterly_label_groups_by_three_months() {
        let window = TrendWindow::Quarterly;
        assert_eq!(window.period_label("2024-05-01T00:00:00Z"), "2024-Q2");
    }
}
