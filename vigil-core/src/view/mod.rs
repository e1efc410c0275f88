//! View engine
//!
//! Derives what a findings grid shows from the raw finding list. The
//! pipeline always runs in the same order:
//!
//! ```text
//! findings ──► filter ──► sort ──► cluster? ──► rows
//!                 │
//!                 └──► FindingStats (post-filter, pre-cluster)
//! ```
//!
//! Everything here is pure; a [`ViewQuery`] is cheap to rebuild on every
//! keystroke.

pub mod export;
pub mod facets;
pub mod grid;
pub mod stats;

pub use export::{serialize, ExportFormat};
pub use facets::{available_tools, DateRange, FacetFilter, SortOrder};
pub use grid::{
    cluster_findings, filter_findings, next_direction, sort_findings, ClusteredFinding, Column,
    SortDirection, SortSpec,
};
pub use stats::{FindingStats, DEFAULT_TREND_BUCKETS};

use serde::Serialize;

use crate::types::Finding;

/// Grid state: column filters, sort, and the cluster toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    pub filters: Vec<(Column, String)>,
    pub sort: Option<SortSpec>,
    pub cluster: bool,
    pub trend_buckets: usize,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            sort: None,
            cluster: false,
            trend_buckets: DEFAULT_TREND_BUCKETS,
        }
    }
}

impl ViewQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the filter for one column.
    pub fn set_filter(&mut self, column: Column, value: impl Into<String>) {
        let value = value.into();
        self.filters.retain(|(c, _)| *c != column);
        if !value.is_empty() {
            self.filters.push((column, value));
        }
    }

    /// Header click: sort by `column`, cycling the direction.
    pub fn toggle_sort(&mut self, column: Column) {
        let direction = next_direction(self.sort.as_ref(), column);
        self.sort = Some(SortSpec { column, direction });
    }

    pub fn process(&self, findings: &[Finding]) -> ViewResult {
        let filtered = filter_findings(findings, &self.filters);
        let summary = FindingStats::calculate(&filtered, self.trend_buckets);

        let sorted = match &self.sort {
            Some(spec) => sort_findings(&filtered, spec),
            None => filtered,
        };
        let rows = if self.cluster {
            cluster_findings(&sorted)
        } else {
            sorted.into_iter().map(ClusteredFinding::from).collect()
        };

        ViewResult { rows, summary }
    }
}

/// Output of [`ViewQuery::process`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewResult {
    pub rows: Vec<ClusteredFinding>,
    pub summary: FindingStats,
}

impl ViewResult {
    /// The row findings, without cluster counts
    pub fn findings(&self) -> Vec<Finding> {
        self.rows.iter().map(|r| r.finding.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FindingType;
    use chrono::{Duration, TimeZone, Utc};

    fn findings() -> Vec<Finding> {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        [
            ("Ruff", FindingType::Warning, "E501 line too long", 3),
            ("Ruff", FindingType::Warning, "E501 line too long", 8),
            ("Pyright", FindingType::Error, "bad type", 2),
            ("Ruff", FindingType::Error, "F821 undefined name", 5),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (tool, kind, message, line))| Finding {
            id: format!("f{}", i),
            tool: tool.to_string(),
            finding_type: kind,
            message: message.to_string(),
            filepath: "app.py".to_string(),
            line,
            timestamp: base + Duration::minutes(i as i64),
            rule_id: None,
        })
        .collect()
    }

    #[test]
    fn test_pipeline_filter_sort_cluster() {
        let mut query = ViewQuery::new();
        query.set_filter(Column::Tool, "ruff");
        query.toggle_sort(Column::Line);
        query.toggle_sort(Column::Line);
        query.cluster = true;

        let result = query.process(&findings());
        assert_eq!(query.sort, Some(SortSpec::descending(Column::Line)));
        assert_eq!(result.rows.len(), 2);
        // Line 8 sorts first, so its group represents the E501 cluster
        assert_eq!(result.rows[0].finding.line, 8);
        assert_eq!(result.rows[0].count, Some(2));
        assert_eq!(result.rows[1].finding.line, 5);
    }

    #[test]
    fn test_summary_is_pre_cluster() {
        let query = ViewQuery {
            cluster: true,
            ..Default::default()
        };
        let result = query.process(&findings());
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.summary.total(), 4);
        assert_eq!(result.summary.total_errors, 2);
        assert_eq!(result.summary.trend.iter().sum::<usize>(), 4);
    }

    #[test]
    fn test_clearing_filter() {
        let mut query = ViewQuery::new();
        query.set_filter(Column::Tool, "pyright");
        assert_eq!(query.process(&findings()).rows.len(), 1);
        query.set_filter(Column::Tool, "");
        assert!(query.filters.is_empty());
        assert_eq!(query.process(&findings()).rows.len(), 4);
    }

    #[test]
    fn test_unclustered_rows_have_no_count() {
        let result = ViewQuery::new().process(&findings());
        assert!(result.rows.iter().all(|r| r.count.is_none()));
        assert_eq!(result.findings(), findings());
    }
}
