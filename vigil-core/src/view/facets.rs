//! Faceted metrics filter
//!
//! The dashboard-style filter: a tool selection, a type selection, a
//! free-text query over path and message, and an optional time window,
//! followed by one of four fixed sort orders.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::types::{Finding, FindingType};

/// Fixed orderings offered by the metrics view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Errors first
    #[default]
    TypeDesc,
    /// Infos first
    TypeAsc,
    Newest,
    Oldest,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "type_desc" => Ok(SortOrder::TypeDesc),
            "type_asc" => Ok(SortOrder::TypeAsc),
            "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            _ => Err(format!("unknown sort order: {}", s)),
        }
    }
}

/// Inclusive time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetFilter {
    /// Selected tools; empty selects all
    pub tools: Vec<String>,
    /// Selected types; empty selects all
    pub types: Vec<FindingType>,
    pub query: String,
    pub date_range: Option<DateRange>,
    pub sort_order: SortOrder,
}

impl Default for FacetFilter {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            types: FindingType::ALL.to_vec(),
            query: String::new(),
            date_range: None,
            sort_order: SortOrder::default(),
        }
    }
}

impl FacetFilter {
    /// Default filter with every tool in `available` selected.
    pub fn all_of(available: &[String]) -> Self {
        Self {
            tools: available.to_vec(),
            ..Default::default()
        }
    }

    pub fn apply(&self, findings: &[Finding]) -> Vec<Finding> {
        let query = self.query.trim().to_lowercase();

        let mut result: Vec<Finding> = findings
            .iter()
            .filter(|f| self.tools.is_empty() || self.tools.contains(&f.tool))
            .filter(|f| self.types.is_empty() || self.types.contains(&f.finding_type))
            .filter(|f| {
                query.is_empty()
                    || format!("{} {}", f.filepath, f.message)
                        .to_lowercase()
                        .contains(&query)
            })
            .filter(|f| self.date_range.map_or(true, |range| range.contains(f.timestamp)))
            .cloned()
            .collect();

        match self.sort_order {
            SortOrder::TypeDesc => result.sort_by(|a, b| a.finding_type.cmp(&b.finding_type)),
            SortOrder::TypeAsc => result.sort_by(|a, b| b.finding_type.cmp(&a.finding_type)),
            SortOrder::Newest => result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
            SortOrder::Oldest => result.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
        }
        result
    }
}

/// Distinct tool names present in `findings`, sorted.
pub fn available_tools(findings: &[Finding]) -> Vec<String> {
    findings
        .iter()
        .map(|f| f.tool.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
