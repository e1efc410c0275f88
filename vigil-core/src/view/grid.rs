//! Grid operations: column filters, sorting and clustering
//!
//! All functions are pure and return new vectors; the input slice is never
//! reordered in place.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::types::{Finding, FindingType};

/// A finding column that can be filtered and sorted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Id,
    Tool,
    Type,
    Message,
    Filepath,
    Line,
    Timestamp,
    RuleId,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Id,
        Column::Tool,
        Column::Type,
        Column::Message,
        Column::Filepath,
        Column::Line,
        Column::Timestamp,
        Column::RuleId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Tool => "tool",
            Column::Type => "type",
            Column::Message => "message",
            Column::Filepath => "filepath",
            Column::Line => "line",
            Column::Timestamp => "timestamp",
            Column::RuleId => "ruleId",
        }
    }

    /// The field rendered as text, or `None` when the finding has no value.
    pub fn text(&self, finding: &Finding) -> Option<String> {
        match self {
            Column::Id => Some(finding.id.clone()),
            Column::Tool => Some(finding.tool.clone()),
            Column::Type => Some(finding.finding_type.as_str().to_string()),
            Column::Message => Some(finding.message.clone()),
            Column::Filepath => Some(finding.filepath.clone()),
            Column::Line => Some(finding.line.to_string()),
            Column::Timestamp => Some(finding.timestamp.to_rfc3339()),
            Column::RuleId => finding.rule_id.clone(),
        }
    }

    /// Compare two present values. Callers handle absent values.
    fn compare(&self, a: &Finding, b: &Finding) -> Ordering {
        match self {
            Column::Id => a.id.cmp(&b.id),
            Column::Tool => a.tool.cmp(&b.tool),
            Column::Type => a.finding_type.as_str().cmp(b.finding_type.as_str()),
            Column::Message => a.message.cmp(&b.message),
            Column::Filepath => a.filepath.cmp(&b.filepath),
            Column::Line => a.line.cmp(&b.line),
            Column::Timestamp => a.timestamp.cmp(&b.timestamp),
            Column::RuleId => a.rule_id.cmp(&b.rule_id),
        }
    }

    fn is_absent(&self, finding: &Finding) -> bool {
        matches!(self, Column::RuleId) && finding.rule_id.is_none()
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(Column::Id),
            "tool" => Ok(Column::Tool),
            "type" => Ok(Column::Type),
            "message" => Ok(Column::Message),
            "filepath" | "file" => Ok(Column::Filepath),
            "line" => Ok(Column::Line),
            "timestamp" | "date" => Ok(Column::Timestamp),
            "ruleid" | "rule_id" | "rule" => Ok(Column::RuleId),
            _ => Err(format!("unknown column: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            _ => Err(format!("unknown sort direction: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: Column,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(column: Column) -> Self {
        Self {
            column,
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(column: Column) -> Self {
        Self {
            column,
            direction: SortDirection::Descending,
        }
    }
}

/// Direction after clicking `column`: the same column while ascending flips
/// to descending, anything else starts ascending.
pub fn next_direction(current: Option<&SortSpec>, column: Column) -> SortDirection {
    match current {
        Some(spec) if spec.column == column && spec.direction == SortDirection::Ascending => {
            SortDirection::Descending
        }
        _ => SortDirection::Ascending,
    }
}

/// Keep findings matching every non-empty filter (case-insensitive
/// substring on the rendered field).
pub fn filter_findings(findings: &[Finding], filters: &[(Column, String)]) -> Vec<Finding> {
    let active: Vec<(Column, String)> = filters
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(column, value)| (*column, value.to_lowercase()))
        .collect();

    findings
        .iter()
        .filter(|finding| {
            active.iter().all(|(column, needle)| {
                column
                    .text(finding)
                    .unwrap_or_default()
                    .to_lowercase()
                    .contains(needle.as_str())
            })
        })
        .cloned()
        .collect()
}

/// Stable sort. Absent values go last in either direction.
pub fn sort_findings(findings: &[Finding], spec: &SortSpec) -> Vec<Finding> {
    let mut sorted = findings.to_vec();
    sorted.sort_by(|a, b| {
        match (spec.column.is_absent(a), spec.column.is_absent(b)) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
        let ordering = spec.column.compare(a, b);
        match spec.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
    sorted
}

/// A grid row: a finding, plus the group size when clustered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteredFinding {
    #[serde(flatten)]
    pub finding: Finding,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl From<Finding> for ClusteredFinding {
    fn from(finding: Finding) -> Self {
        Self {
            finding,
            count: None,
        }
    }
}

/// Group by `(type, tool, message)`. Each group keeps its first member as
/// representative with the most recent timestamp of the group.
pub fn cluster_findings(findings: &[Finding]) -> Vec<ClusteredFinding> {
    let mut groups: Vec<ClusteredFinding> = Vec::new();
    let mut positions: HashMap<(FindingType, &str, &str), usize> = HashMap::new();

    for finding in findings {
        let key = (
            finding.finding_type,
            finding.tool.as_str(),
            finding.message.as_str(),
        );
        match positions.get(&key) {
            Some(&pos) => {
                let group = &mut groups[pos];
                group.count = Some(group.count.unwrap_or(1) + 1);
                if finding.timestamp > group.finding.timestamp {
                    group.finding.timestamp = finding.timestamp;
                }
            }
            None => {
                positions.insert(key, groups.len());
                groups.push(ClusteredFinding {
                    finding: finding.clone(),
                    count: Some(1),
                });
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn finding(tool: &str, kind: FindingType, message: &str, line: u32, rule: Option<&str>) -> Finding {
        Finding {
            id: format!("{}-{}", tool, line),
            tool: tool.to_string(),
            finding_type: kind,
            message: message.to_string(),
            filepath: format!("src/{}.py", tool.to_lowercase()),
            line,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap() + Duration::seconds(line as i64),
            rule_id: rule.map(str::to_string),
        }
    }

    fn sample() -> Vec<Finding> {
        vec![
            finding("Ruff", FindingType::Warning, "E501 line too long", 3, Some("E501")),
            finding("Ruff", FindingType::Error, "F821 undefined name", 9, Some("F821")),
            finding("ESLint", FindingType::Warning, "unused variable", 1, None),
            finding("Ruff", FindingType::Warning, "E501 line too long", 20, Some("E501")),
        ]
    }

    #[test]
    fn test_filter_is_case_insensitive_and() {
        let data = sample();
        let out = filter_findings(
            &data,
            &[(Column::Tool, "ruff".to_string()), (Column::Message, "LINE".to_string())],
        );
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|f| f.rule_id.as_deref() == Some("E501")));
    }

    #[test]
    fn test_empty_filter_is_inactive() {
        let data = sample();
        assert_eq!(filter_findings(&data, &[(Column::Tool, String::new())]), data);
    }

    #[test]
    fn test_filter_composition() {
        let data = sample();
        let f1 = vec![(Column::Tool, "ruff".to_string())];
        let f2 = vec![(Column::Type, "warn".to_string())];
        let both: Vec<_> = f1.iter().chain(f2.iter()).cloned().collect();
        assert_eq!(
            filter_findings(&filter_findings(&data, &f1), &f2),
            filter_findings(&data, &both)
        );
    }

    #[test]
    fn test_filter_on_absent_field_matches_nothing() {
        let out = filter_findings(&sample(), &[(Column::RuleId, "x".to_string())]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_sort_absent_last_in_both_directions() {
        let data = sample();
        for spec in [SortSpec::ascending(Column::RuleId), SortSpec::descending(Column::RuleId)] {
            let sorted = sort_findings(&data, &spec);
            assert_eq!(sorted.last().unwrap().rule_id, None);
        }
        let asc = sort_findings(&data, &SortSpec::ascending(Column::RuleId));
        assert_eq!(asc[0].rule_id.as_deref(), Some("E501"));
        let desc = sort_findings(&data, &SortSpec::descending(Column::RuleId));
        assert_eq!(desc[0].rule_id.as_deref(), Some("F821"));
    }

    #[test]
    fn test_sort_is_stable() {
        let data = sample();
        let sorted = sort_findings(&data, &SortSpec::ascending(Column::Tool));
        let ruff_lines: Vec<u32> = sorted
            .iter()
            .filter(|f| f.tool == "Ruff")
            .map(|f| f.line)
            .collect();
        assert_eq!(ruff_lines, vec![3, 9, 20]);
        assert_eq!(sorted[0].tool, "ESLint");
    }

    #[test]
    fn test_sort_line_numerically() {
        let sorted = sort_findings(&sample(), &SortSpec::descending(Column::Line));
        let lines: Vec<u32> = sorted.iter().map(|f| f.line).collect();
        assert_eq!(lines, vec![20, 9, 3, 1]);
    }

    #[test]
    fn test_next_direction() {
        let asc = SortSpec::ascending(Column::Line);
        let desc = SortSpec::descending(Column::Line);
        assert_eq!(next_direction(None, Column::Line), SortDirection::Ascending);
        assert_eq!(next_direction(Some(&asc), Column::Line), SortDirection::Descending);
        assert_eq!(next_direction(Some(&desc), Column::Line), SortDirection::Ascending);
        assert_eq!(next_direction(Some(&asc), Column::Tool), SortDirection::Ascending);
    }

    #[test]
    fn test_cluster_counts_and_latest_timestamp() {
        let data = sample();
        let clustered = cluster_findings(&data);
        assert_eq!(clustered.len(), 3);

        let first = &clustered[0];
        assert_eq!(first.count, Some(2));
        assert_eq!(first.finding.line, 3);
        assert_eq!(first.finding.timestamp, data[3].timestamp);

        let total: usize = clustered.iter().map(|c| c.count.unwrap_or(1)).sum();
        assert_eq!(total, data.len());
    }

    #[test]
    fn test_column_names_parse() {
        for column in Column::ALL {
            assert_eq!(column.as_str().parse::<Column>().unwrap(), column);
        }
        assert!("severity".parse::<Column>().is_err());
    }
}
