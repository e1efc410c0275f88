//! Aggregate statistics over a finding list.
//!
//! Provides type counts, the most recent finding time, and a fixed-bucket
//! histogram of finding times for the sparkline.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Finding, FindingType};

/// Default number of histogram buckets
pub const DEFAULT_TREND_BUCKETS: usize = 20;

/// Summary of the visible findings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FindingStats {
    pub total_errors: usize,
    pub total_warnings: usize,
    pub total_infos: usize,
    /// Timestamp of the most recent finding
    pub last_finding: Option<DateTime<Utc>>,
    /// Findings per time bucket, oldest first. Empty when all findings share
    /// one timestamp.
    pub trend: Vec<usize>,
}

impl FindingStats {
    pub fn calculate(findings: &[Finding], buckets: usize) -> Self {
        Self {
            total_errors: count_by_type(findings, FindingType::Error),
            total_warnings: count_by_type(findings, FindingType::Warning),
            total_infos: count_by_type(findings, FindingType::Info),
            last_finding: latest_timestamp(findings),
            trend: trend(findings, buckets),
        }
    }

    pub fn total(&self) -> usize {
        self.total_errors + self.total_warnings + self.total_infos
    }
}

pub fn count_by_type(findings: &[Finding], kind: FindingType) -> usize {
    findings.iter().filter(|f| f.finding_type == kind).count()
}

pub fn latest_timestamp(findings: &[Finding]) -> Option<DateTime<Utc>> {
    findings.iter().map(|f| f.timestamp).max()
}

/// Distribute findings into `buckets` equal time slices between the earliest
/// and latest timestamp. The latest finding lands in the last bucket.
pub fn trend(findings: &[Finding], buckets: usize) -> Vec<usize> {
    if buckets == 0 {
        return Vec::new();
    }
    let times: Vec<i64> = findings
        .iter()
        .map(|f| f.timestamp.timestamp_millis())
        .collect();
    let (Some(&min), Some(&max)) = (times.iter().min(), times.iter().max()) else {
        return Vec::new();
    };
    if max <= min {
        return Vec::new();
    }

    let step = (max - min) as f64 / buckets as f64;
    let mut counts = vec![0usize; buckets];
    for t in times {
        let index = (((t - min) as f64) / step).floor() as usize;
        counts[index.min(buckets - 1)] += 1;
    }
    counts
}
