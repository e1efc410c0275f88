//! Structured (JSON report) parser
//!
//! Linters such as ESLint can emit a JSON array of per-file results. When the
//! module output contains such an array, it is the authoritative source and
//! line heuristics are skipped.
//!
//! ```json
//! [{"filePath": "src/a.js",
//!   "messages": [{"line": 1, "severity": 2, "message": "...", "ruleId": "no-undef"}]}]
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::findings::parser::{ExtractContext, FindingParser};
use crate::types::{Finding, FindingType};

/// Greedy span from the first `[{` to the last `}]`
static JSON_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[\s*\{.*\}\s*\]").expect("Invalid JSON array regex"));

/// ESLint severity for errors; anything else is a warning
const SEVERITY_ERROR: i64 = 2;

#[derive(Debug, Deserialize)]
struct FileReport {
    #[serde(rename = "filePath", default)]
    file_path: String,
    messages: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ReportMessage {
    #[serde(default)]
    line: u32,
    #[serde(default)]
    severity: i64,
    #[serde(default)]
    message: String,
    #[serde(rename = "ruleId", default)]
    rule_id: Option<String>,
}

/// Parses an embedded JSON report
#[derive(Debug, Default)]
pub struct StructuredParser;

impl StructuredParser {
    pub fn new() -> Self {
        Self
    }
}

impl FindingParser for StructuredParser {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn parse(&self, ctx: &ExtractContext<'_>) -> Vec<Finding> {
        let Some(span) = JSON_ARRAY.find(ctx.full_text) else {
            return Vec::new();
        };

        let reports: Vec<Value> = match serde_json::from_str(span.as_str()) {
            Ok(reports) => reports,
            Err(e) => {
                tracing::trace!(module = %ctx.module_id, error = %e, "Embedded JSON report did not parse");
                return Vec::new();
            }
        };

        let mut findings = Vec::new();
        for report in reports {
            // Entries without a messages array are skipped
            let Ok(report) = serde_json::from_value::<FileReport>(report) else {
                continue;
            };
            for message in report.messages {
                let Ok(message) = serde_json::from_value::<ReportMessage>(message) else {
                    continue;
                };
                let finding_type = if message.severity == SEVERITY_ERROR {
                    FindingType::Error
                } else {
                    FindingType::Warning
                };
                findings.push(ctx.finding(
                    finding_type,
                    &report.file_path,
                    message.line,
                    &message.message,
                    message.rule_id,
                ));
            }
        }
        findings
    }
}
