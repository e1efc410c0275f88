//! Line-based heuristic parser
//!
//! Recognises the common `path:line:col: message` family of compiler and
//! linter output line by line. Classification is keyword based and
//! intentionally loose; register a stricter parser ahead of this one for
//! tools whose output it misreads.
//!
//! Lines written by the store carry a `[h:mm:ss AM]` prefix. Those are mostly
//! progress chatter, so after removing the prefix only the two location
//! formats that include a column are accepted.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::findings::parser::{ExtractContext, FindingParser};
use crate::types::{Finding, FindingType};

static TIMESTAMP_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[\d{1,2}:\d{2}:\d{2}\s*[AP]M\]\s*").expect("Invalid timestamp regex")
});

/// `path:line:col: message`
static LINE_COL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?):(\d+):(\d+):\s*(.+)$").expect("Invalid line:col regex"));

/// `path(line,col): message`
static PAREN_LINE_COL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\((\d+),(\d+)\):\s*(.+)$").expect("Invalid (line,col) regex")
});

/// `path:line: message`
static LINE_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?):(\d+):\s*(.+)$").expect("Invalid line regex"));

static RULE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]+[0-9]+)\b").expect("Invalid rule id regex"));

/// Heuristic parser for plain-text tool output
#[derive(Debug, Default)]
pub struct LineParser;

impl LineParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_line(&self, ctx: &ExtractContext<'_>, raw: &str) -> Option<Finding> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('$') || line.starts_with("⚠️") {
            return None;
        }

        let (filepath, line_no, message) = match TIMESTAMP_PREFIX.find(line) {
            Some(prefix) => {
                let rest = &line[prefix.end()..];
                match_strict(rest)?
            }
            None => match_strict(line).or_else(|| {
                LINE_ONLY
                    .captures(line)
                    .and_then(|caps| location(&caps, 3))
            })?,
        };

        Some(ctx.finding(
            classify(message),
            filepath,
            line_no,
            message,
            rule_id(message),
        ))
    }
}

impl FindingParser for LineParser {
    fn name(&self) -> &'static str {
        "line"
    }

    fn parse(&self, ctx: &ExtractContext<'_>) -> Vec<Finding> {
        ctx.full_text
            .lines()
            .filter_map(|line| self.parse_line(ctx, line))
            .collect()
    }
}

/// Try the two location formats that carry a column.
fn match_strict(line: &str) -> Option<(&str, u32, &str)> {
    LINE_COL
        .captures(line)
        .or_else(|| PAREN_LINE_COL.captures(line))
        .and_then(|caps| location(&caps, 4))
}

/// Pull `(path, line, message)` out of a location match. Line numbers that
/// overflow are treated as no match.
fn location<'t>(caps: &Captures<'t>, message_group: usize) -> Option<(&'t str, u32, &'t str)> {
    let path = caps.get(1)?.as_str();
    let line = caps.get(2)?.as_str().parse().ok()?;
    let message = caps.get(message_group)?.as_str();
    Some((path, line, message))
}

fn classify(message: &str) -> FindingType {
    let lower = message.to_lowercase();
    if lower.contains("error") || lower.contains("critical") {
        FindingType::Error
    } else if lower.contains("warning") || lower.contains("warn") {
        FindingType::Warning
    } else if lower.contains("info") || lower.contains("note") {
        FindingType::Info
    } else {
        FindingType::Warning
    }
}

fn rule_id(message: &str) -> Option<String> {
    RULE_ID
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
