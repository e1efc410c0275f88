//! Parser trait abstraction
//!
//! All finding parsers implement the [`FindingParser`] trait. The extractor
//! tries them in registration order and keeps the first non-empty result, so
//! a strict tool-specific parser can be placed ahead of the heuristic
//! line-based one.
//!
//! ## Design Principles
//!
//! 1. **Never fail**: malformed output degrades to zero findings
//! 2. **Pure**: parsers see only the text and its context, never live state

use chrono::{DateTime, Utc};

use crate::types::{Finding, FindingType};

/// Context passed to a parser for one module's accumulated output.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    /// Module id the text belongs to (e.g. `B_Ruff`)
    pub module_id: &'a str,
    /// Display name recorded on each finding
    pub tool: &'a str,
    /// The module's full output text
    pub full_text: &'a str,
    /// Timestamp given to every finding produced in this pass
    pub extracted_at: DateTime<Utc>,
}

impl ExtractContext<'_> {
    /// Build a finding with a fresh id.
    pub fn finding(
        &self,
        finding_type: FindingType,
        filepath: &str,
        line: u32,
        message: &str,
        rule_id: Option<String>,
    ) -> Finding {
        Finding {
            id: finding_id(self.tool, filepath, line),
            tool: self.tool.to_string(),
            finding_type,
            message: message.to_string(),
            filepath: filepath.to_string(),
            line,
            timestamp: self.extracted_at,
            rule_id,
        }
    }
}

/// `{tool}-{filepath}-{line}-{random}`
fn finding_id(tool: &str, filepath: &str, line: u32) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}-{}", tool, filepath, line, &random[..9])
}

/// Trait implemented by all finding parsers.
///
/// ## Example
///
/// ```rust,ignore
/// use vigil_core::findings::{ExtractContext, FindingParser};
///
/// struct MypyParser;
///
/// impl FindingParser for MypyParser {
///     fn name(&self) -> &'static str { "mypy" }
///     fn parse(&self, ctx: &ExtractContext<'_>) -> Vec<Finding> { /* ... */ }
/// }
/// ```
pub trait FindingParser: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Extract findings from `ctx.full_text`.
    ///
    /// Returning an empty list hands the text to the next parser.
    fn parse(&self, ctx: &ExtractContext<'_>) -> Vec<Finding>;
}
