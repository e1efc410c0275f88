//! Export serializers for a finding list.

use crate::error::Result;
use crate::format::{format_iso, format_local};
use crate::types::Finding;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    /// `type;tool;line;filepath;message;date`
    #[default]
    Table,
    Json,
    Yaml,
    /// Header line with field names, then one comma-separated row per finding
    Toon,
    Raw,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Table => "table",
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
            ExportFormat::Toon => "toon",
            ExportFormat::Raw => "raw",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" | "csv" => Ok(ExportFormat::Table),
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "toon" => Ok(ExportFormat::Toon),
            "raw" => Ok(ExportFormat::Raw),
            _ => Err(format!("unknown export format: {}", s)),
        }
    }
}

pub fn serialize(findings: &[Finding], format: ExportFormat) -> Result<String> {
    Ok(match format {
        ExportFormat::Table => serialize_table(findings),
        ExportFormat::Json => serde_json::to_string_pretty(findings)?,
        ExportFormat::Yaml => serialize_yaml(findings)?,
        ExportFormat::Toon => serialize_toon(findings),
        ExportFormat::Raw => serialize_raw(findings),
    })
}

fn serialize_table(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|f| {
            format!(
                "{};{};{};{};{};{}",
                f.finding_type,
                f.tool,
                f.line,
                f.filepath,
                f.message,
                format_local(f.timestamp)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One YAML list entry; the timestamp is pre-rendered in ISO-8601 form
#[derive(Serialize)]
struct YamlRow<'a> {
    id: &'a str,
    tool: &'a str,
    #[serde(rename = "type")]
    finding_type: &'static str,
    message: &'a str,
    filepath: &'a str,
    line: u32,
    timestamp: String,
}

fn serialize_yaml(findings: &[Finding]) -> Result<String> {
    let rows: Vec<YamlRow<'_>> = findings
        .iter()
        .map(|f| YamlRow {
            id: &f.id,
            tool: &f.tool,
            finding_type: f.finding_type.as_str(),
            message: &f.message,
            filepath: &f.filepath,
            line: f.line,
            timestamp: format_iso(f.timestamp),
        })
        .collect();
    Ok(serde_yaml::to_string(&rows)?)
}

/// Keep a TOON cell on one row: escape backslashes and line breaks, double `'`
fn toon_cell(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\'', "''")
}

fn serialize_toon(findings: &[Finding]) -> String {
    let header = format!(
        "findings[{}]{{id,tool,type,message,filepath,timestamp,line}}:",
        findings.len()
    );
    let rows = findings.iter().map(|f| {
        format!(
            "{},{},{},'{}',{},{},{}",
            f.id,
            f.tool,
            f.finding_type,
            toon_cell(&f.message),
            f.filepath,
            format_iso(f.timestamp),
            f.line
        )
    });
    std::iter::once(header)
        .chain(rows)
        .collect::<Vec<_>>()
        .join("\n")
}

fn serialize_raw(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|f| {
            format!(
                "[{}] [{}] {{{}}}:{{{}}} - {} ({})",
                f.finding_type.as_str().to_uppercase(),
                f.tool,
                f.filepath,
                f.line,
                f.message,
                f.id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
