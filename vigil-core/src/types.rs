//! Core domain types for vigil
//!
//! These types represent the reconciled view of one analysis session as seen
//! by a client of the analysis backend.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Module** | One independent analysis tool (Ruff, ESLint, ...) tracked as its own unit |
//! | **Run** | One execution cycle bounded by `GLOBAL_INIT`/`GLOBAL_END`, or a continuous watch session |
//! | **Finding** | One structured issue extracted from a module's raw output |
//! | **Cluster** | Findings with identical (type, tool, message), shown collapsed with a count |
//!
//! Module ids are chosen by the backend and used verbatim as keys. Two ids that
//! differ textually are always two modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================
// Status enums
// ============================================

/// Status of a single analysis module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleStatus {
    #[default]
    Pending,
    Running,
    Pass,
    Fail,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Pending => "PENDING",
            ModuleStatus::Running => "RUNNING",
            ModuleStatus::Pass => "PASS",
            ModuleStatus::Fail => "FAIL",
        }
    }

    /// Map a reported terminal status. Anything other than exactly `PASS` fails.
    pub fn from_reported(status: Option<&str>) -> Self {
        match status {
            Some("PASS") => ModuleStatus::Pass,
            _ => ModuleStatus::Fail,
        }
    }

    /// Whether the module has reached a terminal state for this run
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModuleStatus::Pass | ModuleStatus::Fail)
    }
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of the whole analysis session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    #[default]
    Idle,
    Starting,
    Running,
    Success,
    Failure,
    Error,
    Watching,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Idle => "IDLE",
            OverallStatus::Starting => "STARTING",
            OverallStatus::Running => "RUNNING",
            OverallStatus::Success => "SUCCESS",
            OverallStatus::Failure => "FAILURE",
            OverallStatus::Error => "ERROR",
            OverallStatus::Watching => "WATCHING",
        }
    }

    /// Map a reported run status. Anything other than exactly `PASS` fails.
    pub fn from_reported(status: Option<&str>) -> Self {
        match status {
            Some("PASS") => OverallStatus::Success,
            _ => OverallStatus::Failure,
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Metrics
// ============================================

/// Issue totals across all files analysed by a module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueTotals {
    #[serde(rename = "ERROR")]
    pub error: u64,
    #[serde(rename = "WARNING")]
    pub warning: u64,
    #[serde(rename = "INFO")]
    pub info: u64,
    #[serde(rename = "COMPLEXITY")]
    pub complexity: u64,
}

/// Per-file issue counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileIssueCounts {
    #[serde(rename = "ERROR")]
    pub error: u64,
    #[serde(rename = "WARNING")]
    pub warning: u64,
    #[serde(rename = "INFO")]
    pub info: u64,
}

/// Per-file complexity figures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityMetrics {
    #[serde(rename = "COMPLEXITY")]
    pub complexity: u64,
    #[serde(rename = "MAX_CCN")]
    pub max_ccn: u64,
}

/// Metrics for one source file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMetrics {
    pub file: String,
    pub metrics: FileIssueCounts,
    pub complexity_metrics: ComplexityMetrics,
}

/// Structured counters reported by a `METRICS` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub total_issues: IssueTotals,
    pub modules: Vec<FileMetrics>,
}

// ============================================
// Module / Run state
// ============================================

/// Reconciled state of one analysis module
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModuleLog {
    pub status: ModuleStatus,
    /// Last few formatted lines, oldest first (display only)
    pub recent_lines: Vec<String>,
    /// Everything received for this module during the current run
    pub full_text: String,
    /// Result string set by the module's `END` event
    pub summary: Option<String>,
    /// Counters set by the module's `METRICS` event
    pub metrics: Option<Metrics>,
}

/// Reconciled state of the whole session
///
/// Snapshots are immutable; every commit produces a new `RunState`. Module logs
/// are shared between snapshots until they are touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunState {
    pub overall_status: OverallStatus,
    pub is_analyzing: bool,
    pub is_watching: bool,
    pub modules: BTreeMap<String, Arc<ModuleLog>>,
    /// Last status line not attributable to any module
    pub last_system_message: String,
    /// Project the session is analysing (restorable)
    pub project_path: String,
    /// Incremented on every committed transition
    pub revision: u64,
}

impl RunState {
    /// Look up a module by id
    pub fn module(&self, id: &str) -> Option<&ModuleLog> {
        self.modules.get(id).map(|m| m.as_ref())
    }

    /// Number of modules in each status (pending, running, pass, fail)
    pub fn status_counts(&self) -> [usize; 4] {
        let mut counts = [0usize; 4];
        for module in self.modules.values() {
            let idx = match module.status {
                ModuleStatus::Pending => 0,
                ModuleStatus::Running => 1,
                ModuleStatus::Pass => 2,
                ModuleStatus::Fail => 3,
            };
            counts[idx] += 1;
        }
        counts
    }
}

// ============================================
// Findings
// ============================================

/// Severity class of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FindingType {
    Error,
    Warning,
    Info,
}

impl FindingType {
    pub const ALL: [FindingType; 3] = [FindingType::Error, FindingType::Warning, FindingType::Info];

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingType::Error => "Error",
            FindingType::Warning => "Warning",
            FindingType::Info => "Info",
        }
    }
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FindingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(FindingType::Error),
            "warning" => Ok(FindingType::Warning),
            "info" => Ok(FindingType::Info),
            _ => Err(format!("unknown finding type: {}", s)),
        }
    }
}

/// One structured issue extracted from a module's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    pub tool: String,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub message: String,
    pub filepath: String,
    pub line: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl Finding {
    /// Fields that identify a finding independently of when it was extracted
    pub fn identity(&self) -> (FindingType, &str, &str, &str, u32) {
        (
            self.finding_type,
            self.tool.as_str(),
            self.message.as_str(),
            self.filepath.as_str(),
            self.line,
        )
    }
}

// ============================================
// Run commands
// ============================================

/// How the backend should run the analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Full,
    Incremental,
    Watch,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::Incremental => "incremental",
            RunMode::Watch => "watch",
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(RunMode::Full),
            "incremental" => Ok(RunMode::Incremental),
            "watch" => Ok(RunMode::Watch),
            _ => Err(format!("unknown run mode: {}", s)),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
