//! Finding extraction
//!
//! Turns a module's accumulated output into structured [`Finding`]s.
//!
//! ## Architecture
//!
//! ```text
//! ModuleLog.full_text ──► FindingExtractor ──► [StructuredParser, LineParser] ──► Finding[]
//!                               ▲
//!                        FindingIndex (fingerprint, first-seen timestamps)
//! ```
//!
//! Extraction is a pure function of `(module_id, full_text)` plus the tool
//! name map. [`FindingIndex`] caches results per module so that snapshots
//! whose text did not change are not re-parsed.

pub mod parser;
pub mod parsers;

pub use parser::{ExtractContext, FindingParser};
pub use parsers::{create_default_parsers, LineParser, StructuredParser};

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::types::{Finding, FindingType, ModuleLog, RunState};

/// Extract findings with the default parser chain.
pub fn extract(module_id: &str, full_text: &str, tool_names: &HashMap<String, String>) -> Vec<Finding> {
    FindingExtractor::new(tool_names.clone()).extract(module_id, full_text)
}

/// Runs an ordered chain of parsers over module output.
pub struct FindingExtractor {
    parsers: Vec<Box<dyn FindingParser>>,
    tool_names: HashMap<String, String>,
}

impl FindingExtractor {
    /// Extractor with the default parser chain.
    pub fn new(tool_names: HashMap<String, String>) -> Self {
        Self::with_parsers(create_default_parsers(), tool_names)
    }

    pub fn with_parsers(parsers: Vec<Box<dyn FindingParser>>, tool_names: HashMap<String, String>) -> Self {
        Self { parsers, tool_names }
    }

    /// Replace the module id → display name map (e.g. after fetching the
    /// tool catalog).
    pub fn set_tool_names(&mut self, tool_names: HashMap<String, String>) {
        self.tool_names = tool_names;
    }

    /// Display name for a module, falling back to the module id.
    pub fn tool_name<'a>(&'a self, module_id: &'a str) -> &'a str {
        self.tool_names
            .get(module_id)
            .map(String::as_str)
            .unwrap_or(module_id)
    }

    pub fn extract(&self, module_id: &str, full_text: &str) -> Vec<Finding> {
        self.extract_at(module_id, full_text, Utc::now())
    }

    /// Extract with an explicit timestamp for every produced finding.
    pub fn extract_at(&self, module_id: &str, full_text: &str, extracted_at: DateTime<Utc>) -> Vec<Finding> {
        let ctx = ExtractContext {
            module_id,
            tool: self.tool_name(module_id),
            full_text,
            extracted_at,
        };

        for parser in &self.parsers {
            let findings = parser.parse(&ctx);
            if !findings.is_empty() {
                tracing::debug!(
                    module = %module_id,
                    parser = parser.name(),
                    count = findings.len(),
                    "Extracted findings"
                );
                return findings;
            }
        }
        Vec::new()
    }
}

/// SHA-256 of the text, hex encoded
fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

type IdentityKey = (FindingType, String, String, String, u32);

fn identity_key(finding: &Finding) -> IdentityKey {
    let (kind, tool, message, filepath, line) = finding.identity();
    (kind, tool.to_string(), message.to_string(), filepath.to_string(), line)
}

struct ModuleFindings {
    fingerprint: String,
    /// Log the findings were last checked against. Snapshots share untouched
    /// logs, so pointer equality means the text cannot have changed.
    source: Option<Arc<ModuleLog>>,
    findings: Vec<Finding>,
}

/// Latest findings per module, kept in step with [`RunState`] snapshots.
pub struct FindingIndex {
    extractor: FindingExtractor,
    modules: BTreeMap<String, ModuleFindings>,
}

impl FindingIndex {
    pub fn new(extractor: FindingExtractor) -> Self {
        Self {
            extractor,
            modules: BTreeMap::new(),
        }
    }

    pub fn extractor_mut(&mut self) -> &mut FindingExtractor {
        &mut self.extractor
    }

    /// Re-extract modules whose text changed and drop modules that no longer
    /// exist. Returns `true` if any module's findings changed.
    pub fn refresh(&mut self, state: &RunState) -> bool {
        let before = self.modules.len();
        self.modules.retain(|id, _| state.modules.contains_key(id));
        let mut changed = self.modules.len() != before;

        for (id, log) in &state.modules {
            let seen = self
                .modules
                .get(id)
                .and_then(|m| m.source.as_ref())
                .is_some_and(|source| Arc::ptr_eq(source, log));
            if seen {
                continue;
            }

            changed |= self.update_module(id, &log.full_text);
            if let Some(entry) = self.modules.get_mut(id) {
                entry.source = Some(Arc::clone(log));
            }
        }
        changed
    }

    /// Re-extract one module if its text differs from the last pass.
    pub fn update_module(&mut self, module_id: &str, full_text: &str) -> bool {
        let digest = fingerprint(full_text);
        if self
            .modules
            .get(module_id)
            .is_some_and(|m| m.fingerprint == digest)
        {
            return false;
        }

        let mut findings = self.extractor.extract(module_id, full_text);
        if let Some(previous) = self.modules.get(module_id) {
            carry_first_seen(&previous.findings, &mut findings);
        }

        self.modules.insert(
            module_id.to_string(),
            ModuleFindings {
                fingerprint: digest,
                source: None,
                findings,
            },
        );
        true
    }

    /// Findings for one module
    pub fn module_findings(&self, module_id: &str) -> &[Finding] {
        self.modules
            .get(module_id)
            .map(|m| m.findings.as_slice())
            .unwrap_or(&[])
    }

    /// All findings, grouped by module id order.
    pub fn findings(&self) -> Vec<Finding> {
        self.modules
            .values()
            .flat_map(|m| m.findings.iter().cloned())
            .collect()
    }

    pub fn clear(&mut self) {
        self.modules.clear();
    }
}

/// Findings that were already present keep their id and first-seen time.
fn carry_first_seen(previous: &[Finding], current: &mut [Finding]) {
    let mut seen: HashMap<IdentityKey, VecDeque<(&str, DateTime<Utc>)>> = HashMap::new();
    for finding in previous {
        seen.entry(identity_key(finding))
            .or_default()
            .push_back((finding.id.as_str(), finding.timestamp));
    }

    for finding in current.iter_mut() {
        if let Some((id, timestamp)) = seen
            .get_mut(&identity_key(finding))
            .and_then(VecDeque::pop_front)
        {
            finding.id = id.to_string();
            finding.timestamp = timestamp;
        }
    }
}
